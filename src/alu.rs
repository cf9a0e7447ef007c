//! ALU implementation

/// `(comparison, result)` produced by one ALU evaluation
pub type AluOutput = (Option<bool>, Option<u32>);

/// Performs an atomic ALU operation.
/// Missing operands yield no output at all.
pub fn alu(op: ALUOp, op1: Option<u32>, op2: Option<u32>) -> AluOutput {
    if op == ALUOp::NONE {
        return (None, None);
    }
    if op == ALUOp::PASS {
        return (None, op1);
    }
    let (Some(a), Some(b)) = (op1, op2) else {
        return (None, None);
    };
    let (sa, sb) = (a as i32, b as i32);
    let shamt = b & 0x1f;
    match op {
        ALUOp::ADD => (None, Some(a.wrapping_add(b))),
        ALUOp::SUB => (None, Some(a.wrapping_sub(b))),
        ALUOp::AND => (None, Some(a & b)),
        ALUOp::OR => (None, Some(a | b)),
        ALUOp::XOR => (None, Some(a ^ b)),
        ALUOp::SLT => (None, Some((sa < sb) as u32)),
        ALUOp::SLTU => (None, Some((a < b) as u32)),
        ALUOp::SLL => (None, Some(a << shamt)),
        ALUOp::SRL => (None, Some(a >> shamt)),
        ALUOp::SRA => (None, Some((sa >> shamt) as u32)),
        ALUOp::JALR => (None, Some(a.wrapping_add(b) & !1)),
        ALUOp::MUL => (None, Some(a.wrapping_mul(b))),
        ALUOp::MULH => {
            let product = (sa as i64) * (sb as i64);
            (None, Some((product >> 32) as u32))
        }
        ALUOp::MULHSU => {
            let product = (sa as i64).wrapping_mul(b as i64);
            (None, Some((product >> 32) as u32))
        }
        ALUOp::MULHU => {
            let product = (a as u64) * (b as u64);
            (None, Some((product >> 32) as u32))
        }
        ALUOp::DIV => (None, Some(divide_signed(sa, sb) as u32)),
        ALUOp::DIVU => (None, Some(a.checked_div(b).unwrap_or(u32::MAX))),
        ALUOp::REM => (None, Some(remainder_signed(sa, sb) as u32)),
        ALUOp::REMU => (None, Some(a.checked_rem(b).unwrap_or(a))),
        ALUOp::BEQ => (Some(a == b), None),
        ALUOp::BNE => (Some(a != b), None),
        ALUOp::BLT => (Some(sa < sb), None),
        ALUOp::BGE => (Some(sa >= sb), None),
        ALUOp::BLTU => (Some(a < b), None),
        ALUOp::BGEU => (Some(a >= b), None),
        ALUOp::PASS | ALUOp::NONE => (None, None),
    }
}

/// Division by zero yields -1, overflow yields the dividend
fn divide_signed(a: i32, b: i32) -> i32 {
    if b == 0 {
        -1
    } else {
        a.wrapping_div(b)
    }
}

/// Remainder by zero yields the dividend, overflow yields 0
fn remainder_signed(a: i32, b: i32) -> i32 {
    if b == 0 {
        a
    } else {
        a.wrapping_rem(b)
    }
}

/// Selector for ALU input 1
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AluSrc1 {
    #[default]
    Register,
    ProgramCounter,
}

/// Selector for ALU input 2
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AluSrc2 {
    #[default]
    Register,
    Immediate,
}

/// Set of ALU operations needed for rv32im
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ALUOp {
    // Arithmetic
    ADD,
    SUB,
    // Logical
    AND,
    OR,
    XOR,
    // Set
    SLT,
    SLTU,
    // Shift
    SLL,
    SRL,
    SRA,
    // Jump target with the lowest bit cleared
    JALR,
    // Multiply / divide
    MUL,
    MULH,
    MULHSU,
    MULHU,
    DIV,
    DIVU,
    REM,
    REMU,
    // Branch
    BEQ,
    BNE,
    BLT,
    BGE,
    BLTU,
    BGEU,
    // Operand 1 unchanged
    PASS,
    #[default]
    NONE,
}
