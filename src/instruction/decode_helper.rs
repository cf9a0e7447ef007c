//! Decoding helper functions.
//! Many drawn from <https://github.com/djanderson/riscv-5stage-simulator/blob/master/src/instruction/decoder.rs>

use super::{Attributes, ControlSignals, Format, Function, Instruction, Opcode, WbSrc};
use crate::alu::{ALUOp, AluSrc1, AluSrc2};
use crate::error::{SimulatorError, SimulatorResult};

fn invalid(raw_inst: u32) -> SimulatorError {
    SimulatorError::InvalidInstruction(raw_inst, 0)
}

/// Extracts the sign-extended immediate from an instruction
fn get_imm_sign_extended(inst: &Instruction) -> Option<u32> {
    let shamt = match inst.opcode {
        Opcode::Lui | Opcode::AuiPc => 0,
        Opcode::Jal => 11,
        Opcode::Branch => 19,
        _ => 20,
    };

    inst.attributes.imm.map(|v| (((v as i32) << shamt) >> shamt) as u32)
}

/// Determines an instruction's mnemonic, e.g., JAL, XOR, or SRA
fn get_function(inst: &Instruction) -> SimulatorResult<Function> {
    use Function::*;
    use Opcode::*;

    let raw = inst.raw_inst;
    match inst.opcode {
        Lui => return Ok(LUI),
        AuiPc => return Ok(AUIPC),
        Jal => return Ok(JAL),
        Empty => return Ok(EMPTY),
        _ => {}
    }

    let funct3 = inst.attributes.funct3.ok_or_else(|| invalid(raw))?;
    let funct7 = get_funct7(raw);

    Ok(match (inst.opcode, funct3, funct7) {
        (Jalr, 0b000, _) => JALR,
        (Branch, 0b000, _) => BEQ,
        (Branch, 0b001, _) => BNE,
        (Branch, 0b100, _) => BLT,
        (Branch, 0b101, _) => BGE,
        (Branch, 0b110, _) => BLTU,
        (Branch, 0b111, _) => BGEU,
        (Load, 0b000, _) => LB,
        (Load, 0b001, _) => LH,
        (Load, 0b010, _) => LW,
        (Load, 0b100, _) => LBU,
        (Load, 0b101, _) => LHU,
        (Store, 0b000, _) => SB,
        (Store, 0b001, _) => SH,
        (Store, 0b010, _) => SW,
        (OpImm, 0b000, _) => ADDI,
        (OpImm, 0b010, _) => SLTI,
        (OpImm, 0b011, _) => SLTIU,
        (OpImm, 0b100, _) => XORI,
        (OpImm, 0b110, _) => ORI,
        (OpImm, 0b111, _) => ANDI,
        (OpImm, 0b001, 0x00) => SLLI,
        (OpImm, 0b101, 0x00) => SRLI,
        (OpImm, 0b101, 0x20) => SRAI,
        (Op, 0b000, 0x00) => ADD,
        (Op, 0b000, 0x20) => SUB,
        (Op, 0b001, 0x00) => SLL,
        (Op, 0b010, 0x00) => SLT,
        (Op, 0b011, 0x00) => SLTU,
        (Op, 0b100, 0x00) => XOR,
        (Op, 0b101, 0x00) => SRL,
        (Op, 0b101, 0x20) => SRA,
        (Op, 0b110, 0x00) => OR,
        (Op, 0b111, 0x00) => AND,
        (Op, 0b000, 0x01) => MUL,
        (Op, 0b001, 0x01) => MULH,
        (Op, 0b010, 0x01) => MULHSU,
        (Op, 0b011, 0x01) => MULHU,
        (Op, 0b100, 0x01) => DIV,
        (Op, 0b101, 0x01) => DIVU,
        (Op, 0b110, 0x01) => REM,
        (Op, 0b111, 0x01) => REMU,
        (MiscMem, 0b000, _) => FENCE,
        (System, 0b000, _) => match raw >> 20 {
            0 => ECALL,
            1 => EBREAK,
            _ => return Err(invalid(raw)),
        },
        (System, 0b001, _) => CSRRW,
        (System, 0b010, _) => CSRRS,
        (System, 0b011, _) => CSRRC,
        (System, 0b101, _) => CSRRWI,
        (System, 0b110, _) => CSRRSI,
        (System, 0b111, _) => CSRRCI,
        _ => return Err(invalid(raw)),
    })
}

pub fn get_controls(inst: &Instruction) -> ControlSignals {
    use Function::*;

    let alu_op = match inst.function {
        AUIPC => ALUOp::ADD,
        JALR => ALUOp::JALR,
        BEQ => ALUOp::BEQ,
        BNE => ALUOp::BNE,
        BLT => ALUOp::BLT,
        BGE => ALUOp::BGE,
        BLTU => ALUOp::BLTU,
        BGEU => ALUOp::BGEU,
        LB | LH | LW | LBU | LHU | SB | SH | SW => ALUOp::ADD,
        ADDI | ADD => ALUOp::ADD,
        SUB => ALUOp::SUB,
        SLTI | SLT => ALUOp::SLT,
        SLTIU | SLTU => ALUOp::SLTU,
        XORI | XOR => ALUOp::XOR,
        ORI | OR => ALUOp::OR,
        ANDI | AND => ALUOp::AND,
        SLLI | SLL => ALUOp::SLL,
        SRLI | SRL => ALUOp::SRL,
        SRAI | SRA => ALUOp::SRA,
        MUL => ALUOp::MUL,
        MULH => ALUOp::MULH,
        MULHSU => ALUOp::MULHSU,
        MULHU => ALUOp::MULHU,
        DIV => ALUOp::DIV,
        DIVU => ALUOp::DIVU,
        REM => ALUOp::REM,
        REMU => ALUOp::REMU,
        CSRRW | CSRRS | CSRRC | CSRRWI | CSRRSI | CSRRCI => ALUOp::PASS,
        LUI | JAL | FENCE | ECALL | EBREAK | EMPTY => ALUOp::NONE,
    };

    let wb_src = match inst.opcode {
        Opcode::Lui => Some(WbSrc::Immediate),
        Opcode::Jal | Opcode::Jalr => Some(WbSrc::PcPlusLength),
        Opcode::Load => Some(WbSrc::Memory),
        Opcode::AuiPc | Opcode::Op | Opcode::OpImm => Some(WbSrc::Alu),
        // the old CSR value comes out of the memory stage
        Opcode::System if inst.is_csr() => Some(WbSrc::Memory),
        _ => None,
    };

    ControlSignals {
        alu_src1: match inst.opcode {
            Opcode::AuiPc | Opcode::Jal => AluSrc1::ProgramCounter,
            _ => AluSrc1::Register,
        },
        alu_src2: match inst.opcode {
            Opcode::Branch | Opcode::Op => AluSrc2::Register,
            _ => AluSrc2::Immediate,
        },
        wb_src,
        reg_write: wb_src.is_some(),
        mem_read: inst.opcode == Opcode::Load,
        mem_write: inst.opcode == Opcode::Store,
        branch: inst.opcode == Opcode::Branch,
        jump: matches!(inst.opcode, Opcode::Jal | Opcode::Jalr),
        alu_op,
        alu_to_pc: inst.opcode == Opcode::Jalr,
    }
}

/// Returns the opcode from a raw instruction
pub fn raw_to_opcode(raw_inst: u32) -> SimulatorResult<Opcode> {
    match get_opcode(raw_inst) {
        0x37 => Ok(Opcode::Lui),
        0x17 => Ok(Opcode::AuiPc),
        0x6f => Ok(Opcode::Jal),
        0x67 => Ok(Opcode::Jalr),
        0x63 => Ok(Opcode::Branch),
        0x03 => Ok(Opcode::Load),
        0x23 => Ok(Opcode::Store),
        0x33 => Ok(Opcode::Op),
        0x13 => Ok(Opcode::OpImm),
        0x0f => Ok(Opcode::MiscMem),
        0x73 => Ok(Opcode::System),
        _ => Err(invalid(raw_inst)),
    }
}

/// Returns the instruction format from an opcode
pub fn opcode_to_format(opcode: Opcode) -> Format {
    match opcode {
        Opcode::Lui | Opcode::AuiPc => Format::U,
        Opcode::Jal => Format::J,
        Opcode::Jalr | Opcode::Load | Opcode::OpImm | Opcode::MiscMem => Format::I,
        Opcode::Branch => Format::B,
        Opcode::Store => Format::S,
        Opcode::Op => Format::R,
        Opcode::System => Format::Sys,
        Opcode::Empty => Format::Empty,
    }
}

/// Fills in attributes, function and control signals
pub fn parse(inst: &mut Instruction) -> SimulatorResult<()> {
    inst.attributes = match inst.format {
        Format::R => parse_format_r(inst.raw_inst),
        Format::I => parse_format_i(inst.raw_inst),
        Format::S => parse_format_s(inst.raw_inst),
        Format::B => parse_format_b(inst.raw_inst),
        Format::U => parse_format_u(inst.raw_inst),
        Format::J => parse_format_j(inst.raw_inst),
        Format::Sys => parse_format_sys(inst.raw_inst),
        Format::Empty => Attributes::default(),
    };
    inst.attributes.imm = get_imm_sign_extended(inst);
    inst.function = get_function(inst)?;
    inst.controls = get_controls(inst);

    Ok(())
}

/// Parses attributes for an R-type instruction
fn parse_format_r(raw_inst: u32) -> Attributes {
    Attributes {
        opcode: Some(get_opcode(raw_inst)),
        rs1: Some(get_rs1(raw_inst)),
        rs2: Some(get_rs2(raw_inst)),
        rd: Some(get_rd(raw_inst)),
        funct3: Some(get_funct3(raw_inst)),
        funct7: Some(get_funct7(raw_inst)),
        ..Attributes::default()
    }
}

/// Parses attributes for an I-type instruction
fn parse_format_i(raw_inst: u32) -> Attributes {
    let funct3 = get_funct3(raw_inst);
    let is_shift = get_opcode(raw_inst) == 0x13 && (funct3 == 0b001 || funct3 == 0b101);

    Attributes {
        opcode: Some(get_opcode(raw_inst)),
        rs1: Some(get_rs1(raw_inst)),
        rd: Some(get_rd(raw_inst)),
        funct3: Some(funct3),
        // I* (shifts): the shift amount sits where rs2 would
        imm: Some(if is_shift { get_rs2(raw_inst) } else { raw_inst >> 20 }),
        ..Attributes::default()
    }
}

/// Parses attributes for an S-type instruction
fn parse_format_s(raw_inst: u32) -> Attributes {
    Attributes {
        opcode: Some(get_opcode(raw_inst)),
        rs1: Some(get_rs1(raw_inst)),
        rs2: Some(get_rs2(raw_inst)),
        funct3: Some(get_funct3(raw_inst)),
        imm: Some(((raw_inst & 0xfe000000) >> 20) | ((raw_inst & 0xf80) >> 7)),
        ..Attributes::default()
    }
}

/// Parses attributes for a B-type instruction
fn parse_format_b(raw_inst: u32) -> Attributes {
    Attributes {
        opcode: Some(get_opcode(raw_inst)),
        rs1: Some(get_rs1(raw_inst)),
        rs2: Some(get_rs2(raw_inst)),
        funct3: Some(get_funct3(raw_inst)),
        imm: Some(
            ((raw_inst & 0x80000000) >> 19)
                | ((raw_inst & 0x80) << 4)
                | ((raw_inst & 0x7e000000) >> 20)
                | ((raw_inst & 0xf00) >> 7),
        ),
        ..Attributes::default()
    }
}

/// Parses attributes for a U-type instruction
fn parse_format_u(raw_inst: u32) -> Attributes {
    Attributes {
        opcode: Some(get_opcode(raw_inst)),
        rd: Some(get_rd(raw_inst)),
        imm: Some(raw_inst & 0xfffff000),
        ..Attributes::default()
    }
}

/// Parses attributes for a J-type instruction
fn parse_format_j(raw_inst: u32) -> Attributes {
    Attributes {
        opcode: Some(get_opcode(raw_inst)),
        rd: Some(get_rd(raw_inst)),
        imm: Some(
            ((raw_inst & 0x80000000) >> 11)
                | (raw_inst & 0xff000)
                | ((raw_inst & 0x100000) >> 9)
                | ((raw_inst & 0x7fe00000) >> 20),
        ),
        ..Attributes::default()
    }
}

/// Parses attributes for a SYSTEM instruction
fn parse_format_sys(raw_inst: u32) -> Attributes {
    let opcode = Some(get_opcode(raw_inst));
    let funct3 = get_funct3(raw_inst);
    match funct3 {
        // ecall reads a0 and a7, ebreak reads nothing
        0b000 if raw_inst >> 20 == 0 => Attributes {
            opcode,
            rs1: Some(crate::abi::REG_A0),
            rs2: Some(crate::abi::REG_A7),
            funct3: Some(funct3),
            ..Attributes::default()
        },
        0b000 => Attributes { opcode, funct3: Some(funct3), ..Attributes::default() },
        // csrrwi / csrrsi / csrrci: rs1 holds a 5-bit immediate
        0b101..=0b111 => Attributes {
            opcode,
            rd: Some(get_rd(raw_inst)),
            funct3: Some(funct3),
            imm: Some(get_rs1(raw_inst)),
            csr: Some((raw_inst >> 20) as u16),
            ..Attributes::default()
        },
        _ => Attributes {
            opcode,
            rs1: Some(get_rs1(raw_inst)),
            rd: Some(get_rd(raw_inst)),
            funct3: Some(funct3),
            csr: Some((raw_inst >> 20) as u16),
            ..Attributes::default()
        },
    }
}

/// Extracts opcode from a raw instruction
fn get_opcode(raw_inst: u32) -> u32 {
    raw_inst & 0x7f
}

/// Extracts funct3 from a raw instruction
fn get_funct3(raw_inst: u32) -> u32 {
    (raw_inst >> 12) & 0x7
}

/// Extracts the rs1 field from a raw instruction
fn get_rs1(raw_inst: u32) -> u32 {
    (raw_inst >> 15) & 0x1f
}

/// Extracts the rs2 field from a raw instruction
fn get_rs2(raw_inst: u32) -> u32 {
    (raw_inst >> 20) & 0x1f
}

/// Extracts the rd field from a raw instruction
fn get_rd(raw_inst: u32) -> u32 {
    (raw_inst >> 7) & 0x1f
}

/// Extracts the funct7 field from a raw instruction
fn get_funct7(raw_inst: u32) -> u32 {
    (raw_inst >> 25) & 0x7f
}
