//! Instruction encoder, the inverse of `decode_helper`

use super::decode_helper::opcode_to_format;
use super::{Format, Function, Opcode};
use crate::error::{SimulatorError, SimulatorResult};

/// Opcode, funct3 and funct7 of a function
fn fields(function: Function) -> (Opcode, u32, u32) {
    use Function::*;
    use Opcode::*;

    match function {
        LUI => (Lui, 0, 0),
        AUIPC => (AuiPc, 0, 0),
        JAL => (Jal, 0, 0),
        JALR => (Jalr, 0b000, 0),
        BEQ => (Branch, 0b000, 0),
        BNE => (Branch, 0b001, 0),
        BLT => (Branch, 0b100, 0),
        BGE => (Branch, 0b101, 0),
        BLTU => (Branch, 0b110, 0),
        BGEU => (Branch, 0b111, 0),
        LB => (Load, 0b000, 0),
        LH => (Load, 0b001, 0),
        LW => (Load, 0b010, 0),
        LBU => (Load, 0b100, 0),
        LHU => (Load, 0b101, 0),
        SB => (Store, 0b000, 0),
        SH => (Store, 0b001, 0),
        SW => (Store, 0b010, 0),
        ADDI => (OpImm, 0b000, 0),
        SLTI => (OpImm, 0b010, 0),
        SLTIU => (OpImm, 0b011, 0),
        XORI => (OpImm, 0b100, 0),
        ORI => (OpImm, 0b110, 0),
        ANDI => (OpImm, 0b111, 0),
        SLLI => (OpImm, 0b001, 0x00),
        SRLI => (OpImm, 0b101, 0x00),
        SRAI => (OpImm, 0b101, 0x20),
        ADD => (Op, 0b000, 0x00),
        SUB => (Op, 0b000, 0x20),
        SLL => (Op, 0b001, 0x00),
        SLT => (Op, 0b010, 0x00),
        SLTU => (Op, 0b011, 0x00),
        XOR => (Op, 0b100, 0x00),
        SRL => (Op, 0b101, 0x00),
        SRA => (Op, 0b101, 0x20),
        OR => (Op, 0b110, 0x00),
        AND => (Op, 0b111, 0x00),
        MUL => (Op, 0b000, 0x01),
        MULH => (Op, 0b001, 0x01),
        MULHSU => (Op, 0b010, 0x01),
        MULHU => (Op, 0b011, 0x01),
        DIV => (Op, 0b100, 0x01),
        DIVU => (Op, 0b101, 0x01),
        REM => (Op, 0b110, 0x01),
        REMU => (Op, 0b111, 0x01),
        FENCE => (MiscMem, 0b000, 0),
        ECALL | EBREAK => (System, 0b000, 0),
        CSRRW => (System, 0b001, 0),
        CSRRS => (System, 0b010, 0),
        CSRRC => (System, 0b011, 0),
        CSRRWI => (System, 0b101, 0),
        CSRRSI => (System, 0b110, 0),
        CSRRCI => (System, 0b111, 0),
        EMPTY => (Empty, 0, 0),
    }
}

fn check_range(function: Function, what: &str, value: i64, min: i64, max: i64) -> SimulatorResult<()> {
    if value < min || value > max {
        return Err(SimulatorError::InvalidOperand(format!(
            "{} {} = {} not in {}..={}",
            function.mnemonic(),
            what,
            value,
            min,
            max
        )));
    }
    Ok(())
}

/// Encodes one instruction.
///
/// Unused operands are ignored. `imm` is the byte offset for branches and
/// jumps, the upper 20 bits for `lui`/`auipc`, and the CSR index for CSR
/// instructions, whose immediate forms take `zimm` in `rs1`.
pub fn encode(function: Function, rd: u32, rs1: u32, rs2: u32, imm: i32) -> SimulatorResult<u32> {
    let (opcode, funct3, funct7) = fields(function);
    if opcode == Opcode::Empty {
        return Err(SimulatorError::InvalidOperand("the empty instruction has no encoding".into()));
    }
    for (what, register) in [("rd", rd), ("rs1", rs1), ("rs2", rs2)] {
        check_range(function, what, register as i64, 0, 31)?;
    }

    let op = opcode.bits();
    let imm64 = imm as i64;
    let raw = match (opcode_to_format(opcode), function) {
        (Format::R, _) => {
            (funct7 << 25) | (rs2 << 20) | (rs1 << 15) | (funct3 << 12) | (rd << 7) | op
        }
        (Format::I, Function::SLLI | Function::SRLI | Function::SRAI) => {
            check_range(function, "shamt", imm64, 0, 31)?;
            (funct7 << 25) | ((imm as u32) << 20) | (rs1 << 15) | (funct3 << 12) | (rd << 7) | op
        }
        (Format::I, _) => {
            check_range(function, "imm", imm64, -2048, 2047)?;
            ((imm as u32 & 0xfff) << 20) | (rs1 << 15) | (funct3 << 12) | (rd << 7) | op
        }
        (Format::S, _) => {
            check_range(function, "imm", imm64, -2048, 2047)?;
            let imm = imm as u32;
            (((imm >> 5) & 0x7f) << 25)
                | (rs2 << 20)
                | (rs1 << 15)
                | (funct3 << 12)
                | ((imm & 0x1f) << 7)
                | op
        }
        (Format::B, _) => {
            check_range(function, "offset", imm64, -4096, 4094)?;
            check_range(function, "offset parity", imm64 & 1, 0, 0)?;
            let imm = imm as u32;
            (((imm >> 12) & 1) << 31)
                | (((imm >> 5) & 0x3f) << 25)
                | (rs2 << 20)
                | (rs1 << 15)
                | (funct3 << 12)
                | (((imm >> 1) & 0xf) << 8)
                | (((imm >> 11) & 1) << 7)
                | op
        }
        (Format::U, _) => {
            check_range(function, "imm", imm64, -(1 << 19), (1 << 20) - 1)?;
            ((imm as u32) << 12) | (rd << 7) | op
        }
        (Format::J, _) => {
            check_range(function, "offset", imm64, -(1 << 20), (1 << 20) - 2)?;
            check_range(function, "offset parity", imm64 & 1, 0, 0)?;
            let imm = imm as u32;
            (((imm >> 20) & 1) << 31)
                | (((imm >> 1) & 0x3ff) << 21)
                | (((imm >> 11) & 1) << 20)
                | (((imm >> 12) & 0xff) << 12)
                | (rd << 7)
                | op
        }
        (Format::Sys, Function::ECALL) => op,
        (Format::Sys, Function::EBREAK) => (1 << 20) | op,
        (Format::Sys, _) => {
            check_range(function, "csr", imm64, 0, 0xfff)?;
            ((imm as u32) << 20) | (rs1 << 15) | (funct3 << 12) | (rd << 7) | op
        }
        (Format::Empty, _) => 0,
    };
    Ok(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::Instruction;
    use rstest::rstest;

    #[rstest]
    #[case(Function::ADDI, 10, 0, 0, 10, 0x00a00513)]
    #[case(Function::ADD, 10, 11, 12, 0, 0x00c58533)]
    #[case(Function::LW, 1, 2, 0, -4, 0xffc12083)]
    #[case(Function::SW, 0, 2, 1, 12, 0x00112623)]
    #[case(Function::BNE, 0, 14, 0, -16, 0xfe0718e3)]
    #[case(Function::LUI, 5, 0, 0, 0x12345, 0x123452b7)]
    #[case(Function::JAL, 1, 0, 0, -8, 0xff9ff0ef)]
    #[case(Function::SRAI, 11, 11, 0, 2, 0x4025d593)]
    #[case(Function::MUL, 10, 10, 11, 0, 0x02b50533)]
    #[case(Function::ECALL, 0, 0, 0, 0, 0x00000073)]
    #[case(Function::CSRRW, 10, 5, 0, 0x340, 0x34029573)]
    fn test_known_encodings(
        #[case] function: Function,
        #[case] rd: u32,
        #[case] rs1: u32,
        #[case] rs2: u32,
        #[case] imm: i32,
        #[case] raw: u32,
    ) {
        assert_eq!(encode(function, rd, rs1, rs2, imm).unwrap(), raw);
    }

    #[test]
    fn test_branch_offsets_survive_decoding() {
        for offset in [-4096, -2050, -2, 0, 2, 2048, 4094] {
            let inst = Instruction::from_fields(Function::BLT, 0, 1, 2, offset).unwrap();
            assert_eq!(inst.attributes.imm, Some(offset as u32));
        }
        for offset in [-(1 << 20), -2, 2, 4096, (1 << 20) - 2] {
            let inst = Instruction::from_fields(Function::JAL, 1, 0, 0, offset).unwrap();
            assert_eq!(inst.attributes.imm, Some(offset as u32));
        }
    }

    #[rstest]
    #[case(Function::ADDI, 32, 0, 0, 0)]
    #[case(Function::ADDI, 1, 0, 0, 2048)]
    #[case(Function::SLLI, 1, 0, 0, 32)]
    #[case(Function::BEQ, 0, 1, 2, 3)]
    #[case(Function::JAL, 1, 0, 0, 1 << 20)]
    #[case(Function::EMPTY, 0, 0, 0, 0)]
    fn test_rejected(
        #[case] function: Function,
        #[case] rd: u32,
        #[case] rs1: u32,
        #[case] rs2: u32,
        #[case] imm: i32,
    ) {
        assert!(matches!(
            encode(function, rd, rs1, rs2, imm),
            Err(SimulatorError::InvalidOperand(_))
        ));
    }
}
