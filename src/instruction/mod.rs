//! Instruction representation

use std::fmt;

use crate::abi::{register_name, RegisterNames};
use crate::alu::{alu, ALUOp, AluOutput, AluSrc1, AluSrc2};
use crate::cpu::ArchitecturalState;
use crate::csr::CsrOp;
use crate::error::{ExecutionError, SimulatorResult};
use crate::memory::MemorySystem;

pub mod decode_helper;
pub mod encode;

/// NOP: ADDI x0, x0, 0
pub(crate) const NOP: u32 = 0x13;

/// Wrapped instruction
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Instruction {
    /// Raw representation
    pub raw_inst: u32,
    pub opcode: Opcode,
    pub format: Format,
    pub function: Function,
    /// Subfields
    pub attributes: Attributes,
    pub controls: ControlSignals,
}

impl Instruction {
    /// Decodes a raw instruction word
    pub fn new(raw_inst: u32) -> SimulatorResult<Self> {
        let opcode = decode_helper::raw_to_opcode(raw_inst)?;
        let format = decode_helper::opcode_to_format(opcode);

        let mut inst = Self {
            raw_inst,
            opcode,
            format,
            function: Function::default(),
            attributes: Attributes::default(),
            controls: ControlSignals::default(),
        };

        decode_helper::parse(&mut inst)?;
        Ok(inst)
    }

    /// Encodes and decodes in one go; see [`encode::encode`] for operands
    pub fn from_fields(
        function: Function,
        rd: u32,
        rs1: u32,
        rs2: u32,
        imm: i32,
    ) -> SimulatorResult<Self> {
        Self::new(encode::encode(function, rd, rs1, rs2, imm)?)
    }

    /// The inert placeholder filling bubbles and unpopulated memory
    pub const fn empty() -> Self {
        Self {
            raw_inst: 0,
            opcode: Opcode::Empty,
            format: Format::Empty,
            function: Function::EMPTY,
            attributes: Attributes::EMPTY,
            controls: ControlSignals::EMPTY,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.function == Function::EMPTY
    }

    pub fn is_ecall(&self) -> bool {
        self.function == Function::ECALL
    }

    pub fn is_csr(&self) -> bool {
        matches!(
            self.function,
            Function::CSRRW
                | Function::CSRRS
                | Function::CSRRC
                | Function::CSRRWI
                | Function::CSRRSI
                | Function::CSRRCI
        )
    }

    /// Size in bytes
    pub fn length(&self) -> u32 {
        4
    }

    /// Source registers, their current values and the immediate
    pub fn access_register_file(&self, state: &ArchitecturalState) -> RegisterAccess {
        let rs1 = self.attributes.rs1;
        let rs2 = self.attributes.rs2;
        RegisterAccess {
            rs1,
            rs2,
            rs1_value: rs1.map(|index| state.registers.read(index)),
            rs2_value: rs2.map(|index| state.registers.read(index)),
            imm: self.attributes.imm,
        }
    }

    /// Destination register, if the instruction writes one
    pub fn get_write_register(&self) -> Option<u32> {
        if self.controls.reg_write {
            self.attributes.rd
        } else {
            None
        }
    }

    pub fn control_unit_signals(&self) -> ControlSignals {
        self.controls
    }

    /// Runs the ALU on the already selected inputs
    pub fn alu_compute(&self, in1: Option<u32>, in2: Option<u32>) -> SimulatorResult<AluOutput> {
        match self.function {
            Function::EBREAK | Function::FENCE => {
                Err(ExecutionError::InstructionNotImplemented(self.function.mnemonic()).into())
            }
            // immediate CSR forms pass zimm instead of rs1
            Function::CSRRWI | Function::CSRRSI | Function::CSRRCI => {
                Ok(alu(ALUOp::PASS, in2, None))
            }
            _ => Ok(alu(self.controls.alu_op, in1, in2)),
        }
    }

    /// Loads, stores and CSR read-modify-writes.
    /// Returns the value loaded, or the old CSR value.
    pub fn memory_access(
        &self,
        address: Option<u32>,
        write_data: Option<u32>,
        state: &mut ArchitecturalState,
        update_statistics: bool,
    ) -> SimulatorResult<Option<u32>> {
        use Function::*;

        if self.is_csr() {
            return self.csr_access(write_data, state).map(Some);
        }
        let Some(address) = address else {
            return Ok(None);
        };
        let memory = &mut state.data_memory;
        Ok(match self.function {
            LB => Some(memory.read_byte(address, update_statistics)? as i8 as i32 as u32),
            LH => Some(memory.read_halfword(address, update_statistics)? as i16 as i32 as u32),
            LW => Some(memory.read_word(address, update_statistics)?),
            LBU => Some(memory.read_byte(address, update_statistics)? as u32),
            LHU => Some(memory.read_halfword(address, update_statistics)? as u32),
            SB | SH | SW => {
                let value = write_data.unwrap_or(0);
                match self.function {
                    SB => memory.write_byte(address, value as u8, false)?,
                    SH => memory.write_halfword(address, value as u16, false)?,
                    _ => memory.write_word(address, value, false)?,
                }
                None
            }
            _ => None,
        })
    }

    fn csr_access(
        &self,
        operand: Option<u32>,
        state: &mut ArchitecturalState,
    ) -> SimulatorResult<u32> {
        let index = self.attributes.csr.unwrap_or(0);
        let operand = operand.unwrap_or(0);
        let op = match self.function {
            Function::CSRRW | Function::CSRRWI => CsrOp::ReadWrite,
            Function::CSRRS | Function::CSRRSI => CsrOp::ReadSet,
            _ => CsrOp::ReadClear,
        };
        // set/clear with x0 or a zero immediate only reads
        let source_is_zero = match self.function {
            Function::CSRRS | Function::CSRRC => self.attributes.rs1 == Some(0),
            Function::CSRRSI | Function::CSRRCI => self.attributes.imm == Some(0),
            _ => false,
        };

        let old = state.read_csr(index)?;
        if !source_is_zero {
            state.write_csr(index, op.apply(old, operand))?;
        }
        Ok(old)
    }

    /// Writes the selected value into the destination register
    pub fn write_back(
        &self,
        write_register: Option<u32>,
        write_data: Option<u32>,
        state: &mut ArchitecturalState,
    ) {
        if let (Some(rd), Some(value)) = (write_register, write_data) {
            state.registers.write(rd, value);
        }
    }

    /// Disassembly using the given register-name table
    pub fn disassemble(&self, names: RegisterNames) -> String {
        use Format::*;
        use Function::*;

        let reg = |index: Option<u32>| register_name(index.unwrap_or(0), names);
        let imm = self.attributes.imm.unwrap_or(0) as i32;
        let mnemonic = self.function.mnemonic();
        let (rd, rs1, rs2) = (self.attributes.rd, self.attributes.rs1, self.attributes.rs2);

        match (self.format, self.function) {
            (_, EMPTY) => "empty".to_string(),
            (_, ECALL | EBREAK | FENCE) => mnemonic,
            (_, CSRRW | CSRRS | CSRRC) => format!(
                "{} {}, {:#05x}, {}",
                mnemonic,
                reg(rd),
                self.attributes.csr.unwrap_or(0),
                reg(rs1)
            ),
            (_, CSRRWI | CSRRSI | CSRRCI) => format!(
                "{} {}, {:#05x}, {}",
                mnemonic,
                reg(rd),
                self.attributes.csr.unwrap_or(0),
                imm
            ),
            (_, LB | LH | LW | LBU | LHU | JALR) => {
                format!("{} {}, {}({})", mnemonic, reg(rd), imm, reg(rs1))
            }
            (S, _) => format!("{} {}, {}({})", mnemonic, reg(rs2), imm, reg(rs1)),
            (R, _) => format!("{} {}, {}, {}", mnemonic, reg(rd), reg(rs1), reg(rs2)),
            (I, _) => format!("{} {}, {}, {}", mnemonic, reg(rd), reg(rs1), imm),
            (B, _) => format!("{} {}, {}, {}", mnemonic, reg(rs1), reg(rs2), imm),
            (U, _) => format!("{} {}, {:#x}", mnemonic, reg(rd), (imm as u32) >> 12),
            (J, _) => format!("{} {}, {}", mnemonic, reg(rd), imm),
            (Sys | Format::Empty, _) => mnemonic,
        }
    }
}

impl Default for Instruction {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.disassemble(RegisterNames::default()))
    }
}

/// What `access_register_file` hands to the Decode stage
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RegisterAccess {
    pub rs1: Option<u32>,
    pub rs2: Option<u32>,
    pub rs1_value: Option<u32>,
    pub rs2_value: Option<u32>,
    pub imm: Option<u32>,
}

/// rv32im opcode
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Opcode {
    Lui,
    AuiPc,
    Jal,
    Jalr,
    Branch,
    Load,
    Store,
    Op,
    OpImm,
    MiscMem,
    System,
    Empty,
}

impl Opcode {
    /// The 7 opcode bits; `Empty` has none
    pub fn bits(self) -> u32 {
        match self {
            Opcode::Lui => 0x37,
            Opcode::AuiPc => 0x17,
            Opcode::Jal => 0x6f,
            Opcode::Jalr => 0x67,
            Opcode::Branch => 0x63,
            Opcode::Load => 0x03,
            Opcode::Store => 0x23,
            Opcode::Op => 0x33,
            Opcode::OpImm => 0x13,
            Opcode::MiscMem => 0x0f,
            Opcode::System => 0x73,
            Opcode::Empty => 0,
        }
    }
}

/// rv32im instruction format
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
    R,
    I,
    S,
    B,
    U,
    J,
    Sys,
    Empty,
}

/// rv32im function (the mnemonic)
#[allow(clippy::upper_case_acronyms)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Function {
    LUI,
    AUIPC,
    JAL,
    JALR,
    BEQ,
    BNE,
    BLT,
    BGE,
    BLTU,
    BGEU,
    LB,
    LH,
    LW,
    LBU,
    LHU,
    SB,
    SH,
    SW,
    ADDI,
    SLTI,
    SLTIU,
    XORI,
    ORI,
    ANDI,
    SLLI,
    SRLI,
    SRAI,
    ADD,
    SUB,
    SLL,
    SLT,
    SLTU,
    XOR,
    SRL,
    SRA,
    OR,
    AND,
    MUL,
    MULH,
    MULHSU,
    MULHU,
    DIV,
    DIVU,
    REM,
    REMU,
    FENCE,
    ECALL,
    EBREAK,
    CSRRW,
    CSRRS,
    CSRRC,
    CSRRWI,
    CSRRSI,
    CSRRCI,
    #[default]
    EMPTY,
}

impl Function {
    pub fn mnemonic(self) -> String {
        format!("{:?}", self).to_lowercase()
    }
}

/// Instruction attributes
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Attributes {
    pub opcode: Option<u32>,
    pub rs1: Option<u32>,
    pub rs2: Option<u32>,
    pub rd: Option<u32>,
    pub funct3: Option<u32>,
    pub funct7: Option<u32>,
    /// Sign-extended immediate; `zimm` for immediate CSR forms
    pub imm: Option<u32>,
    pub csr: Option<u16>,
}

impl Attributes {
    const EMPTY: Self = Self {
        opcode: None,
        rs1: None,
        rs2: None,
        rd: None,
        funct3: None,
        funct7: None,
        imm: None,
        csr: None,
    };
}

/// Source of the value written back to `rd`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WbSrc {
    PcPlusLength,
    Memory,
    Alu,
    Immediate,
}

/// Control signals
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ControlSignals {
    pub alu_src1: AluSrc1,
    pub alu_src2: AluSrc2,
    pub wb_src: Option<WbSrc>,
    pub reg_write: bool,
    pub mem_read: bool,
    pub mem_write: bool,
    /// Conditional branch
    pub branch: bool,
    /// Unconditional jump
    pub jump: bool,
    pub alu_op: ALUOp,
    /// The ALU result is the jump target (jalr)
    pub alu_to_pc: bool,
}

impl ControlSignals {
    const EMPTY: Self = Self {
        alu_src1: AluSrc1::Register,
        alu_src2: AluSrc2::Register,
        wb_src: None,
        reg_write: false,
        mem_read: false,
        mem_write: false,
        branch: false,
        jump: false,
        alu_op: ALUOp::NONE,
        alu_to_pc: false,
    };
}
