//! Pipeline registers

use std::fmt;

use crate::abi::RegisterNames;
use crate::instruction::{ControlSignals, Instruction};

/// Redirects the PC and squashes younger registers
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FlushSignal {
    /// Whether the emitting register itself is squashed too
    pub inclusive: bool,
    /// New program counter
    pub address: u32,
}

/// Holds the emitting stage and everything upstream for another cycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StallSignal {
    /// Expected number of cycles until the hazard clears
    pub duration: u32,
}

/// Fields every non-empty register carries
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Common {
    pub instruction: Instruction,
    pub address_of_instruction: Option<u32>,
    pub control_unit_signals: ControlSignals,
    pub flush_signal: Option<FlushSignal>,
    pub stall_signal: Option<StallSignal>,
}

impl Common {
    pub fn new(instruction: Instruction, address_of_instruction: Option<u32>) -> Self {
        Self {
            instruction,
            address_of_instruction,
            control_unit_signals: instruction.control_unit_signals(),
            flush_signal: None,
            stall_signal: None,
        }
    }
}

/// IF output
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FetchRegister {
    pub common: Common,
    pub pc_plus_instruction_length: Option<u32>,
    /// Fetch predicted the branch taken and already redirected the PC
    pub branch_prediction: bool,
}

/// ID output
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DecodeRegister {
    pub common: Common,
    pub rs1: Option<u32>,
    pub rs2: Option<u32>,
    pub rs1_value: Option<u32>,
    pub rs2_value: Option<u32>,
    pub imm: Option<u32>,
    pub write_register: Option<u32>,
    pub pc_plus_instruction_length: Option<u32>,
    pub branch_prediction: bool,
}

/// EX output
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ExecuteRegister {
    pub common: Common,
    pub comparison: Option<bool>,
    pub alu_result: Option<u32>,
    pub rs2_value: Option<u32>,
    pub imm: Option<u32>,
    pub write_register: Option<u32>,
    pub pc_plus_imm: Option<u32>,
    pub pc_plus_instruction_length: Option<u32>,
    pub branch_prediction: bool,
}

/// MA output
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MemoryAccessRegister {
    pub common: Common,
    pub memory_result: Option<u32>,
    pub alu_result: Option<u32>,
    pub imm: Option<u32>,
    pub write_register: Option<u32>,
    pub pc_plus_instruction_length: Option<u32>,
    pub comparison_or_jump: bool,
}

/// WB output
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct WritebackRegister {
    pub common: Common,
    pub write_register: Option<u32>,
    pub write_data: Option<u32>,
}

/// One pipeline register: the output of one stage in one cycle
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum PipelineRegister {
    /// Bubble
    #[default]
    Empty,
    Fetch(FetchRegister),
    Decode(DecodeRegister),
    Execute(ExecuteRegister),
    MemoryAccess(MemoryAccessRegister),
    Writeback(WritebackRegister),
}

impl PipelineRegister {
    pub fn common(&self) -> Option<&Common> {
        match self {
            PipelineRegister::Empty => None,
            PipelineRegister::Fetch(register) => Some(&register.common),
            PipelineRegister::Decode(register) => Some(&register.common),
            PipelineRegister::Execute(register) => Some(&register.common),
            PipelineRegister::MemoryAccess(register) => Some(&register.common),
            PipelineRegister::Writeback(register) => Some(&register.common),
        }
    }

    pub fn instruction(&self) -> Instruction {
        self.common().map(|common| common.instruction).unwrap_or_default()
    }

    pub fn address_of_instruction(&self) -> Option<u32> {
        self.common().and_then(|common| common.address_of_instruction)
    }

    pub fn flush_signal(&self) -> Option<FlushSignal> {
        self.common().and_then(|common| common.flush_signal)
    }

    pub fn stall_signal(&self) -> Option<StallSignal> {
        self.common().and_then(|common| common.stall_signal)
    }

    /// Whether the next stage should see nothing here.
    /// A stalled register is re-produced next cycle, so downstream ignores it.
    pub fn is_bubble(&self) -> bool {
        self.instruction().is_empty() || self.stall_signal().is_some()
    }

    /// Destination register of the instruction in flight
    pub fn write_register(&self) -> Option<u32> {
        match self {
            PipelineRegister::Empty => None,
            PipelineRegister::Fetch(register) => register.common.instruction.get_write_register(),
            PipelineRegister::Decode(register) => register.write_register,
            PipelineRegister::Execute(register) => register.write_register,
            PipelineRegister::MemoryAccess(register) => register.write_register,
            PipelineRegister::Writeback(register) => register.write_register,
        }
    }

    /// One-line description for the history view
    pub fn describe(&self, names: RegisterNames) -> String {
        let Some(common) = self.common() else {
            return "empty".to_string();
        };
        let mut text = match common.address_of_instruction {
            Some(address) => {
                format!("{:#010x}: {}", address, common.instruction.disassemble(names))
            }
            None => common.instruction.disassemble(names),
        };
        if common.stall_signal.is_some() {
            text.push_str(" (stall)");
        }
        if let Some(flush) = common.flush_signal {
            text.push_str(&format!(" (flush -> {:#010x})", flush.address));
        }
        text
    }
}

impl fmt::Display for PipelineRegister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe(RegisterNames::default()))
    }
}
