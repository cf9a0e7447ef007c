use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for the simulator
#[derive(Error, Debug)]
pub enum SimulatorError {
    #[error("Failed to load ELF file: {0}")]
    Elf(#[from] ElfError),

    #[error("CPU execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    #[error("CSR error: {0}")]
    Csr(#[from] CsrError),

    #[error("Invalid instruction: {0:032b} at PC={1:#010x}")]
    InvalidInstruction(u32, u32),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Malformed configuration file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Undefined label: {0}")]
    UndefinedLabel(String),

    #[error("Operand cannot be encoded: {0}")]
    InvalidOperand(String),
}

/// Errors related to ELF file operations
#[derive(Error, Debug)]
pub enum ElfError {
    #[error("Failed to read ELF file '{0}': {1}")]
    FileRead(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse ELF file '{0}': {1}")]
    Parse(PathBuf, String),

    #[error("Invalid ELF format: {0}")]
    InvalidFormat(String),

    #[error("Memory address out of bounds: {0:#010x}")]
    AddressOutOfBounds(u32),

    #[error("Invalid ELF machine type: {0}")]
    InvalidMachine(u16),
}

/// Errors related to CPU execution
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Instruction not implemented: {0}")]
    InstructionNotImplemented(String),

    #[error("Unknown system call: {0}")]
    UnknownSystemCall(u32),

    #[error("Execution limit reached: {0} cycles")]
    ExecutionLimitReached(u64),

    /// Any error raised while a stage worked on an instruction
    #[error(
        "An error occurred in instruction '{instruction}' at address {}: {source}",
        display_address(.address)
    )]
    InstructionExecution {
        address: Option<u32>,
        instruction: String,
        #[source]
        source: Box<SimulatorError>,
    },
}

fn display_address(address: &Option<u32>) -> String {
    match address {
        Some(address) => format!("{:#010x}", address),
        None => "<unknown>".to_string(),
    }
}

/// Memory regions with independent address ranges
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemoryRegion {
    Instruction,
    Data,
}

impl fmt::Display for MemoryRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryRegion::Instruction => write!(f, "instruction memory"),
            MemoryRegion::Data => write!(f, "data memory"),
        }
    }
}

/// Errors related to memory operations
#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("Address {address:#010x} is outside the valid range of the {region}")]
    AddressOutOfRange { address: u32, region: MemoryRegion },

    #[error("Function '{function}' is not supported by the {region}")]
    UnsupportedFunction { function: &'static str, region: MemoryRegion },
}

/// Errors raised by the CSR access gate
#[derive(Error, Debug)]
pub enum CsrError {
    #[error("Insufficient privilege to access CSR {0:#05x}")]
    PrivilegeViolation(u16),

    #[error("CSR {0:#05x} does not exist")]
    NonExistent(u16),

    #[error("CSR {0:#05x} is read-only")]
    ReadOnly(u16),
}

/// Type alias for Result with SimulatorError
pub type SimulatorResult<T> = Result<T, SimulatorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_wrapper_names_instruction() {
        let error: SimulatorError = ExecutionError::InstructionExecution {
            address: Some(0x10),
            instruction: "lw x1, 0(x2)".to_string(),
            source: Box::new(
                MemoryError::AddressOutOfRange {
                    address: 0xdead_beef,
                    region: MemoryRegion::Data,
                }
                .into(),
            ),
        }
        .into();
        let text = error.to_string();
        assert!(text.contains("lw x1, 0(x2)"));
        assert!(text.contains("0x00000010"));
        assert!(text.contains("0xdeadbeef"));
    }

    #[test]
    fn test_unknown_address_is_rendered() {
        let error = ExecutionError::InstructionExecution {
            address: None,
            instruction: String::new(),
            source: Box::new(SimulatorError::Config("x".into())),
        };
        assert!(error.to_string().contains("<unknown>"));
    }
}
