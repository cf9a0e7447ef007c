#![allow(dead_code)]

use std::path::PathBuf;

use sim_lib::config::SimulatorConfig;
use sim_lib::instruction::Function;
use sim_lib::pipelined::Pipeline;
use sim_lib::program::{Program, ProgramBuilder};
use sim_lib::run_wrapper::standard_configurations;

pub const ZERO: u32 = 0;
pub const RA: u32 = 1;
pub const SP: u32 = 2;
pub const T0: u32 = 5;
pub const T1: u32 = 6;
pub const T2: u32 = 7;
pub const S0: u32 = 8;
pub const S1: u32 = 9;
pub const A0: u32 = 10;
pub const A7: u32 = 17;

/// One of the standard configurations by name
pub fn config(name: &str) -> SimulatorConfig {
    standard_configurations()
        .into_iter()
        .find(|(candidate, _)| *candidate == name)
        .map(|(_, config)| config)
        .unwrap_or_else(|| panic!("no configuration named {}", name))
}

/// NOPs a program needs between instructions under `config`
pub fn padding_for(config: &SimulatorConfig) -> u32 {
    if config.hazard_detection {
        0
    } else {
        2
    }
}

/// Loads `program` and runs it to completion
pub fn run(program: &Program, config: SimulatorConfig) -> Pipeline {
    let mut pipeline = Pipeline::new(config).unwrap();
    pipeline.load_program(program).unwrap();
    pipeline.run().unwrap();
    pipeline
}

/// Recursive Fibonacci of `n`, result in a0
pub fn fibonacci(n: i32, padding: u32) -> Program {
    let mut builder = ProgramBuilder::new();
    builder
        .padding(padding)
        .push(Function::ADDI, A0, ZERO, 0, n)
        .jal(RA, "fib")
        .jal(ZERO, "end")
        .label("fib")
        .push(Function::ADDI, T0, ZERO, 0, 2)
        .branch(Function::BLT, A0, T0, "return")
        .push(Function::ADDI, SP, SP, 0, -12)
        .push(Function::SW, 0, SP, RA, 8)
        .push(Function::SW, 0, SP, S0, 4)
        .push(Function::SW, 0, SP, S1, 0)
        .push(Function::ADDI, S0, A0, 0, 0)
        .push(Function::ADDI, A0, S0, 0, -1)
        .jal(RA, "fib")
        .push(Function::ADDI, S1, A0, 0, 0)
        .push(Function::ADDI, A0, S0, 0, -2)
        .jal(RA, "fib")
        .push(Function::ADD, A0, S1, A0, 0)
        .push(Function::LW, S1, SP, 0, 0)
        .push(Function::LW, S0, SP, 0, 4)
        .push(Function::LW, RA, SP, 0, 8)
        .push(Function::ADDI, SP, SP, 0, 12)
        .label("return")
        .push(Function::JALR, ZERO, RA, 0, 0)
        .label("end");
    builder.build().unwrap()
}

/// A minimal little-endian ELF32 RISC-V executable.
/// `segments` are `(virtual address, p_flags, bytes)`.
pub fn elf_bytes(entry: u32, segments: &[(u32, u32, &[u8])]) -> Vec<u8> {
    const HEADER_SIZE: u32 = 52;
    const PROGRAM_HEADER_SIZE: u32 = 32;

    let mut file = Vec::new();
    file.extend_from_slice(&[0x7f, b'E', b'L', b'F', 1, 1, 1, 0]);
    file.extend_from_slice(&[0; 8]);
    file.extend_from_slice(&2u16.to_le_bytes()); // ET_EXEC
    file.extend_from_slice(&243u16.to_le_bytes()); // EM_RISCV
    file.extend_from_slice(&1u32.to_le_bytes());
    file.extend_from_slice(&entry.to_le_bytes());
    file.extend_from_slice(&HEADER_SIZE.to_le_bytes()); // e_phoff
    file.extend_from_slice(&0u32.to_le_bytes()); // e_shoff
    file.extend_from_slice(&0u32.to_le_bytes()); // e_flags
    file.extend_from_slice(&(HEADER_SIZE as u16).to_le_bytes());
    file.extend_from_slice(&(PROGRAM_HEADER_SIZE as u16).to_le_bytes());
    file.extend_from_slice(&(segments.len() as u16).to_le_bytes());
    file.extend_from_slice(&40u16.to_le_bytes()); // e_shentsize
    file.extend_from_slice(&0u16.to_le_bytes()); // e_shnum
    file.extend_from_slice(&0u16.to_le_bytes()); // e_shstrndx
    assert_eq!(file.len() as u32, HEADER_SIZE);

    let mut offset = HEADER_SIZE + PROGRAM_HEADER_SIZE * segments.len() as u32;
    let mut contents = Vec::new();
    for (address, flags, bytes) in segments {
        let size = bytes.len() as u32;
        for field in [1, offset, *address, *address, size, size, *flags, 4] {
            file.extend_from_slice(&field.to_le_bytes());
        }
        contents.extend_from_slice(bytes);
        offset += size;
    }
    file.extend_from_slice(&contents);
    file
}

/// Writes `bytes` to a fresh file under the system temp directory
pub fn write_temp(name: &str, bytes: &[u8]) -> PathBuf {
    let path = std::env::temp_dir().join(format!("sim_lib_{}_{}", std::process::id(), name));
    std::fs::write(&path, bytes).unwrap();
    path
}
