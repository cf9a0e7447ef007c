pub mod abi;
pub mod alu;
pub mod config;
pub mod cpu;
pub mod csr;
pub mod elf_helper;
pub mod flags;
pub mod instruction;
pub mod loader;
pub mod memory;
pub mod program;
pub mod run_wrapper;
pub mod system_call;

pub mod stages_simple;

pub mod pipelined;
pub mod single_cycle;

pub mod error;
