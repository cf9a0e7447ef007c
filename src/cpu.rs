//! rv32im CPU state

use std::fmt;
use std::time::Duration;

use crate::abi::{register_name, RegisterNames, REG_SP};
use crate::config::SimulatorConfig;
use crate::csr::{Counters, CsrFile, PrivilegeLevel};
use crate::error::SimulatorResult;
use crate::memory::{DataMemory, InstructionMemorySystem, MemorySystem};
use crate::pipelined::branch_predictor::BranchPredictor;

/// Everything an instruction can observe or change.
/// Owned by the pipeline and lent to one stage at a time.
pub struct ArchitecturalState {
    pub registers: RegisterFile,
    pub program_counter: u32,
    pub instruction_memory: InstructionMemorySystem,
    pub data_memory: DataMemory,
    pub csrs: CsrFile,
    pub privilege: PrivilegeLevel,
    pub branch_predictor: BranchPredictor,
    pub performance_metrics: PerformanceMetrics,
    /// Console output produced by system calls
    pub output: String,
    /// Set by an exiting system call
    pub exit_code: Option<u32>,
    pub register_names: RegisterNames,
}

impl ArchitecturalState {
    pub fn new(config: &SimulatorConfig) -> Self {
        let mut registers = RegisterFile::default();
        registers.write(REG_SP, config.stack_pointer);
        Self {
            registers,
            program_counter: config.instruction_memory.start,
            instruction_memory: InstructionMemorySystem::new(
                config.instruction_memory,
                config.instruction_cache,
            ),
            data_memory: DataMemory::new(
                config.data_memory,
                config.data_cache,
                config.write_policy,
            ),
            csrs: CsrFile::new(),
            privilege: PrivilegeLevel::default(),
            branch_predictor: BranchPredictor::new(config.branch_prediction),
            performance_metrics: PerformanceMetrics::default(),
            output: String::new(),
            exit_code: None,
            register_names: config.register_names,
        }
    }

    /// Whether Fetch would find something to run.
    /// Always false once the program has exited.
    pub fn instruction_at_pc(&self) -> bool {
        self.exit_code.is_none()
            && self.instruction_memory.has_instruction_at(self.program_counter)
    }

    fn counters(&self) -> Counters {
        Counters {
            cycles: self.performance_metrics.cycles,
            instret: self.performance_metrics.instruction_count,
        }
    }

    pub fn read_csr(&self, index: u16) -> SimulatorResult<u32> {
        Ok(self.csrs.read(index, self.privilege, self.counters())?)
    }

    pub fn write_csr(&mut self, index: u16, value: u32) -> SimulatorResult<()> {
        Ok(self.csrs.write(index, value, self.privilege)?)
    }

    /// Clears registers, memories, counters and output; keeps the geometry
    pub fn reset(&mut self, config: &SimulatorConfig) {
        self.registers = RegisterFile::default();
        self.registers.write(REG_SP, config.stack_pointer);
        self.program_counter = config.instruction_memory.start;
        self.instruction_memory.reset();
        self.data_memory.reset();
        self.csrs = CsrFile::new();
        self.privilege = PrivilegeLevel::default();
        self.branch_predictor.reset();
        self.performance_metrics = PerformanceMetrics::default();
        self.output.clear();
        self.exit_code = None;
    }
}

/// Register file simulation
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RegisterFile {
    gpr: [u32; 32],
}

impl RegisterFile {
    /// Out-of-range indices read as zero
    pub fn read(&self, index: u32) -> u32 {
        self.gpr.get(index as usize).copied().unwrap_or(0)
    }

    /// Writes to x0 are discarded
    pub fn write(&mut self, index: u32, value: u32) {
        if index != 0 {
            if let Some(register) = self.gpr.get_mut(index as usize) {
                *register = value;
            }
        }
    }

    pub fn values(&self) -> &[u32; 32] {
        &self.gpr
    }

    /// `name: value` lines, four registers per line
    pub fn dump(&self, names: RegisterNames) -> String {
        self.gpr
            .chunks(4)
            .enumerate()
            .map(|(row, chunk)| {
                chunk
                    .iter()
                    .enumerate()
                    .map(|(col, value)| {
                        let name = register_name((row * 4 + col) as u32, names);
                        format!("{:>4}: {:#010x}", name, value)
                    })
                    .collect::<Vec<_>>()
                    .join("  ")
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// History module
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PerformanceMetrics {
    /// Retired instructions
    pub instruction_count: u64,
    /// Taken conditional branches
    pub branch_count: u64,
    /// Unconditional jumps
    pub procedure_count: u64,
    pub flushes: u64,
    pub stalls: u64,
    pub cycles: u64,
    pub execution_time: Duration,
}

impl PerformanceMetrics {
    /// Cycles per retired instruction
    pub fn cpi(&self) -> f64 {
        if self.instruction_count == 0 {
            0.0
        } else {
            self.cycles as f64 / self.instruction_count as f64
        }
    }
}

impl fmt::Display for PerformanceMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "# instructions = {}", self.instruction_count)?;
        writeln!(f, "# cycles = {}", self.cycles)?;
        writeln!(f, "CPI = {:.2}", self.cpi())?;
        writeln!(f, "# taken branches = {}", self.branch_count)?;
        writeln!(f, "# jumps = {}", self.procedure_count)?;
        writeln!(f, "# flushes = {}", self.flushes)?;
        writeln!(f, "# stalls = {}", self.stalls)?;
        write!(f, "execution time = {:.3?}", self.execution_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_x0_is_hardwired() {
        let mut registers = RegisterFile::default();
        registers.write(0, 5);
        registers.write(31, 7);
        assert_eq!(registers.read(0), 0);
        assert_eq!(registers.read(31), 7);
        assert_eq!(registers.read(32), 0);
    }

    #[test]
    fn test_new_state() {
        let config = SimulatorConfig::default();
        let state = ArchitecturalState::new(&config);
        assert_eq!(state.registers.read(REG_SP), config.stack_pointer);
        assert!(!state.instruction_at_pc());
        assert_eq!(state.privilege, PrivilegeLevel::Machine);
    }

    #[test]
    fn test_counter_csrs_mirror_metrics() {
        let mut state = ArchitecturalState::new(&SimulatorConfig::default());
        state.performance_metrics.cycles = 0x1_0000_0002;
        state.performance_metrics.instruction_count = 9;
        assert_eq!(state.read_csr(crate::csr::CYCLE).unwrap(), 2);
        assert_eq!(state.read_csr(crate::csr::CYCLEH).unwrap(), 1);
        assert_eq!(state.read_csr(crate::csr::INSTRET).unwrap(), 9);
    }

    #[test]
    fn test_cpi_and_dump() {
        let metrics = PerformanceMetrics { instruction_count: 4, cycles: 10, ..Default::default() };
        assert_eq!(metrics.cpi(), 2.5);
        assert_eq!(PerformanceMetrics::default().cpi(), 0.0);
        let dump = RegisterFile::default().dump(RegisterNames::Abi);
        assert_eq!(dump.lines().count(), 8);
        assert!(dump.starts_with("zero: 0x00000000"));
    }
}
