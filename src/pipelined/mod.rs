//! Pipelined implementation

use std::time::Instant;

use log::{debug, info};

use crate::config::{PipelineMode, SimulatorConfig};
use crate::cpu::{ArchitecturalState, PerformanceMetrics};
use crate::error::{ExecutionError, SimulatorError, SimulatorResult};
use crate::memory::MemorySystem;
use crate::pipelined::pipeline::PipelineRegister;
use crate::pipelined::stages::Stage;
use crate::program::Program;

pub mod branch_predictor;
pub mod pipeline;
pub mod stages;

/// The processor: stages, their registers and the architectural state
pub struct Pipeline {
    config: SimulatorConfig,
    stages: Vec<Stage>,
    registers: Vec<PipelineRegister>,
    state: ArchitecturalState,
    /// Pipeline registers after every cycle, if recording
    history: Option<Vec<Vec<PipelineRegister>>>,
}

impl Pipeline {
    pub fn new(config: SimulatorConfig) -> SimulatorResult<Self> {
        config.validate()?;
        let stages = match config.pipeline_mode {
            PipelineMode::SingleStage => vec![Stage::Single],
            PipelineMode::FiveStage => Stage::five_stage(
                config.hazard_detection,
                config.stages_until_writeback(),
            ),
        };
        let state = ArchitecturalState::new(&config);
        Ok(Self {
            registers: vec![PipelineRegister::Empty; stages.len()],
            stages,
            state,
            config,
            history: None,
        })
    }

    /// Keeps a copy of the registers after every cycle
    pub fn record_history(&mut self) {
        self.history = Some(Vec::new());
    }

    pub fn history(&self) -> Option<&[Vec<PipelineRegister>]> {
        self.history.as_deref()
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    pub fn state(&self) -> &ArchitecturalState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut ArchitecturalState {
        &mut self.state
    }

    pub fn registers(&self) -> &[PipelineRegister] {
        &self.registers
    }

    pub fn performance_metrics(&self) -> &PerformanceMetrics {
        &self.state.performance_metrics
    }

    /// Resets everything, then loads instructions, data and the entry point
    pub fn load_program(&mut self, program: &Program) -> SimulatorResult<()> {
        self.reset();
        let mut address = program.base;
        for instruction in &program.instructions {
            self.state.instruction_memory.store(address, *instruction)?;
            address = address.wrapping_add(instruction.length());
        }
        for (start, bytes) in &program.data {
            for (offset, byte) in bytes.iter().enumerate() {
                let address = start.wrapping_add(offset as u32);
                self.state.data_memory.write_byte(address, *byte, true)?;
            }
        }
        self.state.program_counter = program.entry;
        info!(
            "Loaded {} instructions; entry at {:#010x}",
            program.instructions.len(),
            program.entry
        );
        Ok(())
    }

    /// Back to the state right after construction
    pub fn reset(&mut self) {
        self.state.reset(&self.config);
        self.registers.fill(PipelineRegister::Empty);
        if let Some(history) = self.history.as_mut() {
            history.clear();
        }
    }

    /// No instruction left in any register that feeds another stage
    pub fn is_empty(&self) -> bool {
        let feeding = self.registers.len().saturating_sub(1);
        self.registers[..feeding].iter().all(|register| register.instruction().is_empty())
    }

    /// The pipeline drained and Fetch has nothing left to run
    pub fn is_done(&self) -> bool {
        self.is_empty() && !self.state.instruction_at_pc()
    }

    /// Advances one cycle. Returns whether there is more to do.
    pub fn step(&mut self) -> SimulatorResult<bool> {
        if self.is_done() {
            return Ok(false);
        }

        self.state.performance_metrics.cycles += 1;
        let pc_before = self.state.program_counter;
        let old = self.registers.clone();
        let mut new = vec![PipelineRegister::Empty; old.len()];

        for &index in &self.config_ordering() {
            let stage = self.stages[index];
            new[index] = match stage.behavior(&old, index, &mut self.state) {
                Ok(register) => register,
                Err(error) => return Err(self.wrap_error(error, &old, index, pc_before)),
            };
        }
        self.registers = new;

        // the most downstream flush wins
        for index in (0..self.registers.len()).rev() {
            if let Some(flush) = self.registers[index].flush_signal() {
                let end = if flush.inclusive { index + 1 } else { index };
                self.registers[..end].fill(PipelineRegister::Empty);
                self.state.program_counter = flush.address;
                self.state.performance_metrics.flushes += 1;
                debug!("Flush up to stage {}; PC = {:#010x}", index, flush.address);
                break;
            }
        }

        // the most downstream surviving stall holds everything upstream
        let stall = (0..self.registers.len())
            .rev()
            .find(|&index| self.registers[index].stall_signal().is_some());
        if let Some(index) = stall {
            self.registers[..index].copy_from_slice(&old[..index]);
            self.state.program_counter = pc_before;
            self.state.performance_metrics.stalls += 1;
        }

        if let Some(history) = self.history.as_mut() {
            history.push(self.registers.clone());
        }
        Ok(!self.is_done())
    }

    /// Steps until done, or until the cycle limit is hit
    pub fn run(&mut self) -> SimulatorResult<()> {
        let start = Instant::now();
        let result = self.run_to_completion();
        self.state.performance_metrics.execution_time += start.elapsed();
        result
    }

    fn run_to_completion(&mut self) -> SimulatorResult<()> {
        while !self.is_done() {
            if let Some(max_cycles) = self.config.max_cycles {
                let cycles = self.state.performance_metrics.cycles;
                if cycles >= max_cycles {
                    return Err(ExecutionError::ExecutionLimitReached(cycles).into());
                }
            }
            self.step()?;
        }
        info!("Program finished after {} cycles", self.state.performance_metrics.cycles);
        Ok(())
    }

    fn config_ordering(&self) -> Vec<usize> {
        match self.config.pipeline_mode {
            PipelineMode::SingleStage => vec![0],
            PipelineMode::FiveStage => self.config.execution_ordering.clone(),
        }
    }

    /// Attaches the instruction a stage was working on to its error
    fn wrap_error(
        &self,
        error: SimulatorError,
        old: &[PipelineRegister],
        index: usize,
        pc_before: u32,
    ) -> SimulatorError {
        let (address, instruction) = match index.checked_sub(1).and_then(|input| old.get(input)) {
            Some(register) => (register.address_of_instruction(), register.instruction()),
            // fetch and the single stage work on the instruction at the PC
            None => (Some(pc_before), self.state.instruction_memory.peek_instruction(pc_before)),
        };
        ExecutionError::InstructionExecution {
            address,
            instruction: instruction.disassemble(self.state.register_names),
            source: Box::new(error),
        }
        .into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::{Function, Instruction};
    use crate::program::ProgramBuilder;

    fn pipeline(program: &Program) -> Pipeline {
        let mut pipeline = Pipeline::new(SimulatorConfig::default()).unwrap();
        pipeline.load_program(program).unwrap();
        pipeline
    }

    #[test]
    fn test_empty_program_is_done() {
        let pipeline = pipeline(&Program::default());
        assert!(pipeline.is_empty());
        assert!(pipeline.is_done());
    }

    #[test]
    fn test_single_instruction_takes_five_cycles() {
        let mut builder = ProgramBuilder::new();
        builder.push(Function::ADDI, 5, 0, 0, 3);
        let mut pipeline = pipeline(&builder.build().unwrap());
        pipeline.run().unwrap();
        assert_eq!(pipeline.state().registers.read(5), 3);
        assert_eq!(pipeline.performance_metrics().cycles, 5);
        assert_eq!(pipeline.performance_metrics().instruction_count, 1);
    }

    #[test]
    fn test_step_after_done() {
        let mut pipeline = pipeline(&Program::default());
        assert!(!pipeline.step().unwrap());
        assert_eq!(pipeline.performance_metrics().cycles, 0);
    }

    #[test]
    fn test_load_use_stalls() {
        let mut builder = ProgramBuilder::new();
        builder
            .push(Function::ADDI, 5, 0, 0, 9)
            .push(Function::ADD, 6, 5, 5, 0)
            .data_words(0x400, &[1]);
        let mut pipeline = pipeline(&builder.build().unwrap());
        pipeline.record_history();
        pipeline.run().unwrap();
        assert_eq!(pipeline.state().registers.read(6), 18);
        assert_eq!(pipeline.performance_metrics().stalls, 2);
        assert_eq!(pipeline.performance_metrics().cycles, 8);
        assert_eq!(pipeline.history().map(|history| history.len()), Some(8));
        assert_eq!(pipeline.state().data_memory.backing_memory().read_word(0x400).unwrap(), 1);
    }

    #[test]
    fn test_error_names_instruction() {
        let program = Program {
            instructions: vec![
                Instruction::from_fields(Function::ADDI, 0, 0, 0, 0).unwrap(),
                Instruction::from_fields(Function::EBREAK, 0, 0, 0, 0).unwrap(),
            ],
            ..Default::default()
        };
        let mut pipeline = pipeline(&program);
        let error = pipeline.run().unwrap_err();
        match error {
            SimulatorError::Execution(ExecutionError::InstructionExecution {
                address,
                instruction,
                ..
            }) => {
                assert_eq!(address, Some(4));
                assert_eq!(instruction, "ebreak");
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_cycle_limit() {
        let mut builder = ProgramBuilder::new();
        builder.label("loop").jal(0, "loop");
        let config = SimulatorConfig { max_cycles: Some(50), ..Default::default() };
        let mut pipeline = Pipeline::new(config).unwrap();
        pipeline.load_program(&builder.build().unwrap()).unwrap();
        assert!(matches!(
            pipeline.run(),
            Err(SimulatorError::Execution(ExecutionError::ExecutionLimitReached(50)))
        ));
    }
}
