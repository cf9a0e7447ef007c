//! Simulator configuration, built once and passed to constructors

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::abi::RegisterNames;
use crate::error::{SimulatorError, SimulatorResult};
use crate::memory::cache::CacheConfig;
use crate::memory::main_memory::AddressRange;
use crate::memory::WritePolicy;
use crate::pipelined::branch_predictor::PredictorHeuristic;

/// Number of stages in five-stage mode
pub const STAGE_COUNT: usize = 5;

const DECODE_STAGE: usize = 1;
const WRITEBACK_STAGE: usize = 4;

/// IF, WB, ID, EX, MA
pub const DEFAULT_EXECUTION_ORDERING: [usize; STAGE_COUNT] = [0, 4, 1, 2, 3];

pub const DEFAULT_STACK_POINTER: u32 = 0x7fff_fff0;

/// Implementation enum
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineMode {
    SingleStage,
    #[default]
    FiveStage,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    pub pipeline_mode: PipelineMode,
    pub hazard_detection: bool,
    /// Order in which the stages are evaluated within one cycle
    pub execution_ordering: Vec<usize>,
    pub branch_prediction: PredictorHeuristic,
    pub instruction_memory: AddressRange,
    pub data_memory: AddressRange,
    pub instruction_cache: Option<CacheConfig>,
    pub data_cache: Option<CacheConfig>,
    pub write_policy: WritePolicy,
    pub register_names: RegisterNames,
    pub stack_pointer: u32,
    pub max_cycles: Option<u64>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            pipeline_mode: PipelineMode::default(),
            hazard_detection: true,
            execution_ordering: DEFAULT_EXECUTION_ORDERING.to_vec(),
            branch_prediction: PredictorHeuristic::default(),
            instruction_memory: AddressRange::new(0, 0x1000_0000),
            data_memory: AddressRange::new(0, u32::MAX),
            instruction_cache: None,
            data_cache: None,
            write_policy: WritePolicy::default(),
            register_names: RegisterNames::default(),
            stack_pointer: DEFAULT_STACK_POINTER,
            max_cycles: None,
        }
    }
}

impl SimulatorConfig {
    pub fn from_json(json: &str) -> SimulatorResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> SimulatorResult<Self> {
        Self::from_json(&fs::read_to_string(path)?)
    }

    /// Number of pipeline registers the selected mode needs
    pub fn stage_count(&self) -> usize {
        match self.pipeline_mode {
            PipelineMode::SingleStage => 1,
            PipelineMode::FiveStage => STAGE_COUNT,
        }
    }

    /// Registers after ID that can hold an instruction whose result is
    /// not in the register file yet when ID reads it: the EX and MA
    /// outputs, plus the WB input unless WB runs before ID
    pub fn stages_until_writeback(&self) -> usize {
        let position = |stage| self.execution_ordering.iter().position(|&index| index == stage);
        match (position(WRITEBACK_STAGE), position(DECODE_STAGE)) {
            (Some(writeback), Some(decode)) if writeback < decode => 2,
            _ => 3,
        }
    }

    pub fn validate(&self) -> SimulatorResult<()> {
        if self.pipeline_mode == PipelineMode::FiveStage {
            let mut sorted = self.execution_ordering.clone();
            sorted.sort_unstable();
            if sorted != (0..STAGE_COUNT).collect::<Vec<_>>()
                || self.execution_ordering.first() != Some(&0)
            {
                return Err(SimulatorError::Config(format!(
                    "execution ordering {:?} must be a permutation of 0..{} starting with 0",
                    self.execution_ordering, STAGE_COUNT
                )));
            }
        }
        for (name, range) in
            [("instruction", self.instruction_memory), ("data", self.data_memory)]
        {
            if range.start >= range.end {
                return Err(SimulatorError::Config(format!(
                    "{} memory range {:#010x}..{:#010x} is empty",
                    name, range.start, range.end
                )));
            }
        }
        for cache in [self.instruction_cache, self.data_cache].iter().flatten() {
            cache.validate()?;
        }
        Ok(())
    }
}
