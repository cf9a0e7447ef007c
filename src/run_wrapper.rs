//! A simulator wrapper

use std::fmt;
use std::path::Path;

use log::info;

use crate::config::{PipelineMode, SimulatorConfig};
use crate::cpu::{PerformanceMetrics, RegisterFile};
use crate::error::SimulatorResult;
use crate::loader;
use crate::memory::cache::{CacheConfig, CacheStatistics};
use crate::memory::{MemorySystem, WritePolicy};
use crate::pipelined::Pipeline;
use crate::program::Program;

/// What a finished run leaves behind
#[derive(Clone, Debug, PartialEq)]
pub struct RunReport {
    pub metrics: PerformanceMetrics,
    pub output: String,
    pub exit_code: Option<u32>,
    pub registers: RegisterFile,
    pub instruction_cache: Option<CacheStatistics>,
    pub data_cache: Option<CacheStatistics>,
}

impl RunReport {
    pub fn from_pipeline(pipeline: &Pipeline) -> Self {
        let state = pipeline.state();
        Self {
            metrics: state.performance_metrics,
            output: state.output.clone(),
            exit_code: state.exit_code,
            registers: state.registers,
            instruction_cache: state.instruction_memory.statistics(),
            data_cache: state.data_memory.statistics(),
        }
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.metrics)?;
        if let Some(statistics) = self.instruction_cache {
            writeln!(f, "instruction cache: {}", statistics)?;
        }
        if let Some(statistics) = self.data_cache {
            writeln!(f, "data cache: {}", statistics)?;
        }
        match self.exit_code {
            Some(code) => write!(f, "exit code = {}", code),
            None => write!(f, "exit code = -"),
        }
    }
}

/// The configurations every program is checked against:
/// single stage, five stages with and without hazard detection, and five
/// stages behind a write-through and a write-back data cache
pub fn standard_configurations() -> Vec<(&'static str, SimulatorConfig)> {
    let cached = |write_policy| SimulatorConfig {
        data_cache: Some(CacheConfig::default()),
        write_policy,
        ..Default::default()
    };
    vec![
        (
            "single-stage",
            SimulatorConfig { pipeline_mode: PipelineMode::SingleStage, ..Default::default() },
        ),
        ("five-stage", SimulatorConfig::default()),
        (
            "five-stage-no-hazard-detection",
            SimulatorConfig { hazard_detection: false, ..Default::default() },
        ),
        ("write-through-cache", cached(WritePolicy::WriteThrough)),
        ("write-back-cache", cached(WritePolicy::WriteBack)),
    ]
}

/// Run simulation on the given ELF file
pub fn run(elf_file: &Path, config: SimulatorConfig) -> SimulatorResult<RunReport> {
    let mut pipeline = Pipeline::new(config)?;
    loader::load_elf(&mut pipeline, elf_file)?;
    info!("Running {}", elf_file.display());
    pipeline.run()?;
    Ok(RunReport::from_pipeline(&pipeline))
}

/// Run simulation on an in-memory program
pub fn run_program(program: &Program, config: SimulatorConfig) -> SimulatorResult<RunReport> {
    let mut pipeline = Pipeline::new(config)?;
    pipeline.load_program(program)?;
    pipeline.run()?;
    Ok(RunReport::from_pipeline(&pipeline))
}
