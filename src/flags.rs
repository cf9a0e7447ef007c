use std::path::PathBuf;
use std::str::FromStr;

use crate::config::{PipelineMode, SimulatorConfig};
use crate::error::SimulatorResult;
use crate::pipelined::branch_predictor::PredictorHeuristic;

xflags::xflags! {
    /// RISC-V RV32IM pipeline simulator.
    cmd RvSimArgs {
        /// Path to the ELF file to simulate.
        required elf_file: PathBuf

        /// Enables history module, printing metrics and cache statistics after simulation.
        optional --history

        /// Specifies the simulator implementation.
        /// P: Five-stage pipeline (default)
        /// S: Single stage
        optional -i, --implementation backend: BackendArg

        /// Turns off data hazard detection in the five-stage pipeline.
        optional --no-hazard-detection

        /// Specifies the branch prediction heuristic.
        /// ANT: Always not taken (default)
        /// BP: Buffered prediction
        optional -p, --prediction heuristic: HeuristicArg

        /// JSON configuration file; flags given here override it.
        optional -c, --config path: PathBuf

        /// Aborts the run after this many cycles.
        optional --max-cycles cycles: u64

        /// Enables verbose mode, logging flushes, stalls and loading at debug level.
        optional -v, --verbose
    }
}

impl RvSimArgs {
    /// Builds the configuration: file first, then command line overrides
    pub fn config(&self) -> SimulatorResult<SimulatorConfig> {
        let mut config = match &self.config {
            Some(path) => SimulatorConfig::load(path)?,
            None => SimulatorConfig::default(),
        };
        if let Some(backend) = self.implementation {
            config.pipeline_mode = backend.into();
        }
        if self.no_hazard_detection {
            config.hazard_detection = false;
        }
        if let Some(heuristic) = self.prediction {
            config.branch_prediction = heuristic.into();
        }
        if self.max_cycles.is_some() {
            config.max_cycles = self.max_cycles;
        }
        config.validate()?;
        Ok(config)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendArg {
    Pipelined,
    SingleStage,
}

impl FromStr for BackendArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "P" => Ok(BackendArg::Pipelined),
            "S" => Ok(BackendArg::SingleStage),
            _ => Err(format!("Invalid implementation: '{}'. Expected 'P' or 'S'.", s)),
        }
    }
}

impl From<BackendArg> for PipelineMode {
    fn from(val: BackendArg) -> Self {
        match val {
            BackendArg::Pipelined => PipelineMode::FiveStage,
            BackendArg::SingleStage => PipelineMode::SingleStage,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeuristicArg {
    BufferedPrediction,
    AlwaysNotTaken,
}

impl FromStr for HeuristicArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "BP" => Ok(HeuristicArg::BufferedPrediction),
            "ANT" => Ok(HeuristicArg::AlwaysNotTaken),
            _ => Err(format!(
                "Invalid branch prediction heuristic: '{}'. Expected 'BP' or 'ANT'.",
                s
            )),
        }
    }
}

impl From<HeuristicArg> for PredictorHeuristic {
    fn from(val: HeuristicArg) -> Self {
        match val {
            HeuristicArg::BufferedPrediction => PredictorHeuristic::BufferedPrediction,
            HeuristicArg::AlwaysNotTaken => PredictorHeuristic::AlwaysNotTaken,
        }
    }
}
