//! Black-box branch predictor
//! that supports predicting and updating based on observed branch behavior

use serde::{Deserialize, Serialize};

const PREDICTOR_BUFFER_SIZE: usize = 4096;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PredictorHeuristic {
    /// Static not-taken bit
    #[default]
    AlwaysNotTaken,
    BufferedPrediction,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PredictorState {
    Strongly,
    Weakly,
    WeaklyNot,
    StronglyNot,
}

/// 2-bit saturating counters indexed by instruction address.
///
/// Reference: <https://github.com/hehao98/RISCV-Simulator/blob/master/src/BranchPredictor.cpp>
#[derive(Clone, Debug)]
pub struct BranchPredictor {
    heuristic: PredictorHeuristic,
    buffer: Box<[PredictorState]>,
}

impl BranchPredictor {
    pub fn new(heuristic: PredictorHeuristic) -> Self {
        Self {
            heuristic,
            buffer: vec![PredictorState::WeaklyNot; PREDICTOR_BUFFER_SIZE].into_boxed_slice(),
        }
    }

    pub fn heuristic(&self) -> PredictorHeuristic {
        self.heuristic
    }

    fn index(pc: u32) -> usize {
        (pc as usize >> 2) % PREDICTOR_BUFFER_SIZE
    }

    pub fn predict(&self, pc: u32) -> bool {
        if self.heuristic == PredictorHeuristic::AlwaysNotTaken {
            return false;
        }

        match self.buffer[Self::index(pc)] {
            PredictorState::Strongly | PredictorState::Weakly => true,
            PredictorState::WeaklyNot | PredictorState::StronglyNot => false,
        }
    }

    pub fn update(&mut self, pc: u32, taken: bool) {
        if self.heuristic == PredictorHeuristic::AlwaysNotTaken {
            return;
        }

        let state = &mut self.buffer[Self::index(pc)];
        *state = match (*state, taken) {
            (PredictorState::StronglyNot, true) => PredictorState::WeaklyNot,
            (PredictorState::WeaklyNot, true) => PredictorState::Weakly,
            (PredictorState::Weakly | PredictorState::Strongly, true) => PredictorState::Strongly,
            (PredictorState::Strongly, false) => PredictorState::Weakly,
            (PredictorState::Weakly, false) => PredictorState::WeaklyNot,
            (PredictorState::WeaklyNot | PredictorState::StronglyNot, false) => {
                PredictorState::StronglyNot
            }
        };
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.heuristic);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_always_not_taken_ignores_training() {
        let mut predictor = BranchPredictor::new(PredictorHeuristic::AlwaysNotTaken);
        for _ in 0..4 {
            predictor.update(0x40, true);
        }
        assert!(!predictor.predict(0x40));
    }

    #[test]
    fn test_saturating_counter() {
        let mut predictor = BranchPredictor::new(PredictorHeuristic::BufferedPrediction);
        assert!(!predictor.predict(0x40));
        predictor.update(0x40, true);
        assert!(predictor.predict(0x40));
        predictor.update(0x40, true);
        // one not-taken outcome does not flip a strong prediction
        predictor.update(0x40, false);
        assert!(predictor.predict(0x40));
        predictor.update(0x40, false);
        assert!(!predictor.predict(0x40));
        // other addresses are untouched
        assert!(!predictor.predict(0x44));
    }
}
