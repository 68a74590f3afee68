//! Simulated predictions
//!
//! Used whenever no working inference server is available. Results are
//! always flagged `simulated`.

use crate::types::{BoundingBox, CellType, PredictionResult};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::ops::RangeInclusive;
use std::sync::Mutex;

/// Confidence band of synthesized results
pub const SIMULATED_CONFIDENCE: RangeInclusive<f64> = 0.85..=0.99;

/// Generates simulated predictions
#[derive(Debug)]
pub struct FallbackPredictor {
    rng: Mutex<StdRng>,
}

impl FallbackPredictor {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Reproducible sequence, for tests and demos
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn synthesize(&self) -> PredictionResult {
        let mut rng = match self.rng.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let cell_type = *CellType::ALL.choose(&mut *rng).unwrap_or(&CellType::Neutrophil);
        let confidence = rng.gen_range(SIMULATED_CONFIDENCE);

        let w = rng.gen_range(15.0..30.0);
        let h = rng.gen_range(15.0..30.0);
        let bbox = BoundingBox {
            x: rng.gen_range(10.0..(90.0 - w)),
            y: rng.gen_range(10.0..(90.0 - h)),
            w,
            h,
        };

        PredictionResult::simulated(cell_type, confidence).with_bounding_box(bbox)
    }
}

impl Default for FallbackPredictor {
    fn default() -> Self {
        Self::new()
    }
}
