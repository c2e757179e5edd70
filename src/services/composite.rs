//! Composite score calculation.
//!
//! The leaderboard total is a pure weighted sum of the three metric
//! scores. Weights are process-level constants; they are never accepted
//! per call.

use serde::{Deserialize, Serialize};

/// Weights combining the three metric scores into the leaderboard total.
/// The defaults sum to 1.0.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CompositeWeights {
    pub activity: f64,
    pub weight_loss: f64,
    pub streak: f64,
}

impl Default for CompositeWeights {
    fn default() -> Self {
        Self {
            activity: 0.3,
            weight_loss: 0.5,
            streak: 0.2,
        }
    }
}

impl CompositeWeights {
    /// Weighted total of the three metric scores
    pub fn total(&self, activity: f64, weight_loss: f64, streak: f64) -> f64 {
        self.activity * activity + self.weight_loss * weight_loss + self.streak * streak
    }

    /// Sanity check for non-default configurations
    pub fn validate(&self) -> Result<(), String> {
        if self.activity < 0.0 || self.weight_loss < 0.0 || self.streak < 0.0 {
            return Err("All weights must be non-negative".to_string());
        }
        let sum = self.activity + self.weight_loss + self.streak;
        if (sum - 1.0).abs() > 1e-9 {
            return Err(format!("Weights must sum to 1.0, got {}", sum));
        }
        Ok(())
    }
}
