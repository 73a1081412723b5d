//! Convergence metrics.

use serde::{Deserialize, Serialize};

/// One point of the metrics history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricsPoint {
    pub iteration: u32,
    pub pass_count: u32,
    pub avg_score: f64,
}

impl MetricsPoint {
    pub fn new(iteration: u32, pass_count: u32, avg_score: f64) -> Self {
        Self {
            iteration,
            pass_count,
            avg_score,
        }
    }

    /// True when `self` is no better than `earlier` on both dimensions.
    pub fn no_better_than(&self, earlier: &Self) -> bool {
        self.pass_count <= earlier.pass_count && self.avg_score <= earlier.avg_score
    }
}

/// Verdict of the stall detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StallVerdict {
    Progressing,
    Stalled,
}

impl StallVerdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Progressing => "progressing",
            Self::Stalled => "stalled",
        }
    }

    pub fn is_stalled(&self) -> bool {
        matches!(self, Self::Stalled)
    }
}
