//! Stall detection over the metrics history of a loop.

use std::sync::Arc;

use crate::domain::errors::DomainResult;
use crate::domain::models::{MetricsPoint, StallVerdict};
use crate::domain::ports::MetricsRepository;

/// Entries needed before a verdict other than `Progressing` is possible.
pub const STALL_WINDOW: usize = 3;

/// Judge a metrics history.
///
/// The latest point is compared with the point two positions before it; when
/// it is no better on both pass count and average score the loop has stalled.
pub fn evaluate(history: &[MetricsPoint]) -> StallVerdict {
    if history.len() < STALL_WINDOW {
        return StallVerdict::Progressing;
    }
    let latest = &history[history.len() - 1];
    let prior = &history[history.len() - STALL_WINDOW];
    if latest.no_better_than(prior) {
        StallVerdict::Stalled
    } else {
        StallVerdict::Progressing
    }
}

/// Records metrics points and evaluates the stored history.
pub struct StallDetector {
    metrics: Arc<dyn MetricsRepository>,
}

impl StallDetector {
    pub fn new(metrics: Arc<dyn MetricsRepository>) -> Self {
        Self { metrics }
    }

    /// Append `point` to the history of `loop_id` and judge the result.
    pub async fn record(&self, loop_id: &str, point: MetricsPoint) -> DomainResult<StallVerdict> {
        self.metrics.append(loop_id, &point).await?;
        // A resumed loop may already hold points for later iterations.
        let mut history = self.metrics.history(loop_id).await?;
        history.retain(|p| p.iteration <= point.iteration);
        let verdict = evaluate(&history);
        tracing::info!(
            loop_id,
            iteration = point.iteration,
            pass_count = point.pass_count,
            avg_score = point.avg_score,
            verdict = verdict.as_str(),
            "Recorded metrics point"
        );
        Ok(verdict)
    }

    pub async fn verdict(&self, loop_id: &str) -> DomainResult<StallVerdict> {
        let history = self.metrics.history(loop_id).await?;
        Ok(evaluate(&history))
    }
}
