//! Worker outcome files and status tallies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::ops::AddAssign;

use super::test_instance::OverallStatus;

/// Number of test instances per overall status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    #[serde(default)]
    pub pass: u64,
    #[serde(default)]
    pub fail: u64,
    #[serde(default)]
    pub partial: u64,
    #[serde(default)]
    pub error: u64,
}

impl StatusCounts {
    pub fn record(&mut self, status: OverallStatus) {
        self.add(status, 1);
    }

    pub fn add(&mut self, status: OverallStatus, n: u64) {
        match status {
            OverallStatus::Pass => self.pass += n,
            OverallStatus::Fail => self.fail += n,
            OverallStatus::Partial => self.partial += n,
            OverallStatus::Error => self.error += n,
        }
    }

    pub fn total(&self) -> u64 {
        self.pass + self.fail + self.partial + self.error
    }

    pub fn failing(&self) -> u64 {
        self.total() - self.pass
    }
}

impl AddAssign for StatusCounts {
    fn add_assign(&mut self, other: Self) {
        self.pass += other.pass;
        self.fail += other.fail;
        self.partial += other.partial;
        self.error += other.error;
    }
}

impl FromIterator<OverallStatus> for StatusCounts {
    fn from_iter<I: IntoIterator<Item = OverallStatus>>(iter: I) -> Self {
        let mut counts = Self::default();
        for status in iter {
            counts.record(status);
        }
        counts
    }
}

/// Summary a worker writes to `worker-{index}.json` when its batch is done.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerOutcome {
    pub worker_index: usize,
    pub run_id: String,
    /// Statuses of every pair in the batch, reused ones included.
    pub counts: StatusCounts,
    /// Pairs sent to the test oracle by this worker.
    pub executed: u64,
    /// Pairs whose result already existed and was reused.
    pub reused: u64,
    /// Results that could not be written.
    pub persistence_failures: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl WorkerOutcome {
    pub fn new(worker_index: usize, run_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            worker_index,
            run_id: run_id.into(),
            counts: StatusCounts::default(),
            executed: 0,
            reused: 0,
            persistence_failures: 0,
            started_at: now,
            finished_at: now,
        }
    }

    /// File name of the outcome file for a worker index.
    pub fn file_name(worker_index: usize) -> String {
        format!("worker-{worker_index}.json")
    }
}
