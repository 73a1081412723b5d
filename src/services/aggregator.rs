//! Reduction of worker outcome files into run totals.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::models::{StatusCounts, WorkerOutcome};

/// Totals across every worker of one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateReport {
    pub counts: StatusCounts,
    pub executed: u64,
    pub reused: u64,
    pub persistence_failures: u64,
    /// Worker indexes whose outcome file was absent.
    pub missing_workers: Vec<usize>,
    /// Worker indexes whose outcome file could not be parsed.
    pub unreadable_workers: Vec<usize>,
}

impl AggregateReport {
    pub fn is_complete(&self) -> bool {
        self.missing_workers.is_empty() && self.unreadable_workers.is_empty()
    }
}

/// What was found for one worker index.
#[derive(Debug, Clone)]
pub enum WorkerSlot {
    Reported(WorkerOutcome),
    Missing,
    Unreadable,
}

/// Sum the outcomes. Missing or unreadable slots contribute zero.
pub fn aggregate(slots: impl IntoIterator<Item = (usize, WorkerSlot)>) -> AggregateReport {
    let mut report = AggregateReport::default();
    for (index, slot) in slots {
        match slot {
            WorkerSlot::Reported(outcome) => {
                report.counts += outcome.counts;
                report.executed += outcome.executed;
                report.reused += outcome.reused;
                report.persistence_failures += outcome.persistence_failures;
            }
            WorkerSlot::Missing => report.missing_workers.push(index),
            WorkerSlot::Unreadable => report.unreadable_workers.push(index),
        }
    }
    report
}

/// Read the outcome file of worker `index` from `dir`.
pub fn read_slot(dir: &Path, index: usize) -> WorkerSlot {
    let path = dir.join(WorkerOutcome::file_name(index));
    let raw = match std::fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(_) => return WorkerSlot::Missing,
    };
    if raw.trim().is_empty() {
        return WorkerSlot::Missing;
    }
    match serde_json::from_str(&raw) {
        Ok(outcome) => WorkerSlot::Reported(outcome),
        Err(e) => {
            tracing::warn!(worker = index, path = %path.display(), error = %e, "Unreadable worker outcome");
            WorkerSlot::Unreadable
        }
    }
}

/// Aggregate the outcome files of workers `0..workers` in `dir`.
pub fn aggregate_dir(dir: &Path, workers: usize) -> AggregateReport {
    let report = aggregate((0..workers).map(|i| (i, read_slot(dir, i))));
    if !report.is_complete() {
        tracing::warn!(
            missing = ?report.missing_workers,
            unreadable = ?report.unreadable_workers,
            "Some workers produced no usable output"
        );
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn outcome(index: usize, pass: u64, fail: u64) -> WorkerOutcome {
        let mut outcome = WorkerOutcome::new(index, "run");
        outcome.counts.pass = pass;
        outcome.counts.fail = fail;
        outcome.executed = pass + fail;
        outcome
    }

    #[test]
    fn test_aggregation_conserves_counts() {
        let report = aggregate(vec![
            (0, WorkerSlot::Reported(outcome(0, 3, 1))),
            (1, WorkerSlot::Reported(outcome(1, 2, 2))),
        ]);
        assert_eq!(report.counts.pass, 5);
        assert_eq!(report.counts.fail, 3);
        assert_eq!(report.executed, 8);
        assert!(report.is_complete());
    }

    #[test]
    fn test_missing_and_unreadable_files_contribute_zero() {
        let dir = TempDir::new().unwrap();
        let written = outcome(0, 4, 0);
        std::fs::write(
            dir.path().join(WorkerOutcome::file_name(0)),
            serde_json::to_string(&written).unwrap(),
        )
        .unwrap();
        std::fs::write(dir.path().join(WorkerOutcome::file_name(2)), "{not json").unwrap();

        let report = aggregate_dir(dir.path(), 3);
        assert_eq!(report.counts.total(), 4);
        assert_eq!(report.missing_workers, vec![1]);
        assert_eq!(report.unreadable_workers, vec![2]);
    }

    #[test]
    fn test_empty_file_is_missing() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(WorkerOutcome::file_name(0)), "").unwrap();
        assert!(matches!(read_slot(dir.path(), 0), WorkerSlot::Missing));
    }
}
