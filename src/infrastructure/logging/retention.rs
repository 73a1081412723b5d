//! Removal of rolled log files past their retention period.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use std::path::Path;
use tracing::{debug, warn};

use super::logger::LOG_FILE_NAME;

/// Delete rolled log files in `log_dir` older than `retention_days`.
///
/// Only files produced by the rolling appender (`fixloop.log*`) are touched.
/// Returns the number of files deleted.
pub async fn cleanup_old_logs(log_dir: impl AsRef<Path>, retention_days: u32) -> Result<usize> {
    let log_dir = log_dir.as_ref();
    if !log_dir.exists() {
        return Ok(0);
    }

    let cutoff = Utc::now() - Duration::days(i64::from(retention_days));
    let mut deleted = 0;

    let mut entries = tokio::fs::read_dir(log_dir)
        .await
        .context("failed to read log directory")?;

    while let Some(entry) = entries
        .next_entry()
        .await
        .context("failed to read directory entry")?
    {
        let path = entry.path();
        let is_log = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(LOG_FILE_NAME));
        if !is_log {
            continue;
        }

        let modified: DateTime<Utc> = match entry.metadata().await.and_then(|m| m.modified()) {
            Ok(time) => time.into(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot read log file age");
                continue;
            }
        };

        if modified < cutoff {
            tokio::fs::remove_file(&path)
                .await
                .with_context(|| format!("failed to delete {}", path.display()))?;
            debug!(path = %path.display(), "deleted expired log file");
            deleted += 1;
        }
    }

    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fresh_files_are_kept_and_foreign_files_ignored() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("fixloop.log.2026-10-01"), "{}").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "keep").unwrap();

        assert_eq!(cleanup_old_logs(dir.path(), 30).await.unwrap(), 0);
        assert!(dir.path().join("fixloop.log.2026-10-01").exists());
    }

    #[tokio::test]
    async fn test_zero_retention_deletes_rolled_files_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("fixloop.log.2026-10-01"), "{}").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "keep").unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        assert_eq!(cleanup_old_logs(dir.path(), 0).await.unwrap(), 1);
        assert!(dir.path().join("notes.txt").exists());
    }

    #[tokio::test]
    async fn test_missing_directory_is_not_an_error() {
        assert_eq!(cleanup_old_logs("/nonexistent/fixloop-logs", 1).await.unwrap(), 0);
    }
}
