//! End-of-run reporting.
//!
//! Produces a JSON run summary next to the credential output and mirrors the
//! headline counts to the terminal log. Failures are never silent: every
//! quarantined archive is represented in the failed count here and as a line
//! in the quarantine log.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::info;
use serde_json::json;

use crate::engine::RunStats;
use crate::parser::HarvestStats;

/// Create the JSON summary of one run.
pub fn create_run_summary(
    started: DateTime<Utc>,
    stats: &RunStats,
    harvest: &HarvestStats,
) -> Result<String> {
    let summary = json!({
        "tool_version": env!("CARGO_PKG_VERSION"),
        "run_started": started.to_rfc3339(),
        "run_finished": Utc::now().to_rfc3339(),
        "archives": {
            "processed": stats.archives_processed,
            "skipped": stats.archives_skipped,
            "failed": stats.archives_failed,
            "password_attempts": stats.password_attempts,
        },
        "harvest": {
            "dumps_extracted": stats.dumps_extracted,
            "dumps_parsed": harvest.files,
            "credentials_written": harvest.records,
        },
    });
    serde_json::to_string_pretty(&summary).context("Failed to serialize run summary to JSON")
}

/// Write the summary JSON into `dir` and return its path.
pub fn write_run_summary(
    dir: &Path,
    started: DateTime<Utc>,
    stats: &RunStats,
    harvest: &HarvestStats,
) -> Result<PathBuf> {
    let contents = create_run_summary(started, stats, harvest)?;
    let path = dir.join("run_summary.json");
    fs::write(&path, contents)
        .with_context(|| format!("Failed to write run summary to {}", path.display()))?;
    Ok(path)
}

/// Mirror the headline counts to the log.
pub fn log_run_summary(stats: &RunStats, harvest: &HarvestStats) {
    info!("Run complete");
    info!(
        "  archives: {} processed, {} skipped, {} failed",
        stats.archives_processed, stats.archives_skipped, stats.archives_failed
    );
    info!("  password attempts: {}", stats.password_attempts);
    info!(
        "  harvest: {} dump(s) extracted, {} parsed, {} credential(s) written",
        stats.dumps_extracted, harvest.files, harvest.records
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn summary_json_carries_the_counts() {
        let stats = RunStats {
            archives_processed: 2,
            archives_skipped: 1,
            archives_failed: 1,
            dumps_extracted: 3,
            password_attempts: 17,
        };
        let harvest = HarvestStats { files: 3, records: 42 };

        let text = create_run_summary(Utc::now(), &stats, &harvest).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["archives"]["processed"], 2);
        assert_eq!(value["archives"]["password_attempts"], 17);
        assert_eq!(value["harvest"]["credentials_written"], 42);
    }

    #[test]
    fn summary_file_lands_in_the_requested_directory() {
        let dir = TempDir::new().unwrap();
        let path = write_run_summary(
            dir.path(),
            Utc::now(),
            &RunStats::default(),
            &HarvestStats::default(),
        )
        .unwrap();
        assert!(path.exists());
        assert_eq!(path.file_name().unwrap(), "run_summary.json");
    }
}
