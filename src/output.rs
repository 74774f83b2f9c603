//! Durable outputs: the credential stream and the failure quarantine.
//!
//! The sink reopens, appends, and flushes on every record. Archive cracking
//! dominates runtime, so the write path trades throughput for the guarantee
//! that a crash mid-run loses at most the in-flight record. Quarantined files
//! are moved, never copied, so the input directory only ever reflects pending
//! or successful work.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use log::{info, warn};

use crate::models::{CredentialRecord, QuarantineEntry, VolumeGroup};

/// Append-only writer for credential records, one `url:username:password`
/// line per record.
pub struct OutputSink {
    path: PathBuf,
}

impl OutputSink {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create output directory {}", parent.display())
                })?;
            }
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&mut self, record: &CredentialRecord) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open output {}", self.path.display()))?;
        writeln!(file, "{}", record.as_line())
            .with_context(|| format!("failed to append to {}", self.path.display()))?;
        file.flush()
            .with_context(|| format!("failed to flush {}", self.path.display()))?;
        Ok(())
    }
}

/// Holding area for inputs the pipeline could not process. Entries are
/// recorded in a JSONL log alongside the moved files and are never retried.
pub struct Quarantine {
    dir: PathBuf,
    log_path: PathBuf,
}

impl Quarantine {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create quarantine {}", dir.display()))?;
        let log_path = dir.join("quarantine.jsonl");
        Ok(Self { dir, log_path })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Move one file into quarantine and record why.
    pub fn isolate(&self, path: &Path, reason: &str) -> Result<()> {
        let name = path
            .file_name()
            .ok_or_else(|| anyhow!("cannot quarantine pathless file {}", path.display()))?;
        let mut target = self.dir.join(name);
        // A name collision from an earlier run must not clobber evidence.
        if target.exists() {
            let stamped = format!(
                "{}_{}",
                Utc::now().timestamp_micros(),
                name.to_string_lossy()
            );
            target = self.dir.join(stamped);
        }

        fs::rename(path, &target)
            .or_else(|_| {
                fs::copy(path, &target).map(|_| ())?;
                fs::remove_file(path)
            })
            .with_context(|| format!("failed to quarantine {}", path.display()))?;

        info!("Quarantined {} ({reason})", path.display());
        self.record(QuarantineEntry {
            original_path: path.display().to_string(),
            reason: reason.to_string(),
            timestamp: Utc::now().to_rfc3339(),
        });
        Ok(())
    }

    /// Quarantine every sibling of a volume group. The group moves together
    /// or not at all from the caller's perspective; individual move failures
    /// are logged and the rest still move.
    pub fn isolate_group(&self, group: &VolumeGroup, reason: &str) {
        for sibling in &group.siblings {
            if let Err(e) = self.isolate(sibling, reason) {
                warn!("Could not quarantine {}: {e:#}", sibling.display());
            }
        }
    }

    fn record(&self, entry: QuarantineEntry) {
        let line = match serde_json::to_string(&entry) {
            Ok(line) => line,
            Err(e) => {
                warn!("Could not serialize quarantine entry: {e}");
                return;
            }
        };
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .and_then(|mut f| writeln!(f, "{line}"));
        if let Err(e) = result {
            warn!("Could not write quarantine log: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn sink_appends_and_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("creds.txt");
        {
            let mut sink = OutputSink::new(&path).unwrap();
            sink.append(&CredentialRecord {
                url: "example.com".into(),
                username: "bob".into(),
                password: "hunter2".into(),
            })
            .unwrap();
        }
        {
            let mut sink = OutputSink::new(&path).unwrap();
            sink.append(&CredentialRecord {
                url: "other.net".into(),
                username: "alice".into(),
                password: "s3cret".into(),
            })
            .unwrap();
        }
        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "example.com:bob:hunter2\nother.net:alice:s3cret\n");
    }

    #[test]
    fn record_round_trips_through_the_line_form() {
        let record = CredentialRecord {
            url: "example.com".into(),
            username: "bob".into(),
            password: "hunter2".into(),
        };
        let line = record.as_line();
        let parts: Vec<&str> = line.split(':').collect();
        assert_eq!(parts, vec!["example.com", "bob", "hunter2"]);
    }

    #[test]
    fn isolate_moves_the_file_and_logs_the_reason() {
        let input = TempDir::new().unwrap();
        let qdir = TempDir::new().unwrap();
        let victim = input.path().join("broken.rar");
        fs::write(&victim, b"junk").unwrap();

        let quarantine = Quarantine::new(qdir.path().join("q")).unwrap();
        quarantine.isolate(&victim, "crack failed").unwrap();

        assert!(!victim.exists());
        assert!(quarantine.dir().join("broken.rar").exists());
        let log = fs::read_to_string(quarantine.dir().join("quarantine.jsonl")).unwrap();
        assert!(log.contains("crack failed"));
        assert!(log.contains("broken.rar"));
    }

    #[test]
    fn group_isolation_moves_every_sibling() {
        let input = TempDir::new().unwrap();
        let qdir = TempDir::new().unwrap();
        let mut siblings = Vec::new();
        for name in ["set.part1.rar", "set.part2.rar", "set.part3.rar"] {
            let path = input.path().join(name);
            fs::write(&path, b"junk").unwrap();
            siblings.push(path);
        }
        let group = VolumeGroup { first_volume: siblings[0].clone(), siblings: siblings.clone() };

        let quarantine = Quarantine::new(qdir.path().join("q")).unwrap();
        quarantine.isolate_group(&group, "dictionary exhausted");

        for sibling in &siblings {
            assert!(!sibling.exists());
        }
        assert_eq!(
            fs::read_to_string(quarantine.dir().join("quarantine.jsonl"))
                .unwrap()
                .lines()
                .count(),
            3
        );
    }
}
