//! Core data models shared across the pipeline.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Container format of an input file, as determined by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArchiveFormat {
    Zip,
    Rar,
    SevenZip,
    Unsupported,
}

impl std::fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArchiveFormat::Zip => write!(f, "zip"),
            ArchiveFormat::Rar => write!(f, "rar"),
            ArchiveFormat::SevenZip => write!(f, "7z"),
            ArchiveFormat::Unsupported => write!(f, "unsupported"),
        }
    }
}

/// A classified input container. Immutable once built; `volume_group` links
/// sibling volumes of a multi-part set.
#[derive(Debug, Clone)]
pub struct Archive {
    pub path: PathBuf,
    pub format: ArchiveFormat,
    pub size: u64,
    pub volume_group: Option<VolumeGroup>,
}

impl Archive {
    /// The file extraction starts from: the canonical first volume for a
    /// multi-part set, the archive itself otherwise.
    pub fn target(&self) -> &std::path::Path {
        self.volume_group
            .as_ref()
            .map(|g| g.first_volume.as_path())
            .unwrap_or(&self.path)
    }

    pub fn display_name(&self) -> String {
        self.target()
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

/// Sibling files composing one multi-part archive. The whole group is deleted
/// together on success or quarantined together on failure, never partially.
#[derive(Debug, Clone)]
pub struct VolumeGroup {
    /// Canonical first volume; extraction always starts here.
    pub first_volume: PathBuf,
    /// Every file in the directory sharing the base-name prefix, the first
    /// volume included.
    pub siblings: Vec<PathBuf>,
}

/// One dictionary candidate. `secret` of `None` represents the no-password
/// attempt, which is always tried first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordCandidate {
    pub index: usize,
    pub secret: Option<String>,
}

impl PasswordCandidate {
    /// The literal to hand to a decryption API; empty string for the
    /// no-password candidate (the libraries treat it the same as absent).
    pub fn literal(&self) -> &str {
        self.secret.as_deref().unwrap_or("")
    }
}

/// Metadata for an entry listed inside a container, gathered without
/// decrypting anything.
#[derive(Debug, Clone)]
pub struct EntryInfo {
    pub name: String,
    pub size: u64,
    pub encrypted: bool,
}

/// Result of one password attempt against one container. Produced and
/// consumed inside the crack engine, never persisted.
#[derive(Debug)]
pub enum AttemptOutcome {
    /// At least one credential-dump entry landed in the destination.
    /// `pending` counts dump entries still locked after this attempt; ZIP
    /// entries can carry different passwords, so the engine keeps iterating
    /// candidates until it reaches zero.
    Success { extracted: Vec<PathBuf>, pending: usize },
    /// The candidate was rejected; the next one should be tried.
    WrongPassword,
    /// Entry data is damaged in a way no password will fix.
    CorruptEntry,
    /// The container could not be read at all; the archive is quarantined.
    IoError(String),
}

/// Why an input left the pipeline without yielding anything.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FailureReason {
    #[error("unsupported container format")]
    UnsupportedFormat,
    #[error("first volume not found for multi-part set")]
    IncompleteVolumeSet,
    #[error("password dictionary exhausted")]
    CrackFailed,
    #[error("corrupt entry data")]
    CorruptEntry,
    #[error("i/o failure: {0}")]
    Io(String),
}

/// Final status of one per-archive job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    /// Credential dumps extracted; the archive (group) has been removed.
    Processed { extracted: usize },
    /// Nothing to harvest; the archive is left in place untouched.
    Skipped,
    /// The archive (group) has been moved to quarantine.
    Failed(FailureReason),
}

/// A canonical harvested credential. Append-only; all three fields are
/// non-empty by construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub url: String,
    pub username: String,
    pub password: String,
}

impl CredentialRecord {
    /// Flat output-line form, `url:username:password`.
    pub fn as_line(&self) -> String {
        format!("{}:{}:{}", self.url, self.username, self.password)
    }
}

/// Record written to the quarantine log alongside each isolated file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuarantineEntry {
    pub original_path: String,
    pub reason: String,
    pub timestamp: String,
}

/// Stage reported through the progress callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    Start,
    Attempt,
    Complete,
    Error,
}

/// Event handed to the optional progress callback at archive-start,
/// per-attempt, and completion boundaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub status: ProgressStatus,
    pub current: usize,
    pub total: usize,
    pub file_name: String,
}

/// Callback invoked with progress events. The pipeline works identically when
/// no callback is installed.
pub type ProgressFn = dyn Fn(&ProgressEvent) + Send + Sync;

/// Generator for collision-free external filenames: a monotonic counter plus
/// a microsecond timestamp, owned by the process and passed down instead of
/// being read from ambient state.
#[derive(Debug, Default)]
pub struct NameSeq {
    counter: u64,
}

impl NameSeq {
    pub fn new() -> Self {
        Self { counter: 0 }
    }

    /// Next unique external name, e.g. `password_3_1724500000000000.txt`.
    pub fn next(&mut self, ext: &str) -> String {
        let stamp = chrono::Utc::now().timestamp_micros();
        let name = format!("password_{}_{}.{}", self.counter, stamp, ext);
        self.counter += 1;
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_line_form() {
        let rec = CredentialRecord {
            url: "example.com".into(),
            username: "bob".into(),
            password: "hunter2".into(),
        };
        assert_eq!(rec.as_line(), "example.com:bob:hunter2");
    }

    #[test]
    fn name_seq_is_monotonic_and_unique() {
        let mut seq = NameSeq::new();
        let a = seq.next("txt");
        let b = seq.next("txt");
        assert_ne!(a, b);
        assert!(a.starts_with("password_0_"));
        assert!(b.starts_with("password_1_"));
        assert!(a.ends_with(".txt"));
    }

    #[test]
    fn empty_candidate_literal() {
        let c = PasswordCandidate { index: 0, secret: None };
        assert_eq!(c.literal(), "");
    }
}
