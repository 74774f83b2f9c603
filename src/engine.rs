//! The crack engine: per-archive jobs driven over the password dictionary.
//!
//! The engine sweeps the input directory, plans one job per archive (volume
//! groups collapse to a single job keyed on their first volume), and drives
//! the format adapter through the dictionary until the first success or
//! exhaustion. Each job owns a scratch directory and shares nothing with
//! other jobs except the output stream and the dictionary. Failures are
//! converted to quarantine actions at the job boundary; one archive can never
//! abort the batch.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::Serialize;
use tempfile::TempDir;
use walkdir::WalkDir;

use crate::adapters::{adapter_for, password_entries, FormatAdapter, Listing};
use crate::classify::classify;
use crate::constants::{
    is_nested_archive, ARCHIVE_EXTENSIONS, DELETE_RETRY_ATTEMPTS, DELETE_RETRY_DELAY_MS,
    MAX_NESTING_DEPTH, MAX_SWEEP_PASSES, TRANSIENT_SUFFIX, VOLUME_SUFFIX_RE,
};
use crate::dictionary::PasswordDictionary;
use crate::models::{
    Archive, ArchiveFormat, AttemptOutcome, FailureReason, JobStatus, NameSeq, ProgressEvent,
    ProgressFn, ProgressStatus,
};
use crate::output::Quarantine;
use crate::volumes;

/// Counters reported at the end of a run.
#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct RunStats {
    pub archives_processed: usize,
    pub archives_skipped: usize,
    pub archives_failed: usize,
    pub dumps_extracted: usize,
    pub password_attempts: usize,
}

/// Result of cracking one container (outer or nested).
enum ContainerResult {
    Processed { dumps: usize },
    Skipped,
    Failed(FailureReason),
}

pub struct CrackEngine<'a> {
    dictionary: &'a PasswordDictionary,
    quarantine: &'a Quarantine,
    /// Destination for extracted credential dumps.
    pass_dir: PathBuf,
    progress: Option<Box<ProgressFn>>,
    cancel: Arc<AtomicBool>,
    names: NameSeq,
}

impl<'a> CrackEngine<'a> {
    pub fn new(
        dictionary: &'a PasswordDictionary,
        quarantine: &'a Quarantine,
        pass_dir: impl Into<PathBuf>,
        cancel: Arc<AtomicBool>,
    ) -> Self {
        Self {
            dictionary,
            quarantine,
            pass_dir: pass_dir.into(),
            progress: None,
            cancel,
            names: NameSeq::new(),
        }
    }

    /// Install the optional progress callback. The engine behaves identically
    /// without one.
    pub fn with_progress(mut self, progress: Box<ProgressFn>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Sweep the input directory until no unhandled archive remains. Each
    /// pass picks up files that appeared since the previous one; archives
    /// skipped or failed once are never retried within the run.
    pub fn run(&mut self, input_dir: &Path, recursive: bool) -> Result<RunStats> {
        fs::create_dir_all(&self.pass_dir)
            .with_context(|| format!("failed to create {}", self.pass_dir.display()))?;

        let mut stats = RunStats::default();
        let mut handled: HashSet<PathBuf> = HashSet::new();

        for pass in 1..=MAX_SWEEP_PASSES {
            if self.cancelled() {
                info!("Cancellation requested, stopping before pass {pass}");
                break;
            }
            let jobs = self.plan_jobs(input_dir, recursive, &mut handled, &mut stats);
            if jobs.is_empty() {
                break;
            }
            debug!("Sweep pass {pass}: {} job(s)", jobs.len());

            let total = jobs.len();
            for (index, archive) in jobs.into_iter().enumerate() {
                if self.cancelled() {
                    info!("Cancellation requested, stopping at job boundary");
                    return Ok(stats);
                }
                match self.execute(&archive, index + 1, total, &mut stats) {
                    JobStatus::Processed { extracted } => {
                        stats.archives_processed += 1;
                        stats.dumps_extracted += extracted;
                    }
                    JobStatus::Skipped => stats.archives_skipped += 1,
                    JobStatus::Failed(_) => stats.archives_failed += 1,
                }
            }
        }
        Ok(stats)
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    fn emit(&self, status: ProgressStatus, current: usize, total: usize, file_name: &str) {
        if let Some(callback) = &self.progress {
            callback(&ProgressEvent {
                status,
                current,
                total,
                file_name: file_name.to_string(),
            });
        }
    }

    /// Scan for candidate archives and collapse volume siblings into single
    /// jobs. Everything examined here lands in `handled` so later passes only
    /// see newly arrived files.
    fn plan_jobs(
        &self,
        input_dir: &Path,
        recursive: bool,
        handled: &mut HashSet<PathBuf>,
        stats: &mut RunStats,
    ) -> Vec<Archive> {
        let mut jobs = Vec::new();
        for path in scan_input(input_dir, recursive) {
            if handled.contains(&path) {
                continue;
            }

            let classification = classify(&path);
            match classification.format {
                ArchiveFormat::Unsupported => {
                    debug!(
                        "Leaving {} untouched: {}",
                        path.display(),
                        FailureReason::UnsupportedFormat
                    );
                    handled.insert(path);
                    stats.archives_skipped += 1;
                }
                format if classification.multi_volume => match volumes::resolve(&path) {
                    Some(group) => {
                        if handled.contains(&group.first_volume) {
                            handled.insert(path);
                            continue;
                        }
                        for sibling in &group.siblings {
                            handled.insert(sibling.clone());
                        }
                        handled.insert(path.clone());
                        let size = file_size(&group.first_volume);
                        jobs.push(Archive { path, format, size, volume_group: Some(group) });
                    }
                    None => {
                        warn!(
                            "Skipping {}: {}",
                            path.display(),
                            FailureReason::IncompleteVolumeSet
                        );
                        handled.insert(path);
                        stats.archives_skipped += 1;
                    }
                },
                format => {
                    handled.insert(path.clone());
                    let size = file_size(&path);
                    jobs.push(Archive { path, format, size, volume_group: None });
                }
            }
        }
        jobs
    }

    /// Run one job to completion: crack, then delete on success or quarantine
    /// on failure. Skipped archives are left exactly as found.
    fn execute(
        &mut self,
        archive: &Archive,
        current: usize,
        total: usize,
        stats: &mut RunStats,
    ) -> JobStatus {
        let name = archive.display_name();
        info!("Processing {name} ({current}/{total}, {} bytes)", archive.size);
        self.emit(ProgressStatus::Start, current, total, &name);

        let scratch = match TempDir::new() {
            Ok(dir) => dir,
            Err(e) => {
                warn!("Could not create scratch directory: {e}");
                let reason = FailureReason::Io(e.to_string());
                self.send_to_quarantine(archive, &reason);
                self.emit(ProgressStatus::Error, current, total, &name);
                return JobStatus::Failed(reason);
            }
        };

        let mut visited = HashSet::new();
        let result = self.crack_container(archive.target(), scratch.path(), &mut visited, 0, stats);
        match result {
            ContainerResult::Processed { dumps } => {
                info!("Unlocked {name}: {dumps} dump(s) extracted");
                self.remove_source(archive);
                self.emit(ProgressStatus::Complete, current, total, &name);
                JobStatus::Processed { extracted: dumps }
            }
            ContainerResult::Skipped => {
                info!("Skipped {name}: nothing to harvest");
                self.emit(ProgressStatus::Complete, current, total, &name);
                JobStatus::Skipped
            }
            ContainerResult::Failed(reason) => {
                warn!("Failed on {name}: {reason}");
                self.send_to_quarantine(archive, &reason);
                self.emit(ProgressStatus::Error, current, total, &name);
                JobStatus::Failed(reason)
            }
        }
    }

    fn send_to_quarantine(&self, archive: &Archive, reason: &FailureReason) {
        let reason = reason.to_string();
        match &archive.volume_group {
            Some(group) => self.quarantine.isolate_group(group, &reason),
            None => {
                if let Err(e) = self.quarantine.isolate(&archive.path, &reason) {
                    warn!("Could not quarantine {}: {e:#}", archive.path.display());
                }
            }
        }
    }

    fn remove_source(&self, archive: &Archive) {
        match &archive.volume_group {
            Some(group) => {
                for sibling in &group.siblings {
                    delete_with_retry(sibling);
                }
            }
            None => delete_with_retry(&archive.path),
        }
    }

    /// Crack one container: resolve cleartext-wrapped nested archives first,
    /// then drive the dictionary over the credential-dump entries.
    fn crack_container(
        &mut self,
        target: &Path,
        scratch: &Path,
        visited: &mut HashSet<PathBuf>,
        depth: usize,
        stats: &mut RunStats,
    ) -> ContainerResult {
        let canonical = target.canonicalize().unwrap_or_else(|_| target.to_path_buf());
        if !visited.insert(canonical) {
            warn!("Already visited {}, breaking nesting loop", target.display());
            return ContainerResult::Skipped;
        }
        if depth > MAX_NESTING_DEPTH {
            warn!("Nesting depth cap reached at {}", target.display());
            return ContainerResult::Failed(FailureReason::CrackFailed);
        }

        let format = classify(target).format;
        let Some(adapter) = adapter_for(format) else {
            return ContainerResult::Skipped;
        };

        let entries = match adapter.list_entries(target, scratch) {
            Ok(Listing::Entries(entries)) => entries,
            Ok(Listing::PasswordGated) => {
                // The entry table itself needs a password, so nothing can be
                // pre-inspected; the adapter enumerates during each attempt.
                debug!("Entry table of {} is password-gated", target.display());
                return self.drive_dictionary(adapter.as_ref(), target, scratch, stats, 0);
            }
            Err(e) => return ContainerResult::Failed(FailureReason::Io(format!("{e:#}"))),
        };

        // Cleartext-wrapped nested archives are resolved to completion before
        // the outer container is considered done.
        let mut nested_attempted = 0usize;
        let mut nested_dumps = 0usize;
        let mut nested_processed = 0usize;
        let mut nested_failure: Option<FailureReason> = None;
        for entry in entries.iter().filter(|e| !e.encrypted && is_nested_archive(&e.name)) {
            nested_attempted += 1;
            let nested_dir = scratch.join(format!("nested_{depth}_{nested_attempted}"));
            if let Err(e) = fs::create_dir_all(&nested_dir) {
                nested_failure.get_or_insert(FailureReason::Io(e.to_string()));
                continue;
            }
            let inner = match adapter.extract_plain_entry(target, &entry.name, &nested_dir) {
                Ok(path) => path,
                Err(e) => {
                    warn!("Could not unwrap nested archive {}: {e:#}", entry.name);
                    nested_failure.get_or_insert(FailureReason::Io(format!("{e:#}")));
                    continue;
                }
            };
            debug!("Descending into nested archive {}", inner.display());
            match self.crack_container(&inner, scratch, visited, depth + 1, stats) {
                ContainerResult::Processed { dumps } => {
                    nested_processed += 1;
                    nested_dumps += dumps;
                }
                ContainerResult::Skipped => {}
                ContainerResult::Failed(reason) => {
                    nested_failure.get_or_insert(reason);
                }
            }
        }

        let targets = password_entries(&entries);
        if targets.is_empty() {
            // With no dump entries of its own, the container's fate follows
            // its nested archives; with none of those either, it is simply
            // not our kind of archive.
            return if nested_attempted == 0 {
                ContainerResult::Skipped
            } else if nested_processed > 0 {
                ContainerResult::Processed { dumps: nested_dumps }
            } else if let Some(reason) = nested_failure {
                ContainerResult::Failed(reason)
            } else {
                ContainerResult::Skipped
            };
        }
        debug!(
            "{} credential-dump entr(ies) in {}",
            targets.len(),
            target.display()
        );

        self.drive_dictionary(adapter.as_ref(), target, scratch, stats, nested_dumps)
    }

    /// Iterate the dictionary over one container. ZIP entries can carry
    /// different passwords, so a successful attempt with entries still
    /// pending keeps the iteration going and its yield accumulates; the
    /// container is done when an attempt reports nothing pending.
    fn drive_dictionary(
        &mut self,
        adapter: &dyn FormatAdapter,
        target: &Path,
        scratch: &Path,
        stats: &mut RunStats,
        nested_dumps: usize,
    ) -> ContainerResult {
        let dictionary = self.dictionary;
        let dict_len = dictionary.len();
        let file_name = target
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let mut resolved = HashSet::new();
        let mut dumps = nested_dumps;
        for candidate in dictionary.candidates() {
            self.emit(ProgressStatus::Attempt, candidate.index + 1, dict_len, &file_name);
            stats.password_attempts += 1;
            let outcome = adapter.try_open(
                target,
                &candidate,
                &self.pass_dir,
                scratch,
                &mut self.names,
                &mut resolved,
            );
            match outcome {
                AttemptOutcome::Success { extracted, pending } => {
                    debug!(
                        "Candidate {} unlocked {} entr(ies) in {}",
                        candidate.index,
                        extracted.len(),
                        target.display()
                    );
                    dumps += extracted.len();
                    if pending == 0 {
                        return ContainerResult::Processed { dumps };
                    }
                    debug!("{pending} dump entr(ies) still locked in {}", target.display());
                }
                AttemptOutcome::WrongPassword => continue,
                AttemptOutcome::CorruptEntry => {
                    return ContainerResult::Failed(FailureReason::CorruptEntry)
                }
                AttemptOutcome::IoError(msg) => {
                    return ContainerResult::Failed(FailureReason::Io(msg))
                }
            }
        }

        if dumps > nested_dumps {
            // Dictionary exhausted with some entries still locked; the
            // recovered dumps are kept and the container counts as processed.
            warn!(
                "Dictionary exhausted with entries still locked in {}",
                target.display()
            );
            return ContainerResult::Processed { dumps };
        }
        ContainerResult::Failed(FailureReason::CrackFailed)
    }
}

/// Candidate archives in the input directory: archive extensions plus
/// volume-convention names, minus in-flight downloads and split-part
/// companions (a `foo.zip.001` next to `foo.zip` belongs to the spanning
/// logic of `foo.zip`'s own job).
fn scan_input(input_dir: &Path, recursive: bool) -> Vec<PathBuf> {
    let walker = if recursive {
        WalkDir::new(input_dir)
    } else {
        WalkDir::new(input_dir).max_depth(1)
    };

    let mut paths: Vec<PathBuf> = walker
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.path().to_path_buf())
        .filter(|p| {
            let name = p.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
            let lower = name.to_ascii_lowercase();
            if lower.ends_with(TRANSIENT_SUFFIX) {
                return false;
            }
            if is_split_companion(p, &name) {
                return false;
            }
            ARCHIVE_EXTENSIONS.iter().any(|ext| lower.ends_with(&format!(".{ext}")))
                || VOLUME_SUFFIX_RE.is_match(&name)
        })
        .collect();
    paths.sort();
    paths
}

/// True for numeric-suffix companions of an archive that itself exists, e.g.
/// `dump.zip.001` alongside `dump.zip`.
fn is_split_companion(path: &Path, name: &str) -> bool {
    let Some((stem, suffix)) = name.rsplit_once('.') else {
        return false;
    };
    if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    path.with_file_name(stem).is_file()
}

fn file_size(path: &Path) -> u64 {
    fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

/// Delete a source archive, tolerating transient "file in use" conditions.
/// Failure downgrades to a warning; the job still counts as processed.
fn delete_with_retry(path: &Path) {
    for attempt in 1..=DELETE_RETRY_ATTEMPTS {
        match fs::remove_file(path) {
            Ok(()) => return,
            Err(_) if attempt < DELETE_RETRY_ATTEMPTS => {
                thread::sleep(Duration::from_millis(DELETE_RETRY_DELAY_MS));
            }
            Err(e) => warn!("Could not delete {} after retries: {e}", path.display()),
        }
    }
}
