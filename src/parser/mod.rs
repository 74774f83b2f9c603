//! Credential-dump parsing.
//!
//! A single-pass line-oriented state machine over decoded text. Lines
//! carrying a recognized marker fill one of three pending fields; whenever
//! all three are simultaneously non-empty the triplet is committed and the
//! accumulator resets. The marker heuristics are deliberately loose and
//! case-sensitive because they mirror the field labels stealer logs actually
//! use; a line matching more than one category resolves in the fixed order
//! username, password, url. That precedence decides which historical lines
//! parse, so it stays as-is.

pub mod encoding;

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, info, warn};

use crate::constants::{NOISE_URL_DOMAIN, TRANSIENT_SUFFIX};
use crate::models::CredentialRecord;
use crate::output::OutputSink;

const USERNAME_MARKERS: &[&str] = &["Username", "USER", "LOGIN", "USR"];
const PASSWORD_MARKERS: &[&str] = &["Password", "PASS"];
const URL_MARKERS: &[&str] = &["URL", "Host"];

#[derive(Debug, Default)]
struct ParserState {
    pending_username: String,
    pending_password: String,
    pending_url: String,
}

impl ParserState {
    fn complete(&self) -> bool {
        !self.pending_username.is_empty()
            && !self.pending_password.is_empty()
            && !self.pending_url.is_empty()
    }

    fn take(&mut self) -> CredentialRecord {
        CredentialRecord {
            url: std::mem::take(&mut self.pending_url),
            username: std::mem::take(&mut self.pending_username),
            password: std::mem::take(&mut self.pending_password),
        }
    }

    fn reset(&mut self) {
        self.pending_username.clear();
        self.pending_password.clear();
        self.pending_url.clear();
    }
}

/// Username/password values sit after the last `:` or `=` on the line; a
/// marker line with no separator contributes the whole line.
fn value_after_last_sep(line: &str) -> String {
    match line.rfind([':', '=']) {
        Some(idx) => line[idx + 1..].trim().to_string(),
        None => line.trim().to_string(),
    }
}

/// URL values sit after the first `:` then the first `=`, with any scheme
/// prefix up to and including `://` dropped so records carry bare hosts.
fn url_value(line: &str) -> String {
    let mut rest = match line.find(':') {
        Some(idx) => &line[idx + 1..],
        None => line,
    };
    if let Some(idx) = rest.find('=') {
        rest = &rest[idx + 1..];
    }
    let mut rest = rest.trim();
    if let Some(idx) = rest.find("://") {
        rest = &rest[idx + 3..];
    }
    rest.trim_start_matches(['/', ':']).trim().to_string()
}

fn contains_any(line: &str, markers: &[&str]) -> bool {
    markers.iter().any(|m| line.contains(m))
}

/// True when the committed url points at the noise domain itself. The scheme
/// is already stripped, so the domain must be the url's host, not merely a
/// substring (`chat.me/login` is a real record).
fn is_noise_url(url: &str) -> bool {
    url == NOISE_URL_DOMAIN
        || url
            .strip_prefix(NOISE_URL_DOMAIN)
            .map(|rest| rest.starts_with('/'))
            .unwrap_or(false)
}

/// Run the state machine over `text`, invoking `emit` for each committed
/// record that survives the noise filter. Returns the emitted count.
pub fn parse_text<F>(text: &str, mut emit: F) -> Result<usize>
where
    F: FnMut(&CredentialRecord) -> Result<()>,
{
    let mut state = ParserState::default();
    let mut emitted = 0usize;

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('=') {
            continue;
        }

        if contains_any(line, USERNAME_MARKERS) {
            state.pending_username = value_after_last_sep(line);
        } else if contains_any(line, PASSWORD_MARKERS) {
            state.pending_password = value_after_last_sep(line);
        } else if contains_any(line, URL_MARKERS) {
            state.pending_url = url_value(line);
        } else {
            continue;
        }

        if state.complete() {
            if is_noise_url(&state.pending_url) {
                debug!("Dropping noise record for {}", state.pending_url);
                state.reset();
            } else {
                let record = state.take();
                emit(&record)?;
                emitted += 1;
            }
        }
    }

    // A partial triplet at end of stream is discarded, never emitted.
    Ok(emitted)
}

/// Parse one extracted dump file, appending records to the sink. The file is
/// consumed: deleted after parsing whether or not it yielded records.
pub fn harvest_file(path: &Path, sink: &mut OutputSink) -> Result<usize> {
    let text = encoding::read_normalized(path)?;
    let count = parse_text(&text, |record| sink.append(record))?;
    if count == 0 {
        info!("No credentials found in {}", path.display());
    }
    fs::remove_file(path)
        .with_context(|| format!("failed to remove parsed dump {}", path.display()))?;
    Ok(count)
}

#[derive(Debug, Default, Clone, Copy)]
pub struct HarvestStats {
    pub files: usize,
    pub records: usize,
}

/// Sweep a directory of extracted dumps through the parser. Empty files are
/// deleted without parsing; per-file failures are logged and do not stop the
/// sweep.
pub fn harvest_directory(dir: &Path, sink: &mut OutputSink) -> Result<HarvestStats> {
    let mut stats = HarvestStats::default();
    let entries = fs::read_dir(dir)
        .with_context(|| format!("failed to read dump directory {}", dir.display()))?;

    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if name.ends_with(TRANSIENT_SUFFIX) {
            continue;
        }
        match entry.metadata() {
            Ok(m) if m.len() == 0 => {
                debug!("Removing empty dump {}", path.display());
                let _ = fs::remove_file(&path);
                continue;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("Could not stat {}: {}", path.display(), e);
                continue;
            }
        }
        match harvest_file(&path, sink) {
            Ok(count) => {
                stats.files += 1;
                stats.records += count;
            }
            Err(e) => warn!("Failed to parse {}: {e:#}", path.display()),
        }
    }
    Ok(stats)
}
