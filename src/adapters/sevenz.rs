//! 7z adapter.
//!
//! The container shares one password and the format carries integrity
//! metadata, so a wrong candidate fails fast at open or during entry
//! decompression rather than silently yielding garbage. A successful open is
//! still treated as provisional: extracted bytes must be non-empty before the
//! attempt counts as a success.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use log::warn;
use sevenz_rust::{Password, SevenZReader};

use crate::constants::{is_password_entry, MAX_ENTRY_SIZE};
use crate::models::{AttemptOutcome, EntryInfo, NameSeq, PasswordCandidate};

use super::{sanitize_entry_name, FormatAdapter, Listing};

pub struct SevenZipAdapter;

impl FormatAdapter for SevenZipAdapter {
    fn list_entries(&self, archive: &Path, _scratch: &Path) -> Result<Listing> {
        // Encrypted 7z archives usually encrypt the header table too, so
        // the passwordless open itself is the gate.
        let mut reader = match open_reader(archive, Password::empty()) {
            Ok(r) => r,
            Err(e) if is_password_failure(&e) => return Ok(Listing::PasswordGated),
            Err(e) => return Err(anyhow!("failed to open 7z {}: {e}", archive.display())),
        };

        let mut entries = Vec::new();
        let walk = reader.for_each_entries(|entry, _reader| {
            if !entry.is_directory() {
                entries.push(EntryInfo {
                    name: entry.name().to_string(),
                    size: entry.size(),
                    // Readable headers mean entries are reachable for plain
                    // extraction; stream encryption surfaces on read.
                    encrypted: false,
                });
            }
            Ok(true)
        });
        match walk {
            Ok(()) => Ok(Listing::Entries(entries)),
            Err(e) if is_password_failure(&e) => Ok(Listing::PasswordGated),
            Err(e) => Err(anyhow!("failed to list 7z {}: {e}", archive.display())),
        }
    }

    fn try_open(
        &self,
        archive: &Path,
        candidate: &PasswordCandidate,
        dest: &Path,
        _scratch: &Path,
        names: &mut NameSeq,
        _resolved: &mut HashSet<String>,
    ) -> AttemptOutcome {
        let password = if candidate.literal().is_empty() {
            Password::empty()
        } else {
            Password::from(candidate.literal())
        };

        let mut reader = match open_reader(archive, password) {
            Ok(r) => r,
            Err(e) if is_password_failure(&e) => return AttemptOutcome::WrongPassword,
            Err(sevenz_rust::Error::Io(e, _)) => return AttemptOutcome::IoError(e.to_string()),
            Err(e) => {
                warn!("Unreadable 7z container {}: {e}", archive.display());
                return AttemptOutcome::CorruptEntry;
            }
        };

        let mut extracted: Vec<PathBuf> = Vec::new();
        let mut io_error: Option<String> = None;

        let walk = reader.for_each_entries(|entry, entry_reader| {
            if entry.is_directory() || !is_password_entry(entry.name()) {
                return Ok(true);
            }
            if entry.size() > MAX_ENTRY_SIZE {
                warn!("Skipping oversized 7z entry {}", entry.name());
                return Ok(true);
            }

            let mut contents = Vec::new();
            if let Err(e) = entry_reader.read_to_end(&mut contents) {
                // A wrong AES password can surface here as a decode failure;
                // the empty-result fallback below turns that into a rejection.
                warn!("Failed to read 7z entry {}: {e}", entry.name());
                return Ok(true);
            }
            if contents.is_empty() {
                return Ok(true);
            }

            let out_path = dest.join(names.next("txt"));
            if let Err(e) = fs::write(&out_path, &contents) {
                io_error = Some(e.to_string());
                return Ok(false); // stop iteration
            }
            extracted.push(out_path);
            Ok(true)
        });

        if let Some(msg) = io_error {
            return AttemptOutcome::IoError(msg);
        }
        match walk {
            Ok(()) => {}
            Err(e) if is_password_failure(&e) => {
                remove_partials(&extracted);
                return AttemptOutcome::WrongPassword;
            }
            Err(sevenz_rust::Error::Io(e, _)) => {
                remove_partials(&extracted);
                return AttemptOutcome::IoError(e.to_string());
            }
            Err(e) => {
                warn!("Corrupt 7z data in {}: {e}", archive.display());
                remove_partials(&extracted);
                return AttemptOutcome::CorruptEntry;
            }
        }

        if extracted.is_empty() {
            // Open succeeded but nothing decrypted to non-empty bytes; treat
            // the candidate as rejected rather than declaring hollow success.
            AttemptOutcome::WrongPassword
        } else {
            // One password covers the whole container.
            AttemptOutcome::Success { extracted, pending: 0 }
        }
    }

    fn extract_plain_entry(&self, archive: &Path, entry: &str, dest: &Path) -> Result<PathBuf> {
        let sanitized =
            sanitize_entry_name(entry).with_context(|| format!("entry name {entry} is unusable"))?;
        let out_path = dest.join(sanitized.file_name().unwrap_or(sanitized.as_os_str()));

        let mut reader = open_reader(archive, Password::empty())
            .map_err(|e| anyhow!("failed to open 7z {}: {e}", archive.display()))?;

        let mut found = false;
        reader
            .for_each_entries(|e, entry_reader| {
                if e.is_directory() || e.name() != entry {
                    return Ok(true);
                }
                let mut contents = Vec::new();
                entry_reader
                    .read_to_end(&mut contents)
                    .map_err(|err| sevenz_rust::Error::other(format!("read failed: {err}")))?;
                fs::write(&out_path, &contents)
                    .map_err(|err| sevenz_rust::Error::other(format!("write failed: {err}")))?;
                found = true;
                Ok(false)
            })
            .map_err(|e| anyhow!("failed to extract {entry}: {e}"))?;

        if found {
            Ok(out_path)
        } else {
            Err(anyhow!("entry {entry} missing from {}", archive.display()))
        }
    }
}

fn open_reader(
    archive: &Path,
    password: Password,
) -> std::result::Result<SevenZReader<BufReader<File>>, sevenz_rust::Error> {
    let file = File::open(archive)
        .map_err(|e| sevenz_rust::Error::Io(e, archive.to_string_lossy().into_owned().into()))?;
    let len = file
        .metadata()
        .map_err(|e| sevenz_rust::Error::Io(e, archive.to_string_lossy().into_owned().into()))?
        .len();
    SevenZReader::new(BufReader::new(file), len, password)
}

fn is_password_failure(error: &sevenz_rust::Error) -> bool {
    matches!(
        error,
        sevenz_rust::Error::PasswordRequired
            | sevenz_rust::Error::MaybeBadPassword(_)
            | sevenz_rust::Error::ChecksumVerificationFailed
    )
}

/// A wrong password can be detected after some entries already decrypted
/// (solid blocks); drop anything written during the failed attempt.
fn remove_partials(paths: &[PathBuf]) {
    for path in paths {
        let _ = fs::remove_file(path);
    }
}
