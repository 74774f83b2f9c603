//! ZIP / AES-ZIP adapter.
//!
//! ZIP encryption is per-entry (a flag bit on each local header), so a
//! password candidate is tried against every credential-dump entry rather
//! than once for the container, and entries unlocked by different candidates
//! accumulate across attempts via the shared `resolved` set. Multi-part sets
//! (suffix-numbered companion files) are joined into one logical stream
//! before any entry read.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, warn};
use zip::result::ZipError;
use zip::ZipArchive;

use crate::constants::{is_password_entry, MAX_ENTRY_SIZE};
use crate::models::{AttemptOutcome, EntryInfo, NameSeq, PasswordCandidate};

use super::{sanitize_entry_name, FormatAdapter, Listing};

pub struct ZipAdapter;

impl FormatAdapter for ZipAdapter {
    fn list_entries(&self, archive: &Path, scratch: &Path) -> Result<Listing> {
        let source = spanned_source(archive, scratch)?;
        let mut zip = open_archive(&source)?;

        let mut metas = Vec::with_capacity(zip.len());
        for i in 0..zip.len() {
            let entry = zip
                .by_index_raw(i)
                .with_context(|| format!("failed to read entry {i} of {}", source.display()))?;
            if entry.is_file() {
                metas.push((i, entry.name().to_string(), entry.size()));
            }
        }

        let mut entries = Vec::with_capacity(metas.len());
        for (i, name, size) in metas {
            let encrypted = entry_is_encrypted(&mut zip, i);
            entries.push(EntryInfo { name, size, encrypted });
        }
        Ok(Listing::Entries(entries))
    }

    fn try_open(
        &self,
        archive: &Path,
        candidate: &PasswordCandidate,
        dest: &Path,
        scratch: &Path,
        names: &mut NameSeq,
        resolved: &mut HashSet<String>,
    ) -> AttemptOutcome {
        let source = match spanned_source(archive, scratch) {
            Ok(s) => s,
            Err(e) => return AttemptOutcome::IoError(e.to_string()),
        };
        let mut zip = match open_archive(&source) {
            Ok(z) => z,
            Err(e) => return AttemptOutcome::IoError(e.to_string()),
        };

        // Collect targets first; each decrypt call re-borrows the archive.
        // Entries already unlocked by an earlier candidate are skipped.
        let mut targets: Vec<(usize, String)> = Vec::new();
        for i in 0..zip.len() {
            match zip.by_index_raw(i) {
                Ok(entry) if entry.is_file() && is_password_entry(entry.name()) => {
                    if resolved.contains(entry.name()) {
                        continue;
                    }
                    if entry.size() > MAX_ENTRY_SIZE {
                        warn!("Skipping oversized entry {} ({} bytes)", entry.name(), entry.size());
                        continue;
                    }
                    targets.push((i, entry.name().to_string()));
                }
                Ok(_) => {}
                Err(e) => return AttemptOutcome::IoError(e.to_string()),
            }
        }

        let mut extracted = Vec::new();
        let mut rejected = 0usize;
        let mut corrupt = 0usize;

        for (index, name) in targets {
            let encrypted = entry_is_encrypted(&mut zip, index);
            let contents = if encrypted {
                match zip.by_index_decrypt(index, candidate.literal().as_bytes()) {
                    Ok(Ok(mut entry)) => {
                        let mut buf = Vec::new();
                        match entry.read_to_end(&mut buf) {
                            Ok(_) => Some(buf),
                            Err(_) => {
                                // ZipCrypto's one-byte check passes for some
                                // wrong passwords; the CRC failure on read is
                                // the real verdict.
                                rejected += 1;
                                None
                            }
                        }
                    }
                    Ok(Err(_)) => {
                        rejected += 1;
                        None
                    }
                    Err(ZipError::Io(e)) => return AttemptOutcome::IoError(e.to_string()),
                    Err(_) => {
                        corrupt += 1;
                        None
                    }
                }
            } else {
                match zip.by_index(index) {
                    Ok(mut entry) => {
                        let mut buf = Vec::new();
                        match entry.read_to_end(&mut buf) {
                            Ok(_) => Some(buf),
                            Err(e) => {
                                warn!("Corrupt entry at index {index}: {e}");
                                corrupt += 1;
                                None
                            }
                        }
                    }
                    Err(ZipError::Io(e)) => return AttemptOutcome::IoError(e.to_string()),
                    Err(e) => {
                        warn!("Corrupt entry at index {index}: {e}");
                        corrupt += 1;
                        None
                    }
                }
            };

            if let Some(bytes) = contents {
                if bytes.is_empty() {
                    resolved.insert(name);
                    continue;
                }
                match write_extracted(dest, names, &bytes) {
                    Ok(path) => {
                        extracted.push(path);
                        resolved.insert(name);
                    }
                    Err(e) => return AttemptOutcome::IoError(e.to_string()),
                }
            }
        }

        if !extracted.is_empty() {
            // Rejected entries stay pending; a later candidate may unlock
            // them. Corrupt entries never will, so they do not count.
            AttemptOutcome::Success { extracted, pending: rejected }
        } else if rejected > 0 {
            AttemptOutcome::WrongPassword
        } else if corrupt > 0 {
            AttemptOutcome::CorruptEntry
        } else {
            AttemptOutcome::WrongPassword
        }
    }

    fn extract_plain_entry(&self, archive: &Path, entry: &str, dest: &Path) -> Result<PathBuf> {
        let mut zip = open_archive(archive)?;
        let mut file = zip
            .by_name(entry)
            .with_context(|| format!("entry {entry} missing from {}", archive.display()))?;

        let sanitized = sanitize_entry_name(entry)
            .with_context(|| format!("entry name {entry} is unusable"))?;
        let out_path = dest.join(sanitized.file_name().unwrap_or(sanitized.as_os_str()));

        let mut out = File::create(&out_path)
            .with_context(|| format!("failed to create {}", out_path.display()))?;
        let mut limited = Read::take(&mut file, MAX_ENTRY_SIZE);
        std::io::copy(&mut limited, &mut out)
            .with_context(|| format!("failed to extract {entry}"))?;
        Ok(out_path)
    }
}

fn open_archive(path: &Path) -> Result<ZipArchive<BufReader<File>>> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    ZipArchive::new(BufReader::new(file))
        .with_context(|| format!("failed to read ZIP structure of {}", path.display()))
}

/// The handle type exposes no encryption flag; an encrypted entry refuses a
/// passwordless open with `UnsupportedArchive`, which is the probe used here.
fn entry_is_encrypted(zip: &mut ZipArchive<BufReader<File>>, index: usize) -> bool {
    matches!(zip.by_index(index), Err(ZipError::UnsupportedArchive(_)))
}

/// Join a split set into one logical stream.
///
/// When the set spans several files they are concatenated in ascending order
/// into the scratch directory and the joined file is used for all reads. A
/// single-file archive is returned untouched.
fn spanned_source(archive: &Path, scratch: &Path) -> Result<PathBuf> {
    let sources = span_sources(archive);
    if sources.len() == 1 {
        return Ok(archive.to_path_buf());
    }

    debug!("Joining {} span parts for {}", sources.len(), archive.display());
    let joined_path = scratch.join("spanned.zip");
    let mut joined = File::create(&joined_path)
        .with_context(|| format!("failed to create {}", joined_path.display()))?;

    for part in &sources {
        let mut reader = File::open(part)
            .with_context(|| format!("failed to open part {}", part.display()))?;
        std::io::copy(&mut reader, &mut joined)
            .with_context(|| format!("failed to append part {}", part.display()))?;
    }
    joined.flush().ok();
    Ok(joined_path)
}

/// The files composing the logical stream, in read order. Two split shapes
/// exist in the wild: a plain `name.zip` head followed by `name.zip.NNN`
/// companions, and a headless set where the first file is itself `name.zip.001`
/// with no plain `name.zip` beside it.
fn span_sources(archive: &Path) -> Vec<PathBuf> {
    let parts = companion_parts(archive);
    if !parts.is_empty() {
        let mut sources = vec![archive.to_path_buf()];
        sources.extend(parts);
        return sources;
    }

    let name = archive.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
    if let Some((base, suffix)) = name.rsplit_once('.') {
        let numeric = !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit());
        if numeric && !archive.with_file_name(base).is_file() {
            let set = companion_parts(&archive.with_file_name(base));
            if set.len() > 1 {
                return set;
            }
        }
    }
    vec![archive.to_path_buf()]
}

/// Companion files named `{archive_file_name}.NNN`, sorted ascending.
fn companion_parts(archive: &Path) -> Vec<PathBuf> {
    let dir = match archive.parent() {
        Some(d) if !d.as_os_str().is_empty() => d.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let own_name = archive.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();

    let mut parts: Vec<PathBuf> = match fs::read_dir(&dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .map(|n| {
                        let name = n.to_string_lossy();
                        name.strip_prefix(&own_name)
                            .and_then(|rest| rest.strip_prefix('.'))
                            .map(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
                            .unwrap_or(false)
                    })
                    .unwrap_or(false)
            })
            .collect(),
        Err(_) => Vec::new(),
    };
    parts.sort();
    parts
}

fn write_extracted(dest: &Path, names: &mut NameSeq, bytes: &[u8]) -> Result<PathBuf> {
    let out_path = dest.join(names.next("txt"));
    fs::write(&out_path, bytes)
        .with_context(|| format!("failed to write {}", out_path.display()))?;
    Ok(out_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use tempfile::TempDir;
    use zip::unstable::write::FileOptionsExt;
    use zip::write::FileOptions;
    use zip::ZipWriter;

    fn plain_candidate() -> PasswordCandidate {
        PasswordCandidate { index: 0, secret: None }
    }

    fn candidate(secret: &str) -> PasswordCandidate {
        PasswordCandidate { index: 1, secret: Some(secret.to_string()) }
    }

    fn build_zip(path: &Path, password: Option<&str>, entries: &[(&str, &str)]) {
        let file = File::create(path).unwrap();
        let mut writer = ZipWriter::new(file);
        for (name, body) in entries {
            let options = match password {
                Some(pw) => FileOptions::default().with_deprecated_encryption(pw.as_bytes()),
                None => FileOptions::default(),
            };
            writer.start_file(*name, options).unwrap();
            writer.write_all(body.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
    }

    fn entries_of(listing: Listing) -> Vec<EntryInfo> {
        match listing {
            Listing::Entries(entries) => entries,
            Listing::PasswordGated => panic!("ZIP listings are never password-gated"),
        }
    }

    #[test]
    fn lists_entries_with_encryption_flags() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("a.zip");
        build_zip(&archive, Some("pw"), &[("Passwords.txt", "x"), ("readme.txt", "y")]);

        let entries = entries_of(ZipAdapter.list_entries(&archive, dir.path()).unwrap());
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.encrypted));
    }

    #[test]
    fn unencrypted_entries_carry_no_flag() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("a.zip");
        build_zip(&archive, None, &[("Passwords.txt", "x")]);

        let entries = entries_of(ZipAdapter.list_entries(&archive, dir.path()).unwrap());
        assert!(entries.iter().all(|e| !e.encrypted));
    }

    #[test]
    fn correct_password_extracts_dump_entries() {
        let dir = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let archive = dir.path().join("a.zip");
        build_zip(&archive, Some("hunter2"), &[("Passwords.txt", "secret dump")]);

        let mut names = NameSeq::new();
        let mut resolved = HashSet::new();
        let outcome = ZipAdapter.try_open(
            &archive,
            &candidate("hunter2"),
            dest.path(),
            dir.path(),
            &mut names,
            &mut resolved,
        );
        match outcome {
            AttemptOutcome::Success { extracted, pending } => {
                assert_eq!(extracted.len(), 1);
                assert_eq!(pending, 0);
                assert_eq!(fs::read_to_string(&extracted[0]).unwrap(), "secret dump");
            }
            other => panic!("expected success, got {other:?}"),
        }
        assert!(resolved.contains("Passwords.txt"));
    }

    #[test]
    fn wrong_password_is_reported_not_fatal() {
        let dir = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let archive = dir.path().join("a.zip");
        build_zip(&archive, Some("hunter2"), &[("Passwords.txt", "secret dump")]);

        let mut names = NameSeq::new();
        let mut resolved = HashSet::new();
        let outcome = ZipAdapter.try_open(
            &archive,
            &candidate("nope"),
            dest.path(),
            dir.path(),
            &mut names,
            &mut resolved,
        );
        assert!(matches!(outcome, AttemptOutcome::WrongPassword));
        assert!(resolved.is_empty());
    }

    #[test]
    fn entries_locked_with_different_passwords_resolve_across_attempts() {
        let dir = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let archive = dir.path().join("mixed.zip");
        let file = File::create(&archive).unwrap();
        let mut writer = ZipWriter::new(file);
        writer
            .start_file(
                "Passwords1.txt",
                FileOptions::default().with_deprecated_encryption(b"alpha"),
            )
            .unwrap();
        writer.write_all(b"first dump").unwrap();
        writer
            .start_file(
                "Passwords2.txt",
                FileOptions::default().with_deprecated_encryption(b"beta"),
            )
            .unwrap();
        writer.write_all(b"second dump").unwrap();
        writer.finish().unwrap();

        let mut names = NameSeq::new();
        let mut resolved = HashSet::new();

        let first = ZipAdapter.try_open(
            &archive,
            &candidate("alpha"),
            dest.path(),
            dir.path(),
            &mut names,
            &mut resolved,
        );
        match first {
            AttemptOutcome::Success { extracted, pending } => {
                assert_eq!(extracted.len(), 1);
                assert_eq!(pending, 1);
            }
            other => panic!("expected partial success, got {other:?}"),
        }

        let second = ZipAdapter.try_open(
            &archive,
            &candidate("beta"),
            dest.path(),
            dir.path(),
            &mut names,
            &mut resolved,
        );
        match second {
            AttemptOutcome::Success { extracted, pending } => {
                assert_eq!(extracted.len(), 1);
                assert_eq!(pending, 0);
            }
            other => panic!("expected completing success, got {other:?}"),
        }
        assert_eq!(fs::read_dir(dest.path()).unwrap().count(), 2);
    }

    #[test]
    fn unencrypted_entries_need_no_password() {
        let dir = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let archive = dir.path().join("a.zip");
        build_zip(&archive, None, &[("passlist.txt", "open dump")]);

        let mut names = NameSeq::new();
        let mut resolved = HashSet::new();
        let outcome = ZipAdapter.try_open(
            &archive,
            &plain_candidate(),
            dest.path(),
            dir.path(),
            &mut names,
            &mut resolved,
        );
        assert!(matches!(outcome, AttemptOutcome::Success { .. }));
    }

    #[test]
    fn plain_nested_entry_extracts_by_name() {
        let dir = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let archive = dir.path().join("outer.zip");
        build_zip(&archive, None, &[("inner.zip", "not-really-a-zip")]);

        let out = ZipAdapter.extract_plain_entry(&archive, "inner.zip", dest.path()).unwrap();
        assert_eq!(out.file_name().unwrap(), "inner.zip");
        assert_eq!(fs::read_to_string(&out).unwrap(), "not-really-a-zip");
    }

    #[test]
    fn spanned_parts_are_joined_before_reading() {
        let dir = TempDir::new().unwrap();
        let scratch = TempDir::new().unwrap();

        // Build a valid ZIP, then split its bytes across the head file and a
        // numbered companion.
        let whole = dir.path().join("whole.zip");
        build_zip(&whole, None, &[("Passwords.txt", "spanned dump contents")]);
        let bytes = fs::read(&whole).unwrap();
        fs::remove_file(&whole).unwrap();

        let split_at = bytes.len() / 2;
        let head = dir.path().join("set.zip");
        fs::write(&head, &bytes[..split_at]).unwrap();
        fs::write(dir.path().join("set.zip.001"), &bytes[split_at..]).unwrap();

        let entries = entries_of(ZipAdapter.list_entries(&head, scratch.path()).unwrap());
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "Passwords.txt");
    }

    #[test]
    fn headless_numbered_set_is_joined_from_its_first_part() {
        let dir = TempDir::new().unwrap();
        let scratch = TempDir::new().unwrap();

        // No plain `set.zip`: the set starts at `set.zip.001`.
        let whole = dir.path().join("whole.zip");
        build_zip(&whole, None, &[("Passwords.txt", "spanned dump contents")]);
        let bytes = fs::read(&whole).unwrap();
        fs::remove_file(&whole).unwrap();

        let split_at = bytes.len() / 2;
        let head = dir.path().join("set.zip.001");
        fs::write(&head, &bytes[..split_at]).unwrap();
        fs::write(dir.path().join("set.zip.002"), &bytes[split_at..]).unwrap();

        let entries = entries_of(ZipAdapter.list_entries(&head, scratch.path()).unwrap());
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "Passwords.txt");
    }
}
