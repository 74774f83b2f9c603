//! Format adapters.
//!
//! Each supported container format implements the same small capability
//! surface, which is what lets the crack engine stay format-agnostic after
//! dispatch. The internal strategies differ: ZIP passwords are per-entry,
//! RAR and 7z passwords cover the whole container.

pub mod rar;
pub mod sevenz;
pub mod zip;

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use anyhow::Result;

use crate::constants::is_password_entry;
use crate::models::{ArchiveFormat, AttemptOutcome, EntryInfo, NameSeq, PasswordCandidate};

/// What the listing phase learned about a container.
#[derive(Debug)]
pub enum Listing {
    /// Entry metadata was readable without a password.
    Entries(Vec<EntryInfo>),
    /// The entry table itself is password-gated (RAR `-hp`, 7z encrypted
    /// headers); nothing is known until a candidate opens the container.
    PasswordGated,
}

/// Uniform capability surface over one archive format.
pub trait FormatAdapter {
    /// Enumerate entries without decrypting anything. A container whose
    /// header table needs a password reports `PasswordGated` rather than an
    /// error; only unreadable structure is a failure.
    fn list_entries(&self, archive: &Path, scratch: &Path) -> Result<Listing>;

    /// Attempt to unlock the container's credential-dump entries with one
    /// candidate, writing successes into `dest` under names drawn from
    /// `names`. Entries recorded in `resolved` are skipped and newly
    /// extracted ones are added to it, so repeat calls with later candidates
    /// only work on what is still locked.
    fn try_open(
        &self,
        archive: &Path,
        candidate: &PasswordCandidate,
        dest: &Path,
        scratch: &Path,
        names: &mut NameSeq,
        resolved: &mut HashSet<String>,
    ) -> AttemptOutcome;

    /// Extract a single entry that needs no password (a cleartext-wrapped
    /// nested archive) into `dest`, returning the extracted path.
    fn extract_plain_entry(&self, archive: &Path, entry: &str, dest: &Path) -> Result<PathBuf>;
}

/// Dispatch to the adapter for a classified format. `Unsupported` never
/// reaches this point; callers quarantine-free skip it earlier.
pub fn adapter_for(format: ArchiveFormat) -> Option<Box<dyn FormatAdapter>> {
    match format {
        ArchiveFormat::Zip => Some(Box::new(zip::ZipAdapter)),
        ArchiveFormat::Rar => Some(Box::new(rar::RarAdapter)),
        ArchiveFormat::SevenZip => Some(Box::new(sevenz::SevenZipAdapter)),
        ArchiveFormat::Unsupported => None,
    }
}

/// Filter a listing down to credential-dump candidates.
pub fn password_entries(entries: &[EntryInfo]) -> Vec<EntryInfo> {
    entries.iter().filter(|e| is_password_entry(&e.name)).cloned().collect()
}

/// Keep only the terminal filename components of an entry path, dropping
/// parent references, roots, and drive prefixes. Returns `None` when nothing
/// safe remains. Malicious archives carry entries like `../../etc/passwd`.
pub fn sanitize_entry_name(name: &str) -> Option<PathBuf> {
    let mut sanitized = PathBuf::new();
    for component in Path::new(name).components() {
        if let Component::Normal(part) = component {
            sanitized.push(part);
        }
    }
    if sanitized.as_os_str().is_empty() {
        None
    } else {
        Some(sanitized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_drops_traversal_components() {
        assert_eq!(
            sanitize_entry_name("../../etc/passwd"),
            Some(PathBuf::from("etc/passwd"))
        );
        assert_eq!(sanitize_entry_name("/abs/path.txt"), Some(PathBuf::from("abs/path.txt")));
        assert_eq!(sanitize_entry_name(".."), None);
        assert_eq!(sanitize_entry_name("plain.txt"), Some(PathBuf::from("plain.txt")));
    }

    #[test]
    fn password_entry_filter() {
        let entries = vec![
            EntryInfo { name: "Passwords.txt".into(), size: 10, encrypted: true },
            EntryInfo { name: "readme.md".into(), size: 5, encrypted: false },
            EntryInfo { name: "users.txt".into(), size: 7, encrypted: false },
        ];
        let matches = password_entries(&entries);
        assert_eq!(matches.len(), 2);
    }

    #[test]
    fn unsupported_has_no_adapter() {
        assert!(adapter_for(ArchiveFormat::Unsupported).is_none());
        assert!(adapter_for(ArchiveFormat::Zip).is_some());
    }
}
