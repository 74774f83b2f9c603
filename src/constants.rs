//! Global constants for the credsift pipeline.
//!
//! This module centralizes hardcoded values so tuning the heuristics does not
//! require hunting through the extraction and parsing code.

use lazy_static::lazy_static;
use regex::Regex;

// Archive handling
/// Extensions scanned for in the input directory.
pub const ARCHIVE_EXTENSIONS: &[&str] = &["zip", "rar", "7z"];

/// Suffix marking an in-flight download; such files are never picked up.
pub const TRANSIENT_SUFFIX: &str = ".temp";

/// Maximum nested-archive recursion depth. Normal inputs never approach this;
/// the cap exists so a self-referential container cannot loop the engine.
pub const MAX_NESTING_DEPTH: usize = 8;

/// Maximum sweep passes over the input directory. Each pass either removes
/// archives (success or quarantine) or leaves only skipped ones behind.
pub const MAX_SWEEP_PASSES: usize = 4;

/// Size of a single extracted entry above which it is skipped (100MB).
pub const MAX_ENTRY_SIZE: u64 = 100 * 1024 * 1024;

// Cleanup retry behaviour
/// Attempts to delete an archive whose handle may still be winding down.
pub const DELETE_RETRY_ATTEMPTS: usize = 5;

/// Delay between deletion attempts in milliseconds.
pub const DELETE_RETRY_DELAY_MS: u64 = 200;

// Output
/// Bot-control messaging domain; credential records pointing at it are
/// dropped as noise. Matched as the url's host, never as a substring, so
/// legitimate hosts merely ending in the same letters survive.
pub const NOISE_URL_DOMAIN: &str = "t.me";

lazy_static! {
    /// Entries inside an archive whose name matches this pattern are treated
    /// as credential dumps worth cracking. Loose on purpose: real-world dumps
    /// use names like `Passwords.txt`, `All Passwords.txt`, `userpass.txt`.
    pub static ref PASSWORD_ENTRY_RE: Regex =
        Regex::new(r"(?i)(pass|user).*\.txt$").expect("valid password entry pattern");

    /// Multi-volume RAR naming suffixes: `.partN.rar`, `.rNN`, `.NNN`.
    pub static ref VOLUME_SUFFIX_RE: Regex =
        Regex::new(r"(?i)(\.part\d+\.rar|\.r\d+|\.\d+)$").expect("valid volume suffix pattern");
}

/// True if the entry name looks like a credential dump.
pub fn is_password_entry(name: &str) -> bool {
    PASSWORD_ENTRY_RE.is_match(name)
}

/// True if the entry name carries a nested-archive extension.
pub fn is_nested_archive(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    ARCHIVE_EXTENSIONS.iter().any(|ext| lower.ends_with(&format!(".{ext}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_entry_heuristic_is_case_insensitive() {
        assert!(is_password_entry("Passwords.txt"));
        assert!(is_password_entry("ALL PASSWORDS.TXT"));
        assert!(is_password_entry("userlist.txt"));
        assert!(is_password_entry("dir/passwd.txt"));
        assert!(!is_password_entry("readme.txt"));
        assert!(!is_password_entry("passwords.csv"));
    }

    #[test]
    fn volume_suffixes_match() {
        assert!(VOLUME_SUFFIX_RE.is_match("dump.part1.rar"));
        assert!(VOLUME_SUFFIX_RE.is_match("dump.part01.rar"));
        assert!(VOLUME_SUFFIX_RE.is_match("dump.r00"));
        assert!(VOLUME_SUFFIX_RE.is_match("dump.001"));
        assert!(!VOLUME_SUFFIX_RE.is_match("dump.rar"));
    }

    #[test]
    fn nested_archive_extensions() {
        assert!(is_nested_archive("inner.zip"));
        assert!(is_nested_archive("INNER.RAR"));
        assert!(is_nested_archive("deep/inner.7z"));
        assert!(!is_nested_archive("notes.txt"));
    }
}
