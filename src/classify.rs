//! Container format detection.
//!
//! ZIP and 7z are identified by magic bytes rather than extension alone;
//! RAR multi-volume membership is inferred from the naming convention since
//! volume numbering is not recoverable from a single file's bytes.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::constants::{TRANSIENT_SUFFIX, VOLUME_SUFFIX_RE};
use crate::models::ArchiveFormat;

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const ZIP_EMPTY_MAGIC: &[u8] = b"PK\x05\x06";
const ZIP_SPANNED_MAGIC: &[u8] = b"PK\x07\x08";
const RAR_MAGIC: &[u8] = b"Rar!\x1a\x07";
const SEVENZ_MAGIC: &[u8] = b"7z\xbc\xaf\x27\x1c";

/// Format tag plus whether the file is part of a multi-volume set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub format: ArchiveFormat,
    pub multi_volume: bool,
}

/// Inspect a path and classify it. Pure inspection: nothing is extracted and
/// `Unsupported` is not a failure, just a "leave it alone" signal.
pub fn classify(path: &Path) -> Classification {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    if name.to_ascii_lowercase().ends_with(TRANSIENT_SUFFIX) {
        return Classification { format: ArchiveFormat::Unsupported, multi_volume: false };
    }

    let volume_named = VOLUME_SUFFIX_RE.is_match(&name);

    match sniff_magic(path) {
        Some(format) => Classification { format, multi_volume: volume_named },
        None if volume_named => {
            // Continuation volumes of a RAR set may not start with the RAR
            // signature; the resolver will locate the canonical first volume.
            Classification { format: ArchiveFormat::Rar, multi_volume: true }
        }
        None => Classification { format: ArchiveFormat::Unsupported, multi_volume: false },
    }
}

fn sniff_magic(path: &Path) -> Option<ArchiveFormat> {
    let mut header = [0u8; 8];
    let mut file = File::open(path).ok()?;
    let read = file.read(&mut header).ok()?;
    let header = &header[..read];

    if header.starts_with(RAR_MAGIC) {
        Some(ArchiveFormat::Rar)
    } else if header.starts_with(SEVENZ_MAGIC) {
        Some(ArchiveFormat::SevenZip)
    } else if header.starts_with(ZIP_MAGIC)
        || header.starts_with(ZIP_EMPTY_MAGIC)
        || header.starts_with(ZIP_SPANNED_MAGIC)
    {
        Some(ArchiveFormat::Zip)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, bytes: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn zip_magic_wins_over_extension() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "misnamed.rar", b"PK\x03\x04rest-of-zip");
        let c = classify(&path);
        assert_eq!(c.format, ArchiveFormat::Zip);
        assert!(!c.multi_volume);
    }

    #[test]
    fn sevenz_magic_detected() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "a.7z", b"7z\xbc\xaf\x27\x1c\x00\x04");
        assert_eq!(classify(&path).format, ArchiveFormat::SevenZip);
    }

    #[test]
    fn rar_volume_naming_implies_rar_without_magic() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "dump.r01", b"continuation-volume-bytes");
        let c = classify(&path);
        assert_eq!(c.format, ArchiveFormat::Rar);
        assert!(c.multi_volume);
    }

    #[test]
    fn part_naming_flags_multi_volume() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "dump.part2.rar", b"Rar!\x1a\x07\x01\x00");
        let c = classify(&path);
        assert_eq!(c.format, ArchiveFormat::Rar);
        assert!(c.multi_volume);
    }

    #[test]
    fn garbage_is_unsupported() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "notes.zip", b"just some text");
        assert_eq!(classify(&path).format, ArchiveFormat::Unsupported);
    }

    #[test]
    fn transient_suffix_is_ignored() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "partial.zip.temp", b"PK\x03\x04");
        assert_eq!(classify(&path).format, ArchiveFormat::Unsupported);
    }
}
