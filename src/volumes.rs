//! Multi-volume RAR set resolution.
//!
//! Given any member of a multi-part set, compute the base name, locate the
//! canonical first volume in a fixed preference order, and enumerate all
//! sibling volumes so the group can later be deleted or quarantined as one
//! unit. The two-step design (find canonical start, then enumerate siblings)
//! avoids relying on volume-count metadata that multi-part archives do not
//! reliably expose up front.

use std::fs;
use std::path::{Path, PathBuf};

use log::warn;

use crate::constants::VOLUME_SUFFIX_RE;
use crate::models::VolumeGroup;

/// First-volume filename patterns, tried in order.
const FIRST_VOLUME_SUFFIXES: &[&str] = &[".rar", ".part1.rar", ".part01.rar", ".r00", ".001"];

/// Strip the multi-volume suffix from a path, yielding the set's base name.
/// Returns the path unchanged when it carries no volume suffix.
pub fn base_name(path: &Path) -> PathBuf {
    let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
    let stripped = VOLUME_SUFFIX_RE.replace(&name, "");
    match path.parent() {
        Some(parent) => parent.join(stripped.as_ref()),
        None => PathBuf::from(stripped.as_ref()),
    }
}

/// Resolve the volume group containing `member`.
///
/// Returns `None` when no canonical first volume exists in the containing
/// directory — the set is incomplete and must be skipped whole rather than
/// partially extracted.
pub fn resolve(member: &Path) -> Option<VolumeGroup> {
    let base = base_name(member);

    let first_volume = FIRST_VOLUME_SUFFIXES.iter().find_map(|suffix| {
        let mut candidate = base.as_os_str().to_owned();
        candidate.push(suffix);
        let candidate = PathBuf::from(candidate);
        candidate.exists().then_some(candidate)
    })?;

    let siblings = enumerate_siblings(&base);
    Some(VolumeGroup { first_volume, siblings })
}

/// All files in the base name's directory sharing its filename prefix.
fn enumerate_siblings(base: &Path) -> Vec<PathBuf> {
    let dir = base.parent().unwrap_or_else(|| Path::new("."));
    let prefix = base.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Could not enumerate volumes in {}: {}", dir.display(), e);
            return Vec::new();
        }
    };

    let mut siblings: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.is_file()
                && p.file_name()
                    .map(|n| n.to_string_lossy().starts_with(&prefix))
                    .unwrap_or(false)
        })
        .collect();
    siblings.sort();
    siblings
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(dir: &TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, b"stub").unwrap();
        path
    }

    #[test]
    fn base_name_strips_each_convention() {
        assert_eq!(base_name(Path::new("/d/x.part3.rar")), PathBuf::from("/d/x"));
        assert_eq!(base_name(Path::new("/d/x.r05")), PathBuf::from("/d/x"));
        assert_eq!(base_name(Path::new("/d/x.002")), PathBuf::from("/d/x"));
        assert_eq!(base_name(Path::new("/d/plain.rar")), PathBuf::from("/d/plain.rar"));
    }

    #[test]
    fn any_sibling_resolves_to_same_first_volume() {
        let dir = TempDir::new().unwrap();
        let first = touch(&dir, "dump.part1.rar");
        let second = touch(&dir, "dump.part2.rar");
        let third = touch(&dir, "dump.part3.rar");

        for member in [&first, &second, &third] {
            let group = resolve(member).expect("group resolves");
            assert_eq!(group.first_volume, first);
            assert_eq!(group.siblings.len(), 3);
        }
    }

    #[test]
    fn r00_convention_resolves() {
        let dir = TempDir::new().unwrap();
        let first = touch(&dir, "set.rar");
        touch(&dir, "set.r00");
        let member = touch(&dir, "set.r01");

        let group = resolve(&member).unwrap();
        // `{base}.rar` is preferred over `{base}.r00`.
        assert_eq!(group.first_volume, first);
        assert_eq!(group.siblings.len(), 3);
    }

    #[test]
    fn missing_first_volume_returns_none() {
        let dir = TempDir::new().unwrap();
        touch(&dir, "dump.part2.rar");
        let member = touch(&dir, "dump.part3.rar");
        assert!(resolve(&member).is_none());
    }

    #[test]
    fn siblings_exclude_unrelated_files() {
        let dir = TempDir::new().unwrap();
        let first = touch(&dir, "logs.part1.rar");
        touch(&dir, "logs.part2.rar");
        touch(&dir, "other.part1.rar");

        let group = resolve(&first).unwrap();
        assert_eq!(group.siblings.len(), 2);
        assert!(group.siblings.iter().all(|p| {
            p.file_name().unwrap().to_string_lossy().starts_with("logs")
        }));
    }
}
