//! Flattening of wrapper directories after extraction.
//!
//! Release archives commonly nest everything in `name-version/`. Stripping
//! `n` levels descends through `n` such wrappers in a staging directory and
//! moves the innermost entries into the destination.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Moves the contents found `levels` wrapper directories below `staging`
/// into `dest`.
///
/// Every level must contain exactly one directory; files next to it are
/// discarded together with `staging`. Entries already present in `dest` with
/// the same name are replaced. Moves are not rolled back on failure.
pub fn strip_into(staging: &Path, dest: &Path, levels: usize) -> io::Result<()> {
    info!(
        "Stripping {} level(s) from {} into {}",
        levels,
        staging.display(),
        dest.display()
    );

    let mut dir = staging.to_path_buf();
    for _ in 0..levels {
        dir = single_subdir(&dir)?;
    }

    for entry in fs::read_dir(&dir)? {
        let entry = entry?;
        let target = dest.join(entry.file_name());

        if let Ok(meta) = fs::symlink_metadata(&target) {
            debug!("Replacing existing {}", target.display());
            if meta.is_dir() {
                fs::remove_dir_all(&target)?;
            } else {
                fs::remove_file(&target)?;
            }
        }

        fs::rename(entry.path(), &target)?;
    }

    if let Err(e) = fs::remove_dir_all(staging) {
        warn!("Failed to remove staging dir {}: {}", staging.display(), e);
    }

    Ok(())
}

/// Returns the only subdirectory of `dir`.
fn single_subdir(dir: &Path) -> io::Result<PathBuf> {
    let mut found: Option<PathBuf> = None;

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        if found.is_some() {
            return Err(io::Error::other(format!(
                "{} contains more than one directory; cannot tell which one to strip",
                dir.display()
            )));
        }
        found = Some(entry.path());
    }

    found.ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("{} contains no directory to strip", dir.display()),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_strip_one_level() {
        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("dest");
        let staging = dest.join(".staging");
        write(&staging.join("tool-1.0/tool"), "bin");
        write(&staging.join("tool-1.0/doc/README"), "docs");
        write(&staging.join("NOTICE"), "dropped");

        strip_into(&staging, &dest, 1).unwrap();

        assert_eq!(fs::read_to_string(dest.join("tool")).unwrap(), "bin");
        assert!(dest.join("doc/README").exists());
        assert!(!dest.join("NOTICE").exists());
        assert!(!staging.exists());
    }

    #[test]
    fn test_strip_two_levels_with_name_clash() {
        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("dest");
        let staging = dest.join(".staging");
        // Innermost entry has the same name as the outer wrapper.
        write(&staging.join("tool/bin/tool"), "inner");
        write(&dest.join("tool"), "stale");

        strip_into(&staging, &dest, 2).unwrap();

        assert_eq!(fs::read_to_string(dest.join("tool")).unwrap(), "inner");
        assert!(!staging.exists());
    }

    #[test]
    fn test_strip_rejects_ambiguous_level() {
        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("dest");
        let staging = dest.join(".staging");
        write(&staging.join("a/tool"), "a");
        write(&staging.join("b/tool"), "b");

        let err = strip_into(&staging, &dest, 1).unwrap_err();
        assert!(err.to_string().contains("more than one directory"));
    }

    #[test]
    fn test_strip_requires_a_directory() {
        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("dest");
        let staging = dest.join(".staging");
        write(&staging.join("tool"), "flat");

        let err = strip_into(&staging, &dest, 1).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
