/**
 * Local file operations: scratch directory, working copies, file times and
 * atomic replacement
 */

use anyhow::{Context, Result};
use filetime::FileTime;
use log::debug;
use std::fs;
use std::path::{Path, PathBuf};

/// Set both access and modification time of `path` to `timestamp` (epoch seconds)
pub fn set_file_times(path: &Path, timestamp: i64) -> std::io::Result<()> {
    let time = FileTime::from_unix_time(timestamp, 0);
    filetime::set_file_times(path, time, time)
}

/// Sibling path used while rewriting `path`: `name.ext` -> `name_tmp.ext`
pub fn temp_sibling(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{}_tmp.{}", stem, ext.to_string_lossy()),
        None => format!("{}_tmp", stem),
    };
    path.with_file_name(name)
}

/// Move `source` over `target`, replacing it.
///
/// Within one filesystem this is a single rename. Across devices the data is
/// copied and the source removed.
pub fn replace_file(source: &Path, target: &Path) -> Result<()> {
    debug!("Replacing '{}' with '{}'", target.display(), source.display());

    match fs::rename(source, target) {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::CrossesDevices => {
            debug!("Cross-device replace detected, using copy+delete strategy");
            fs::copy(source, target).with_context(|| {
                format!(
                    "Failed to copy file from '{}' to '{}'",
                    source.display(),
                    target.display()
                )
            })?;
            fs::remove_file(source)
                .with_context(|| format!("Failed to remove temporary file: {}", source.display()))?;
            Ok(())
        }
        Err(e) => Err(e).with_context(|| {
            format!(
                "Failed to move file from '{}' to '{}'",
                source.display(),
                target.display()
            )
        }),
    }
}

/// Flat local directory holding working copies for the duration of a run
#[derive(Debug, Clone)]
pub struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn ensure(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.path)
    }

    /// Working copy for `file_name`, removed again when dropped
    pub fn working_copy(&self, file_name: &str) -> WorkingCopy {
        WorkingCopy {
            path: self.path.join(file_name),
        }
    }

    /// Remove the directory if it is empty. Failures are ignored.
    pub fn clear(&self) {
        if let Err(e) = fs::remove_dir(&self.path) {
            debug!("Scratch directory {} not removed: {}", self.path.display(), e);
        }
    }
}

/// Local copy of one remote file. The file is deleted on drop.
#[derive(Debug)]
pub struct WorkingCopy {
    path: PathBuf,
}

impl WorkingCopy {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WorkingCopy {
    fn drop(&mut self) {
        if self.path.exists() {
            if let Err(e) = fs::remove_file(&self.path) {
                debug!("Failed to remove working copy {}: {}", self.path.display(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn temp_sibling_keeps_extension() {
        assert_eq!(
            temp_sibling(Path::new("/tmp/x/VID-1.mp4")),
            PathBuf::from("/tmp/x/VID-1_tmp.mp4")
        );
        assert_eq!(temp_sibling(Path::new("clip")), PathBuf::from("clip_tmp"));
    }

    #[test]
    fn sets_access_and_modification_time() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.jpg");
        fs::write(&path, b"data").unwrap();

        set_file_times(&path, 1_673_780_400).unwrap();

        let meta = fs::metadata(&path).unwrap();
        assert_eq!(
            FileTime::from_last_modification_time(&meta).unix_seconds(),
            1_673_780_400
        );
        assert_eq!(
            FileTime::from_last_access_time(&meta).unix_seconds(),
            1_673_780_400
        );
    }

    #[test]
    fn replace_file_overwrites_target() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("new");
        let target = dir.path().join("old");
        fs::write(&source, b"new").unwrap();
        fs::write(&target, b"old").unwrap();

        replace_file(&source, &target).unwrap();

        assert!(!source.exists());
        assert_eq!(fs::read(&target).unwrap(), b"new");
    }

    #[test]
    fn working_copy_removed_on_drop() {
        let dir = TempDir::new().unwrap();
        let scratch = ScratchDir::new(dir.path().join("scratch"));
        scratch.ensure().unwrap();

        let copy = scratch.working_copy("IMG-1.jpg");
        fs::write(copy.path(), b"x").unwrap();
        let path = copy.path().to_path_buf();
        drop(copy);

        assert!(!path.exists());
        scratch.clear();
        assert!(!scratch.path().exists());
    }

    #[test]
    fn clear_keeps_non_empty_directory() {
        let dir = TempDir::new().unwrap();
        let scratch = ScratchDir::new(dir.path());
        fs::write(dir.path().join("leftover"), b"x").unwrap();

        scratch.clear();

        assert!(dir.path().join("leftover").exists());
    }
}
