/**
 * Device bridge: the subset of adb used by the remediation run, and the
 * file locator that probes candidate storage directories
 */

use log::{debug, trace};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use crate::error::{Error, Result};

const MEDIA_SCANNER_ACTION: &str = "android.intent.action.MEDIA_SCANNER_SCAN_FILE";

/// Blocking operations against the connected device.
///
/// Remote paths are plain absolute paths; implementations quote them where a
/// remote shell is involved.
pub trait DeviceBridge {
    fn wait_for_device(&self) -> Result<()>;

    /// Entry names of a remote directory
    fn list_dir(&self, dir: &str) -> Result<Vec<String>>;

    /// Whether a listing of the exact path succeeds
    fn exists(&self, path: &str) -> Result<bool>;

    fn pull(&self, remote: &str, local: &Path) -> Result<()>;

    fn push(&self, local: &Path, remote: &str) -> Result<()>;

    fn remove(&self, remote: &str) -> Result<()>;

    /// Ask the media scanner to re-index `remote` so the gallery shows the new dates
    fn rescan_media(&self, remote: &str) -> Result<()>;
}

impl<T: DeviceBridge + ?Sized> DeviceBridge for &T {
    fn wait_for_device(&self) -> Result<()> {
        (**self).wait_for_device()
    }

    fn list_dir(&self, dir: &str) -> Result<Vec<String>> {
        (**self).list_dir(dir)
    }

    fn exists(&self, path: &str) -> Result<bool> {
        (**self).exists(path)
    }

    fn pull(&self, remote: &str, local: &Path) -> Result<()> {
        (**self).pull(remote, local)
    }

    fn push(&self, local: &Path, remote: &str) -> Result<()> {
        (**self).push(local, remote)
    }

    fn remove(&self, remote: &str) -> Result<()> {
        (**self).remove(remote)
    }

    fn rescan_media(&self, remote: &str) -> Result<()> {
        (**self).rescan_media(remote)
    }
}

/// Resolve `file_name` to the first candidate directory that holds it.
///
/// Directories are probed in order, one round-trip each, without caching.
pub fn locate_file<B: DeviceBridge + ?Sized>(
    bridge: &B,
    dirs: &[String],
    file_name: &str,
) -> Result<Option<String>> {
    for dir in dirs {
        let candidate = format!("{}{}", dir, file_name);
        if bridge.exists(&candidate)? {
            trace!("Found '{}' at {}", file_name, candidate);
            return Ok(Some(candidate));
        }
    }
    Ok(None)
}

/// Quote `value` for the device shell. Plain paths are returned unchanged.
pub fn shell_quote(value: &str) -> String {
    let plain = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "/._-+:@%,=".contains(c));
    if plain {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', r"'\''"))
    }
}

/// [`DeviceBridge`] backed by the `adb` command-line tool
#[derive(Debug, Clone)]
pub struct Adb {
    program: PathBuf,
}

impl Adb {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn describe(&self, args: &[&OsStr]) -> String {
        let mut parts = vec![self.program.to_string_lossy().into_owned()];
        parts.extend(args.iter().map(|a| a.to_string_lossy().into_owned()));
        parts.join(" ")
    }

    fn run(&self, args: &[&OsStr]) -> Result<Output> {
        debug!("Running {}", self.describe(args));
        Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| Error::Spawn {
                command: self.describe(args),
                source,
            })
    }

    fn run_checked(&self, args: &[&OsStr]) -> Result<Output> {
        let output = self.run(args)?;
        if output.status.success() {
            Ok(output)
        } else {
            Err(Error::CommandFailed {
                command: self.describe(args),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

impl Default for Adb {
    fn default() -> Self {
        Self::new("adb")
    }
}

impl DeviceBridge for Adb {
    fn wait_for_device(&self) -> Result<()> {
        self.run_checked(&[OsStr::new("wait-for-device")])?;
        Ok(())
    }

    fn list_dir(&self, dir: &str) -> Result<Vec<String>> {
        let quoted = shell_quote(dir);
        let output = self.run_checked(&[OsStr::new("shell"), OsStr::new("ls"), OsStr::new(&quoted)])?;
        Ok(parse_listing(&String::from_utf8_lossy(&output.stdout)))
    }

    fn exists(&self, path: &str) -> Result<bool> {
        let quoted = shell_quote(path);
        let output = self.run(&[OsStr::new("shell"), OsStr::new("ls"), OsStr::new(&quoted)])?;
        Ok(output.status.success())
    }

    fn pull(&self, remote: &str, local: &Path) -> Result<()> {
        self.run_checked(&[OsStr::new("pull"), OsStr::new(remote), local.as_os_str()])?;
        Ok(())
    }

    fn push(&self, local: &Path, remote: &str) -> Result<()> {
        self.run_checked(&[OsStr::new("push"), local.as_os_str(), OsStr::new(remote)])?;
        Ok(())
    }

    fn remove(&self, remote: &str) -> Result<()> {
        let quoted = shell_quote(remote);
        self.run_checked(&[OsStr::new("shell"), OsStr::new("rm"), OsStr::new(&quoted)])?;
        Ok(())
    }

    fn rescan_media(&self, remote: &str) -> Result<()> {
        let uri = format!("file://{}", shell_quote(remote));
        self.run_checked(&[
            OsStr::new("shell"),
            OsStr::new("am"),
            OsStr::new("broadcast"),
            OsStr::new("-a"),
            OsStr::new(MEDIA_SCANNER_ACTION),
            OsStr::new("-d"),
            OsStr::new(&uri),
        ])?;
        Ok(())
    }
}

/// Entry names from `ls` output; older devices terminate lines with `\r\n`
fn parse_listing(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashSet;

    struct ProbeOnly {
        present: HashSet<String>,
        probes: RefCell<Vec<String>>,
    }

    impl ProbeOnly {
        fn new(present: &[&str]) -> Self {
            Self {
                present: present.iter().map(|s| s.to_string()).collect(),
                probes: RefCell::new(Vec::new()),
            }
        }
    }

    impl DeviceBridge for ProbeOnly {
        fn wait_for_device(&self) -> Result<()> {
            Ok(())
        }
        fn list_dir(&self, _dir: &str) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
        fn exists(&self, path: &str) -> Result<bool> {
            self.probes.borrow_mut().push(path.to_string());
            Ok(self.present.contains(path))
        }
        fn pull(&self, _remote: &str, _local: &Path) -> Result<()> {
            Ok(())
        }
        fn push(&self, _local: &Path, _remote: &str) -> Result<()> {
            Ok(())
        }
        fn remove(&self, _remote: &str) -> Result<()> {
            Ok(())
        }
        fn rescan_media(&self, _remote: &str) -> Result<()> {
            Ok(())
        }
    }

    fn dirs() -> Vec<String> {
        vec![
            "/wa/Images/".to_string(),
            "/wa/Images/Sent/".to_string(),
            "/wa/Images/Private/".to_string(),
        ]
    }

    #[test]
    fn primary_directory_wins() {
        let bridge = ProbeOnly::new(&["/wa/Images/a.jpg", "/wa/Images/Sent/a.jpg"]);
        let found = locate_file(&bridge, &dirs(), "a.jpg").unwrap();
        assert_eq!(found.as_deref(), Some("/wa/Images/a.jpg"));
        assert_eq!(bridge.probes.borrow().len(), 1);
    }

    #[test]
    fn falls_through_to_later_directories() {
        let bridge = ProbeOnly::new(&["/wa/Images/Private/b.jpg"]);
        let found = locate_file(&bridge, &dirs(), "b.jpg").unwrap();
        assert_eq!(found.as_deref(), Some("/wa/Images/Private/b.jpg"));
        assert_eq!(
            *bridge.probes.borrow(),
            vec![
                "/wa/Images/b.jpg".to_string(),
                "/wa/Images/Sent/b.jpg".to_string(),
                "/wa/Images/Private/b.jpg".to_string(),
            ]
        );
    }

    #[test]
    fn missing_file_probes_every_directory() {
        let bridge = ProbeOnly::new(&[]);
        assert_eq!(locate_file(&bridge, &dirs(), "c.jpg").unwrap(), None);
        assert_eq!(locate_file(&bridge, &dirs(), "c.jpg").unwrap(), None);
        assert_eq!(bridge.probes.borrow().len(), 6);
    }

    #[test]
    fn quotes_paths_with_spaces() {
        assert_eq!(shell_quote("/sdcard/DCIM/a.jpg"), "/sdcard/DCIM/a.jpg");
        assert_eq!(
            shell_quote("/Media/WhatsApp Images/a.jpg"),
            "'/Media/WhatsApp Images/a.jpg'"
        );
        assert_eq!(shell_quote("it's.jpg"), r"'it'\''s.jpg'");
        assert_eq!(shell_quote(""), "''");
    }

    #[test]
    fn listing_strips_carriage_returns() {
        assert_eq!(
            parse_listing("IMG-1.jpg\r\nSent\r\n\r\nPrivate\n"),
            vec!["IMG-1.jpg", "Sent", "Private"]
        );
    }

    #[test]
    fn missing_adb_binary_is_a_spawn_error() {
        let adb = Adb::new("/nonexistent/adb-binary");
        assert!(matches!(
            adb.exists("/sdcard/a.jpg"),
            Err(Error::Spawn { .. })
        ));
    }
}
