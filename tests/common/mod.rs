#![allow(dead_code)]

use filetime::FileTime;
use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use wa_datefix::error::{Error, Result};
use wa_datefix::{CancelToken, DeviceBridge, MetadataPatcher, Settings};

pub const MEDIA_ROOT: &str = "/sdcard/WhatsApp";
pub const IMAGES: &str = "/sdcard/WhatsApp/Media/WhatsApp Images/";
pub const IMAGES_SENT: &str = "/sdcard/WhatsApp/Media/WhatsApp Images/Sent/";

/// SOI, JFIF APP0, a tiny scan and EOI
pub fn bare_jpeg() -> Vec<u8> {
    let mut data = vec![0xFF, 0xD8];
    data.extend_from_slice(&[
        0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00, 0x01, 0x01, 0x00, 0x00, 0x01, 0x00,
        0x01, 0x00, 0x00,
    ]);
    data.extend_from_slice(&[0xFF, 0xDA, 0x00, 0x08, 0x01, 0x01, 0x00, 0x00, 0x3F, 0x00]);
    data.extend_from_slice(&[0x12, 0x34, 0x56]);
    data.extend_from_slice(&[0xFF, 0xD9]);
    data
}

pub fn settings(scratch: &Path) -> Settings {
    Settings {
        media_root: MEDIA_ROOT.to_string(),
        scratch_dir: scratch.to_path_buf(),
        show_progress: false,
        ..Settings::default()
    }
}

fn failed(command: &str, path: &str) -> Error {
    Error::CommandFailed {
        command: format!("{} {}", command, path),
        code: Some(1),
        stderr: "No such file or directory".to_string(),
    }
}

/// Device whose storage is a local temp directory
pub struct FakeDevice {
    root: TempDir,
    pub calls: RefCell<Vec<String>>,
    pub cancel_on_remove: Option<CancelToken>,
    pub failing_pushes: Cell<u32>,
    pub failing_pulls: RefCell<HashSet<String>>,
}

impl FakeDevice {
    pub fn new() -> Self {
        Self {
            root: TempDir::new().unwrap(),
            calls: RefCell::new(Vec::new()),
            cancel_on_remove: None,
            failing_pushes: Cell::new(0),
            failing_pulls: RefCell::new(HashSet::new()),
        }
    }

    pub fn local(&self, remote: &str) -> PathBuf {
        self.root.path().join(remote.trim_start_matches('/'))
    }

    pub fn put(&self, remote: &str, data: &[u8]) {
        let path = self.local(remote);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, data).unwrap();
    }

    pub fn read(&self, remote: &str) -> Vec<u8> {
        fs::read(self.local(remote)).unwrap()
    }

    pub fn has(&self, remote: &str) -> bool {
        self.local(remote).is_file()
    }

    pub fn mtime(&self, remote: &str) -> i64 {
        let meta = fs::metadata(self.local(remote)).unwrap();
        FileTime::from_last_modification_time(&meta).unix_seconds()
    }

    pub fn calls_starting_with(&self, prefix: &str) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .cloned()
            .collect()
    }

    fn record(&self, call: String) {
        self.calls.borrow_mut().push(call);
    }
}

impl DeviceBridge for FakeDevice {
    fn wait_for_device(&self) -> Result<()> {
        self.record("wait".to_string());
        Ok(())
    }

    fn list_dir(&self, dir: &str) -> Result<Vec<String>> {
        self.record(format!("ls {}", dir));
        let entries = fs::read_dir(self.local(dir)).map_err(|_| failed("ls", dir))?;
        let mut names: Vec<String> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        Ok(names)
    }

    fn exists(&self, path: &str) -> Result<bool> {
        self.record(format!("exists {}", path));
        Ok(self.local(path).exists())
    }

    fn pull(&self, remote: &str, local: &Path) -> Result<()> {
        self.record(format!("pull {}", remote));
        if self.failing_pulls.borrow().contains(remote) {
            return Err(failed("pull", remote));
        }
        fs::copy(self.local(remote), local).map_err(|_| failed("pull", remote))?;
        Ok(())
    }

    fn push(&self, local: &Path, remote: &str) -> Result<()> {
        self.record(format!("push {}", remote));
        if self.failing_pushes.get() > 0 {
            self.failing_pushes.set(self.failing_pushes.get() - 1);
            return Err(failed("push", remote));
        }
        let target = self.local(remote);
        fs::copy(local, &target)?;
        // adb push keeps the modification time of the local file
        let meta = fs::metadata(local)?;
        filetime::set_file_mtime(&target, FileTime::from_last_modification_time(&meta))?;
        Ok(())
    }

    fn remove(&self, remote: &str) -> Result<()> {
        self.record(format!("rm {}", remote));
        fs::remove_file(self.local(remote)).map_err(|_| failed("rm", remote))?;
        if let Some(token) = &self.cancel_on_remove {
            token.cancel();
        }
        Ok(())
    }

    fn rescan_media(&self, remote: &str) -> Result<()> {
        self.record(format!("rescan {}", remote));
        Ok(())
    }
}

/// Counts calls and delegates to an inner patcher
pub struct CountingPatcher<P> {
    pub inner: P,
    pub patches: Cell<usize>,
}

impl<P> CountingPatcher<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            patches: Cell::new(0),
        }
    }
}

impl<P: MetadataPatcher> MetadataPatcher for CountingPatcher<P> {
    fn patch(&self, path: &Path, timestamp: i64) -> anyhow::Result<()> {
        self.patches.set(self.patches.get() + 1);
        self.inner.patch(path, timestamp)
    }

    fn embedded_timestamp(&self, path: &Path) -> Option<i64> {
        self.inner.embedded_timestamp(path)
    }
}

/// Always fails, as a corrupt container would
pub struct FailingPatcher;

impl MetadataPatcher for FailingPatcher {
    fn patch(&self, path: &Path, _timestamp: i64) -> anyhow::Result<()> {
        anyhow::bail!("corrupt container: {}", path.display())
    }

    fn embedded_timestamp(&self, _path: &Path) -> Option<i64> {
        None
    }
}
