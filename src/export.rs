/**
 * Chat export step: locate the encrypted database in a pulled WhatsApp
 * backup and run the export tool to produce one JSON document per chat
 */

use anyhow::{bail, Context, Result};
use log::{debug, info};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::SystemTime;
use walkdir::WalkDir;

pub const DEFAULT_DATABASE: &str = "msgstore.db.crypt15";

/// Find the message database inside a pulled WhatsApp folder.
///
/// `Databases/msgstore.db.crypt15` is preferred; otherwise the most recently
/// modified `msgstore*.crypt*` file is used.
pub fn find_database(backup_dir: &Path) -> Option<PathBuf> {
    let preferred = backup_dir.join("Databases").join(DEFAULT_DATABASE);
    if preferred.is_file() {
        return Some(preferred);
    }

    WalkDir::new(backup_dir)
        .max_depth(3)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            let name = entry.file_name().to_string_lossy();
            name.starts_with("msgstore") && name.contains(".crypt")
        })
        .max_by_key(|entry| {
            entry
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .unwrap_or(SystemTime::UNIX_EPOCH)
        })
        .map(|entry| entry.into_path())
}

/// Keys are shown on the phone in space-separated groups
pub fn normalize_key(key: &str) -> String {
    key.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Number of `*.json` documents directly under `dir`
pub fn count_documents(dir: &Path) -> usize {
    let Some(dir_str) = dir.to_str() else {
        return 0;
    };
    let pattern = format!("{}/*.json", glob::Pattern::escape(dir_str));
    glob::glob(&pattern)
        .map(|paths| paths.filter_map(|p| p.ok()).filter(|p| p.is_file()).count())
        .unwrap_or(0)
}

/// The external decryption/export tool
#[derive(Debug, Clone)]
pub struct ChatExporter {
    program: PathBuf,
    work_dir: PathBuf,
}

impl ChatExporter {
    pub fn new(program: impl Into<PathBuf>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            work_dir: work_dir.into(),
        }
    }

    /// Decrypt `database` with `key` and export every chat as JSON.
    ///
    /// Succeeds only if the tool exits cleanly and `output_dir` then holds at least
    /// one document. Returns the number of documents.
    pub fn export(&self, key: &str, database: &Path, output_dir: &Path) -> Result<usize> {
        let key = normalize_key(key);
        if key.is_empty() {
            bail!("Empty decryption key");
        }

        info!(
            "Exporting chats from {} with {}",
            database.display(),
            self.program.display()
        );
        let status = Command::new(&self.program)
            .args(["-a", "-k"])
            .arg(&key)
            .arg("-b")
            .arg(database)
            .args(["--json", "--per-chat", "--no-html"])
            .current_dir(&self.work_dir)
            .stdin(Stdio::null())
            .status()
            .with_context(|| format!("Failed to run {}", self.program.display()))?;

        if !status.success() {
            bail!(
                "{} exited with {} while exporting {}",
                self.program.display(),
                status,
                database.display()
            );
        }

        let documents = count_documents(output_dir);
        debug!("{} chat documents in {}", documents, output_dir.display());
        if documents == 0 {
            bail!(
                "Export finished but no chat documents were found in {}",
                output_dir.display()
            );
        }
        Ok(documents)
    }
}
