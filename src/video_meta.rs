/**
 * Video container metadata via ffmpeg/ffprobe
 *
 * Streams are copied, never transcoded. Only the `creation_time` tag of the
 * container changes.
 */

use anyhow::{bail, Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use log::debug;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::file_ops::{replace_file, temp_sibling};

#[derive(Debug, Clone)]
pub struct FfmpegTools {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl FfmpegTools {
    pub fn new(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    /// Whether both binaries can be started
    pub fn is_available(&self) -> bool {
        [&self.ffmpeg, &self.ffprobe].iter().all(|program| {
            Command::new(program)
                .arg("-version")
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .map(|status| status.success())
                .unwrap_or(false)
        })
    }

    /// Rewrite the container `creation_time` of `file_path`.
    ///
    /// The new container is written to a sibling file which then replaces the
    /// original. On failure the sibling is removed and the original is untouched.
    pub fn set_creation_time(&self, file_path: &Path, timestamp: i64) -> Result<()> {
        let creation_time = format_creation_time(timestamp)?;
        let temp_path = temp_sibling(file_path);

        let result = self
            .remux_with_creation_time(file_path, &temp_path, &creation_time)
            .and_then(|_| replace_file(&temp_path, file_path));

        if result.is_err() && temp_path.exists() {
            if let Err(e) = fs::remove_file(&temp_path) {
                debug!("Failed to remove {}: {}", temp_path.display(), e);
            }
        }
        result
    }

    fn remux_with_creation_time(&self, input: &Path, output: &Path, creation_time: &str) -> Result<()> {
        debug!(
            "Setting creation_time={} on {}",
            creation_time,
            input.display()
        );
        let output = Command::new(&self.ffmpeg)
            .args(["-y", "-v", "error", "-i"])
            .arg(input)
            .args(["-c", "copy", "-metadata"])
            .arg(format!("creation_time={}", creation_time))
            .arg(output)
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("Failed to run {}", self.ffmpeg.display()))?;

        if !output.status.success() {
            bail!(
                "ffmpeg failed for {}: {}",
                input.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }

    /// Container `creation_time` as epoch seconds, `None` when the tag is absent
    pub fn creation_time(&self, file_path: &Path) -> Result<Option<i64>> {
        let output = Command::new(&self.ffprobe)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format_tags=creation_time",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(file_path)
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("Failed to run {}", self.ffprobe.display()))?;

        if !output.status.success() {
            bail!(
                "ffprobe failed for {}: {}",
                file_path.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        match stdout.lines().map(str::trim).find(|line| !line.is_empty()) {
            Some(value) => parse_creation_time(value).map(Some),
            None => Ok(None),
        }
    }
}

impl Default for FfmpegTools {
    fn default() -> Self {
        Self::new("ffmpeg", "ffprobe")
    }
}

/// `creation_time` value understood by ffmpeg: UTC, ISO-8601, `Z` suffix
pub fn format_creation_time(timestamp: i64) -> Result<String> {
    let utc = Utc
        .timestamp_opt(timestamp, 0)
        .single()
        .with_context(|| format!("Timestamp out of range: {}", timestamp))?;
    Ok(utc.format("%Y-%m-%dT%H:%M:%SZ").to_string())
}

pub fn parse_creation_time(value: &str) -> Result<i64> {
    let parsed = DateTime::parse_from_rfc3339(value)
        .with_context(|| format!("Invalid creation_time: {}", value))?;
    Ok(parsed.timestamp())
}
