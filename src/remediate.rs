/**
 * Remediation loop: pull each file, fix its dates, push it back
 *
 * Two passes per media kind:
 * 1. from chat: every file named in the chat index gets the message timestamp
 * 2. from filename: every other file on the device whose name carries a date
 *    gets noon of that date, unless its embedded date already agrees
 */

use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use std::path::Path;

use crate::cancel::CancelToken;
use crate::chat_index::ChatIndex;
use crate::config::Settings;
use crate::device::{locate_file, DeviceBridge};
use crate::error::{Error, Result};
use crate::file_ops::{set_file_times, ScratchDir};
use crate::media::MediaKind;
use crate::naming::{self, Resolution};
use crate::patcher::MetadataPatcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Filename carries a date that does not exist
    InvalidDate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    Applied,
    /// Metadata could not be rewritten; the file was pushed back with its new file times
    PatchFailed { error: String },
    NotFound,
    AlreadyCorrect,
    Skipped(SkipReason),
    /// A device command failed; remaining steps for the file were abandoned
    Failed { error: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Chat,
    Filename,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileResult {
    pub file_name: String,
    pub remote_path: Option<String>,
    pub outcome: FileOutcome,
}

#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub results: Vec<FileResult>,
}

impl RunReport {
    pub fn extend(&mut self, results: impl IntoIterator<Item = FileResult>) {
        self.results.extend(results);
    }

    pub fn count(&self, predicate: impl Fn(&FileOutcome) -> bool) -> usize {
        self.results.iter().filter(|r| predicate(&r.outcome)).count()
    }

    /// Files pushed back to the device, whether or not the metadata rewrite succeeded
    pub fn pushed(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Applied | FileOutcome::PatchFailed { .. }))
    }

    pub fn failures(&self) -> impl Iterator<Item = &FileResult> {
        self.results.iter().filter(|r| {
            matches!(
                r.outcome,
                FileOutcome::PatchFailed { .. } | FileOutcome::Failed { .. }
            )
        })
    }
}

pub struct Remediator<B, P> {
    bridge: B,
    patcher: P,
    kind: MediaKind,
    search_dirs: Vec<String>,
    scratch: ScratchDir,
    cancel: CancelToken,
    show_progress: bool,
}

impl<B: DeviceBridge, P: MetadataPatcher> Remediator<B, P> {
    pub fn new(bridge: B, patcher: P, kind: MediaKind, settings: &Settings) -> Self {
        Self {
            bridge,
            patcher,
            kind,
            search_dirs: settings.search_dirs(kind),
            scratch: ScratchDir::new(&settings.scratch_dir),
            cancel: CancelToken::new(),
            show_progress: settings.show_progress,
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    /// Chat pass followed by filename pass
    pub fn run_all(&self, index: &ChatIndex) -> Result<RunReport> {
        let mut report = RunReport::default();
        report.extend(self.run_from_chat(index)?);
        report.extend(self.run_from_filename(index)?);
        info!("All {}s processed", self.kind);
        Ok(report)
    }

    /// Apply the chat timestamp to every indexed file found on the device
    pub fn run_from_chat(&self, index: &ChatIndex) -> Result<Vec<FileResult>> {
        self.scratch.ensure()?;
        let pb = self.progress_bar(index.len() as u64, format!("Processing {}s", self.kind));
        let mut results = Vec::with_capacity(index.len());

        for (file_name, timestamp) in index.iter() {
            self.check_cancelled()?;
            pb.set_message(file_name.to_string());

            let located = locate_file(&self.bridge, &self.search_dirs, file_name);
            let result = match located {
                Ok(Some(remote)) => {
                    let outcome = self.remediate(file_name, &remote, timestamp, Source::Chat);
                    self.settle(&pb, file_name, Some(remote), outcome)?
                }
                Ok(None) => {
                    pb.suspend(|| warn!("{} '{}' not found on device", title(self.kind), file_name));
                    FileResult {
                        file_name: file_name.to_string(),
                        remote_path: None,
                        outcome: FileOutcome::NotFound,
                    }
                }
                Err(e) => self.settle(&pb, file_name, None, Err(e))?,
            };

            results.push(result);
            pb.inc(1);
        }

        pb.finish_with_message(format!("{}s from chats done", title(self.kind)));
        Ok(results)
    }

    /// Date every on-device file absent from `index` from its name
    pub fn run_from_filename(&self, index: &ChatIndex) -> Result<Vec<FileResult>> {
        self.scratch.ensure()?;
        let candidates = self.unindexed_files(index)?;
        let pb = self.progress_bar(
            candidates.len() as u64,
            format!("Checking {}s with no chat", self.kind),
        );
        let mut results = Vec::new();

        for (dir, file_name) in &candidates {
            self.check_cancelled()?;
            pb.set_message(file_name.clone());

            match naming::resolve(self.kind, file_name) {
                Resolution::NoMatch => {
                    debug!("'{}' does not follow the WhatsApp naming scheme", file_name);
                }
                Resolution::InvalidDate => {
                    debug!("'{}' carries an invalid date", file_name);
                    results.push(FileResult {
                        file_name: file_name.clone(),
                        remote_path: None,
                        outcome: FileOutcome::Skipped(SkipReason::InvalidDate),
                    });
                }
                Resolution::Candidate(timestamp) => {
                    let remote = format!("{}{}", dir, file_name);
                    let outcome = self.remediate(file_name, &remote, timestamp, Source::Filename);
                    results.push(self.settle(&pb, file_name, Some(remote), outcome)?);
                }
            }
            pb.inc(1);
        }

        pb.finish_with_message(format!("{}s with no chat done", title(self.kind)));
        Ok(results)
    }

    /// `(directory, name)` of every entry in the candidate directories that has no chat record
    fn unindexed_files(&self, index: &ChatIndex) -> Result<Vec<(String, String)>> {
        let mut files = Vec::new();
        for dir in &self.search_dirs {
            match self.bridge.list_dir(dir) {
                Ok(names) => files.extend(
                    names
                        .into_iter()
                        .filter(|name| !index.contains(name))
                        .map(|name| (dir.clone(), name)),
                ),
                Err(e) => {
                    self.check_cancelled()?;
                    warn!("Error listing {}: {}", dir, e);
                }
            }
        }
        Ok(files)
    }

    fn remediate(
        &self,
        file_name: &str,
        remote: &str,
        timestamp: i64,
        source: Source,
    ) -> Result<FileOutcome> {
        let copy = self.scratch.working_copy(file_name);
        self.bridge.pull(remote, copy.path())?;
        set_file_times(copy.path(), timestamp)?;

        if source == Source::Filename {
            if let Some(existing) = self.patcher.embedded_timestamp(copy.path()) {
                if naming::within_tolerance(existing, timestamp) {
                    debug!("'{}' already carries the right date", file_name);
                    return Ok(FileOutcome::AlreadyCorrect);
                }
            }
        }

        let outcome = match self.patcher.patch(copy.path(), timestamp) {
            Ok(()) => FileOutcome::Applied,
            Err(e) => {
                warn!("Error changing metadata of '{}': {:#}", file_name, e);
                FileOutcome::PatchFailed {
                    error: format!("{:#}", e),
                }
            }
        };

        self.replace_remote(copy.path(), remote)?;
        if let Err(e) = self.bridge.rescan_media(remote) {
            warn!("Media rescan of {} failed: {}", remote, e);
        }

        info!("Updated {} ({})", remote, timestamp);
        Ok(outcome)
    }

    /// Delete the remote original, then push the working copy in its place.
    ///
    /// A cancellation observed at any point here still gets the push attempted, so the
    /// remote file is never left deleted.
    fn replace_remote(&self, local: &Path, remote: &str) -> Result<()> {
        let removed = self.bridge.remove(remote);
        if self.cancel.is_cancelled() {
            return self.compensate(local, remote);
        }
        removed?;

        let pushed = self.bridge.push(local, remote);
        if self.cancel.is_cancelled() {
            if pushed.is_err() {
                return self.compensate(local, remote);
            }
            return Err(Error::Cancelled);
        }
        pushed
    }

    fn compensate(&self, local: &Path, remote: &str) -> Result<()> {
        warn!("Interrupted while replacing {}, pushing it back first", remote);
        self.bridge.push(local, remote)?;
        Err(Error::Cancelled)
    }

    /// Turn a per-file error into a `Failed` result, except a cancellation which ends the run
    fn settle(
        &self,
        pb: &ProgressBar,
        file_name: &str,
        remote_path: Option<String>,
        outcome: Result<FileOutcome>,
    ) -> Result<FileResult> {
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(_) if self.cancel.is_cancelled() => return Err(Error::Cancelled),
            Err(e) => {
                pb.suspend(|| warn!("Failed to update '{}': {}", file_name, e));
                FileOutcome::Failed {
                    error: e.to_string(),
                }
            }
        };
        Ok(FileResult {
            file_name: file_name.to_string(),
            remote_path,
            outcome,
        })
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    fn progress_bar(&self, len: u64, prefix: String) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len);
        let style = ProgressStyle::default_bar()
            .template("{prefix} {spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");
        pb.set_style(style);
        pb.set_prefix(prefix);
        pb
    }
}

fn title(kind: MediaKind) -> String {
    let label = kind.label();
    let mut chars = label.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_counts_pushed_files() {
        let mut report = RunReport::default();
        let result = |name: &str, outcome| FileResult {
            file_name: name.to_string(),
            remote_path: None,
            outcome,
        };
        report.extend(vec![
            result("a", FileOutcome::Applied),
            result("b", FileOutcome::PatchFailed { error: "bad".into() }),
            result("c", FileOutcome::NotFound),
            result("d", FileOutcome::Failed { error: "adb".into() }),
            result("e", FileOutcome::AlreadyCorrect),
        ]);

        assert_eq!(report.pushed(), 2);
        assert_eq!(report.failures().count(), 2);
        assert_eq!(report.count(|o| *o == FileOutcome::NotFound), 1);
    }

    #[test]
    fn titles_kind_labels() {
        assert_eq!(title(MediaKind::Image), "Image");
        assert_eq!(title(MediaKind::Video), "Video");
    }
}
