/**
 * Chat-record index: media basename -> message timestamp, built from the
 * per-chat JSON documents written by the export tool
 */

use log::{debug, warn};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::media::MediaKind;

/// Why a chat-export document contributed nothing to the index
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    Unreadable(String),
    InvalidJson(String),
    NotAnObject,
    MissingMessages,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedDocument {
    pub path: PathBuf,
    pub reason: SkipReason,
}

#[derive(Debug, Deserialize)]
struct MediaMessage {
    #[serde(default)]
    media: bool,
    #[serde(default)]
    mime: Option<String>,
    #[serde(default)]
    data: Option<String>,
    #[serde(deserialize_with = "epoch_seconds")]
    timestamp: i64,
}

/// Exporters write whole seconds, some of them as floats (`1673780000.0`)
fn epoch_seconds<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let number = serde_json::Number::deserialize(deserializer)?;
    number
        .as_i64()
        .or_else(|| number.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {}", number)))
}

#[derive(Debug, Clone)]
pub struct ChatIndex {
    kind: MediaKind,
    entries: HashMap<String, i64>,
    skipped: Vec<SkippedDocument>,
}

impl ChatIndex {
    pub fn empty(kind: MediaKind) -> Self {
        Self {
            kind,
            entries: HashMap::new(),
            skipped: Vec::new(),
        }
    }

    /// Scan every `*.json` file directly under `dir`.
    ///
    /// Documents that cannot be read or parsed are recorded in [`skipped`](Self::skipped)
    /// and never abort the scan. A later document overwrites an earlier one for the same
    /// basename.
    pub fn load(dir: &Path, kind: MediaKind) -> Result<Self> {
        if !dir.is_dir() {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("chat export directory not found: {}", dir.display()),
            )));
        }

        let mut index = Self::empty(kind);
        for path in json_documents(dir)? {
            index.ingest_file(&path);
        }

        debug!(
            "Indexed {} {} records ({} documents skipped)",
            index.entries.len(),
            kind,
            index.skipped.len()
        );
        Ok(index)
    }

    fn ingest_file(&mut self, path: &Path) {
        let outcome = fs::read_to_string(path)
            .map_err(|e| SkipReason::Unreadable(e.to_string()))
            .and_then(|contents| parse_document(&contents, self.kind));

        match outcome {
            Ok(records) => {
                for (name, timestamp) in records {
                    self.entries.insert(name, timestamp);
                }
            }
            Err(reason) => {
                warn!("Skipping chat export {}: {:?}", path.display(), reason);
                self.skipped.push(SkippedDocument {
                    path: path.to_path_buf(),
                    reason,
                });
            }
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, timestamp: i64) {
        self.entries.insert(name.into(), timestamp);
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn get(&self, name: &str) -> Option<i64> {
        self.entries.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries sorted by basename
    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        let mut entries: Vec<(&str, i64)> =
            self.entries.iter().map(|(k, v)| (k.as_str(), *v)).collect();
        entries.sort_unstable_by(|a, b| a.0.cmp(b.0));
        entries.into_iter()
    }

    pub fn skipped(&self) -> &[SkippedDocument] {
        &self.skipped
    }
}

fn json_documents(dir: &Path) -> Result<Vec<PathBuf>> {
    let dir_str = dir.to_str().ok_or_else(|| {
        Error::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("non UTF-8 export directory: {}", dir.display()),
        ))
    })?;
    let pattern = format!("{}/*.json", glob::Pattern::escape(dir_str));
    let paths = glob::glob(&pattern).map_err(|e| {
        Error::Io(std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()))
    })?;

    Ok(paths
        .filter_map(|entry| entry.ok())
        .filter(|path| path.is_file())
        .collect())
}

/// Extract `(basename, timestamp)` pairs of `kind` from one chat document.
///
/// The document holds a single top-level key whose value carries a `messages` object.
/// Individual records that do not have the expected shape are ignored.
pub fn parse_document(
    contents: &str,
    kind: MediaKind,
) -> std::result::Result<Vec<(String, i64)>, SkipReason> {
    let document: Value =
        serde_json::from_str(contents).map_err(|e| SkipReason::InvalidJson(e.to_string()))?;
    let chat = match &document {
        Value::Object(map) => map.values().next().ok_or(SkipReason::MissingMessages)?,
        _ => return Err(SkipReason::NotAnObject),
    };
    let messages: &Map<String, Value> = chat
        .get("messages")
        .and_then(Value::as_object)
        .ok_or(SkipReason::MissingMessages)?;

    let records = messages
        .values()
        .filter_map(|raw| MediaMessage::deserialize(raw).ok())
        .filter(|msg| msg.media && msg.mime.as_deref() == Some(kind.mime()))
        .filter_map(|msg| {
            let name = media_basename(msg.data.as_deref()?)?;
            Some((name.to_string(), msg.timestamp))
        })
        .collect();
    Ok(records)
}

/// Basename of a media path as written by the exporter, which may use either separator
fn media_basename(data: &str) -> Option<&str> {
    let name = data.rsplit(['/', '\\']).next()?;
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}
