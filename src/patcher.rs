/**
 * Metadata patcher: rewrites the embedded capture date of a local working copy
 */

use anyhow::Result;
use log::debug;
use std::path::Path;

use crate::config::Settings;
use crate::exif::ExifProcessor;
use crate::exif_writer;
use crate::file_ops::set_file_times;
use crate::media::MediaKind;
use crate::video_meta::FfmpegTools;

pub trait MetadataPatcher {
    /// Rewrite the embedded timestamps of `path` and set its file times to `timestamp`
    fn patch(&self, path: &Path, timestamp: i64) -> Result<()>;

    /// Timestamp already embedded in the file, if it can be read
    fn embedded_timestamp(&self, path: &Path) -> Option<i64>;
}

impl<T: MetadataPatcher + ?Sized> MetadataPatcher for &T {
    fn patch(&self, path: &Path, timestamp: i64) -> Result<()> {
        (**self).patch(path, timestamp)
    }

    fn embedded_timestamp(&self, path: &Path) -> Option<i64> {
        (**self).embedded_timestamp(path)
    }
}

/// EXIF tags for images, container metadata for videos
pub struct MediaPatcher {
    kind: MediaKind,
    exif: ExifProcessor,
    video: FfmpegTools,
}

impl MediaPatcher {
    pub fn new(kind: MediaKind, video: FfmpegTools) -> Self {
        Self {
            kind,
            exif: ExifProcessor::new(),
            video,
        }
    }

    pub fn from_settings(kind: MediaKind, settings: &Settings) -> Self {
        Self::new(kind, FfmpegTools::new(&settings.ffmpeg, &settings.ffprobe))
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }
}

impl MetadataPatcher for MediaPatcher {
    fn patch(&self, path: &Path, timestamp: i64) -> Result<()> {
        match self.kind {
            MediaKind::Image => {
                exif_writer::write_timestamps(path, timestamp)?;
            }
            MediaKind::Video => {
                self.video.set_creation_time(path, timestamp)?;
            }
        }
        set_file_times(path, timestamp)?;
        Ok(())
    }

    fn embedded_timestamp(&self, path: &Path) -> Option<i64> {
        let result = match self.kind {
            MediaKind::Image => self.exif.original_timestamp(path).map(Some),
            MediaKind::Video => self.video.creation_time(path),
        };
        match result {
            Ok(timestamp) => timestamp,
            Err(e) => {
                debug!("No embedded timestamp in {}: {:#}", path.display(), e);
                None
            }
        }
    }
}
