/**
 * Run configuration: remote layout, local working locations and external tool binaries
 */

use std::path::{Path, PathBuf};

use crate::media::MediaKind;

pub const DEFAULT_MEDIA_ROOT: &str = "/storage/emulated/0/Android/media/com.whatsapp/WhatsApp";
pub const DEFAULT_SCRATCH_DIR: &str = "/tmp/whatsapp_temp_adb";
pub const DEFAULT_EXPORT_DIR: &str = "result";

#[derive(Debug, Clone)]
pub struct Settings {
    /// WhatsApp folder on the device
    pub media_root: String,
    /// Where the WhatsApp backup is pulled to and the exporter runs
    pub work_dir: PathBuf,
    /// Directory holding one exported JSON document per chat
    pub export_dir: PathBuf,
    /// Flat directory for working copies
    pub scratch_dir: PathBuf,
    pub adb: PathBuf,
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    pub exporter: PathBuf,
    pub show_progress: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            media_root: DEFAULT_MEDIA_ROOT.to_string(),
            work_dir: PathBuf::from("."),
            export_dir: PathBuf::from(DEFAULT_EXPORT_DIR),
            scratch_dir: PathBuf::from(DEFAULT_SCRATCH_DIR),
            adb: PathBuf::from("adb"),
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            exporter: PathBuf::from("wtsexporter"),
            show_progress: true,
        }
    }
}

impl Settings {
    pub fn search_dirs(&self, kind: MediaKind) -> Vec<String> {
        kind.search_dirs(&self.media_root)
    }

    /// Local copy of the WhatsApp folder after a pull into `work_dir`
    pub fn backup_dir(&self) -> PathBuf {
        let name = Path::new(self.media_root.trim_end_matches('/'))
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "WhatsApp".into());
        self.work_dir.join(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backup_dir_follows_media_root() {
        let settings = Settings {
            work_dir: PathBuf::from("/work"),
            ..Settings::default()
        };
        assert_eq!(settings.backup_dir(), PathBuf::from("/work/WhatsApp"));
    }

    #[test]
    fn search_dirs_use_media_root() {
        let settings = Settings {
            media_root: "/sdcard/WA".to_string(),
            ..Settings::default()
        };
        let dirs = settings.search_dirs(MediaKind::Video);
        assert_eq!(dirs[0], "/sdcard/WA/Media/WhatsApp Video/");
        assert_eq!(dirs[2], "/sdcard/WA/Media/WhatsApp Video/Private/");
    }
}
