/**
 * Media kinds handled by the remediation run
 */

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    /// Processing order of a full run
    pub const ALL: [MediaKind; 2] = [MediaKind::Image, MediaKind::Video];

    /// MIME type recorded by the chat export for this kind
    pub fn mime(self) -> &'static str {
        match self {
            MediaKind::Image => "image/jpeg",
            MediaKind::Video => "video/mp4",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        }
    }

    /// Name of the WhatsApp media folder holding this kind
    pub fn folder(self) -> &'static str {
        match self {
            MediaKind::Image => "WhatsApp Images",
            MediaKind::Video => "WhatsApp Video",
        }
    }

    /// Candidate storage directories in probe priority order: primary, Sent, Private.
    ///
    /// Every entry ends with `/` so a basename can be appended directly.
    pub fn search_dirs(self, media_root: &str) -> Vec<String> {
        let base = format!("{}/Media/{}/", media_root.trim_end_matches('/'), self.folder());
        vec![
            base.clone(),
            format!("{}Sent/", base),
            format!("{}Private/", base),
        ]
    }

    pub fn from_mime(mime: &str) -> Result<Self, Error> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.mime() == mime)
            .ok_or_else(|| Error::UnsupportedKind(mime.to_string()))
    }
}

impl FromStr for MediaKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "image" | "images" => Ok(MediaKind::Image),
            "video" | "videos" => Ok(MediaKind::Video),
            _ => Err(Error::UnsupportedKind(s.to_string())),
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_kind_names() {
        assert_eq!("image".parse::<MediaKind>().unwrap(), MediaKind::Image);
        assert_eq!("Videos".parse::<MediaKind>().unwrap(), MediaKind::Video);
    }

    #[test]
    fn rejects_unknown_kind() {
        let err = "audio".parse::<MediaKind>().unwrap_err();
        assert!(matches!(err, Error::UnsupportedKind(ref s) if s == "audio"));
        assert!(MediaKind::from_mime("audio/ogg").is_err());
    }

    #[test]
    fn mime_round_trip() {
        for kind in MediaKind::ALL {
            assert_eq!(MediaKind::from_mime(kind.mime()).unwrap(), kind);
        }
    }

    #[test]
    fn search_dirs_in_priority_order() {
        let dirs = MediaKind::Image.search_dirs("/sdcard/WhatsApp/");
        assert_eq!(
            dirs,
            vec![
                "/sdcard/WhatsApp/Media/WhatsApp Images/".to_string(),
                "/sdcard/WhatsApp/Media/WhatsApp Images/Sent/".to_string(),
                "/sdcard/WhatsApp/Media/WhatsApp Images/Private/".to_string(),
            ]
        );
    }
}
