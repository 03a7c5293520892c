/**
 * WhatsApp file naming conventions
 *
 * Files received through WhatsApp are named `IMG-YYYYMMDD-WA<n>.jpg` and
 * `VID-YYYYMMDD-WA<n>.mp4`. When a file has no chat record, the date in its
 * name is the best available guess for when it was received.
 */

use chrono::{Local, NaiveDate, TimeZone};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::media::MediaKind;

/// Two timestamps closer than this are considered equal
pub const TOLERANCE_SECS: i64 = 60;

static IMAGE_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^IMG-(\d{8})-WA\d+\.jpg$").expect("valid image name regex"));
static VIDEO_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^VID-(\d{8})-WA\d+\.mp4$").expect("valid video name regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Epoch seconds of 12:00:00 local time on the date in the name
    Candidate(i64),
    /// Name does not follow the convention for this kind
    NoMatch,
    /// Name follows the convention but the date does not exist
    InvalidDate,
}

pub fn filename_pattern(kind: MediaKind) -> &'static Regex {
    match kind {
        MediaKind::Image => &IMAGE_NAME_RE,
        MediaKind::Video => &VIDEO_NAME_RE,
    }
}

/// Derive a timestamp from a WhatsApp media filename
pub fn resolve(kind: MediaKind, file_name: &str) -> Resolution {
    let Some(captures) = filename_pattern(kind).captures(file_name) else {
        return Resolution::NoMatch;
    };

    match noon_local_timestamp(&captures[1]) {
        Some(timestamp) => Resolution::Candidate(timestamp),
        None => Resolution::InvalidDate,
    }
}

/// `YYYYMMDD` at 12:00:00 local time. Ambiguous local times take the earliest instant.
fn noon_local_timestamp(date: &str) -> Option<i64> {
    let naive = NaiveDate::parse_from_str(date, "%Y%m%d")
        .ok()?
        .and_hms_opt(12, 0, 0)?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.timestamp())
}

pub fn within_tolerance(existing: i64, candidate: i64) -> bool {
    (existing - candidate).abs() < TOLERANCE_SECS
}
