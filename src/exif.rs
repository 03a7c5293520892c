/**
 * EXIF reading module with kamadak-exif
 *
 * Only the capture timestamps matter here: `DateTime` (IFD0),
 * `DateTimeOriginal` and `DateTimeDigitized` (Exif IFD). EXIF stores them as
 * local wall-clock time without a zone.
 */

use anyhow::{Context, Result};
use chrono::{Local, NaiveDateTime, TimeZone};
use exif::{In, Reader as ExifReader, Tag, Value};
use log::debug;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Tags rewritten by the remediation, in IFD order
pub const TIMESTAMP_TAGS: [Tag; 3] = [Tag::DateTime, Tag::DateTimeOriginal, Tag::DateTimeDigitized];

pub struct ExifProcessor;

impl ExifProcessor {
    pub fn new() -> Self {
        Self
    }

    pub fn read_exif(&self, file_path: &Path) -> Result<exif::Exif> {
        let file = File::open(file_path)
            .with_context(|| format!("Failed to open {}", file_path.display()))?;
        let mut bufreader = BufReader::new(&file);

        let exifreader = ExifReader::new();
        exifreader
            .read_from_container(&mut bufreader)
            .context("Failed to read EXIF data with kamadak-exif")
    }

    /// Raw string values of the timestamp tags present in the file, keyed by tag name
    pub fn timestamp_tags(&self, file_path: &Path) -> Result<HashMap<String, String>> {
        let exif = self.read_exif(file_path)?;
        let mut tags = HashMap::new();

        for tag in TIMESTAMP_TAGS {
            if let Some(value) = exif
                .get_field(tag, In::PRIMARY)
                .and_then(|field| ascii_value(&field.value))
            {
                tags.insert(tag.to_string(), value);
            }
        }

        Ok(tags)
    }

    /// `DateTimeOriginal` as epoch seconds, interpreting the tag as local time
    pub fn original_timestamp(&self, file_path: &Path) -> Result<i64> {
        let exif = self.read_exif(file_path)?;
        let raw = exif
            .get_field(Tag::DateTimeOriginal, In::PRIMARY)
            .and_then(|field| ascii_value(&field.value))
            .ok_or_else(|| anyhow::anyhow!("No DateTimeOriginal in {}", file_path.display()))?;

        let (naive, _milliseconds) = parse_timestamp_with_subseconds(&raw)?;
        let local = Local
            .from_local_datetime(&naive)
            .earliest()
            .ok_or_else(|| anyhow::anyhow!("Local time {} does not exist", naive))?;

        debug!("DateTimeOriginal of {}: {}", file_path.display(), local);
        Ok(local.timestamp())
    }
}

impl Default for ExifProcessor {
    fn default() -> Self {
        Self::new()
    }
}

fn ascii_value(value: &Value) -> Option<String> {
    match value {
        Value::Ascii(parts) => parts
            .first()
            .map(|bytes| String::from_utf8_lossy(bytes).trim_end_matches('\0').to_string()),
        _ => None,
    }
}

/// Parse `2025:09:24 08:20:49`, `2025-09-24 08:20:49` and either with a `.fff` suffix
pub fn parse_timestamp_with_subseconds(timestamp_str: &str) -> Result<(NaiveDateTime, u16)> {
    let timestamp_str = timestamp_str.trim();

    let (main_part, subsec_part) = match timestamp_str.split_once('.') {
        Some((main, subsec)) => (main, subsec),
        None => (timestamp_str, "0"),
    };

    let naive_dt = if main_part.contains('-') {
        NaiveDateTime::parse_from_str(main_part, "%Y-%m-%d %H:%M:%S")
            .context("Failed to parse ISO timestamp")?
    } else {
        NaiveDateTime::parse_from_str(main_part, "%Y:%m:%d %H:%M:%S")
            .context("Failed to parse EXIF timestamp")?
    };

    let subsec_str: String = subsec_part.trim_matches('"').chars().take(3).collect();
    let padded_subsec = format!("{:0<3}", subsec_str);
    let milliseconds: u16 = padded_subsec
        .parse()
        .context("Failed to parse subseconds")?;

    Ok((naive_dt, milliseconds))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn parses_exif_format() {
        let (dt, ms) = parse_timestamp_with_subseconds("2023:01:15 12:00:00").unwrap();
        assert_eq!((dt.year(), dt.month(), dt.day(), dt.hour()), (2023, 1, 15, 12));
        assert_eq!(ms, 0);
    }

    #[test]
    fn parses_iso_format_with_subseconds() {
        let (dt, ms) = parse_timestamp_with_subseconds("2025-09-24 08:20:49.68").unwrap();
        assert_eq!((dt.hour(), dt.minute(), dt.second()), (8, 20, 49));
        assert_eq!(ms, 680);
    }

    #[test]
    fn rejects_zero_and_garbage() {
        assert!(parse_timestamp_with_subseconds("0000:00:00 00:00:00").is_err());
        assert!(parse_timestamp_with_subseconds("yesterday").is_err());
    }

    #[test]
    fn ascii_value_strips_padding() {
        let value = Value::Ascii(vec![b"2023:01:15 12:00:00\0".to_vec()]);
        assert_eq!(ascii_value(&value).as_deref(), Some("2023:01:15 12:00:00"));
        assert_eq!(ascii_value(&Value::Short(vec![1])), None);
    }

    #[test]
    fn missing_file_is_an_error() {
        let processor = ExifProcessor::new();
        assert!(processor
            .original_timestamp(Path::new("/nonexistent/IMG-1.jpg"))
            .is_err());
    }
}
