/**
 * EXIF writer module - rewrites the capture timestamps of JPEG files
 *
 * Tag encoding is done by kamadak-exif's experimental writer. This module
 * carries the existing tags over, stamps the three timestamp tags and splices
 * the resulting TIFF block into the JPEG APP1 segment:
 * - DateTime (IFD0)
 * - DateTimeOriginal (Exif IFD)
 * - DateTimeDigitized (Exif IFD)
 */

use anyhow::{anyhow, bail, Context, Result};
use chrono::{Local, TimeZone};
use exif::experimental::Writer;
use exif::{Field, In, Reader, Tag, Value};
use log::debug;
use std::fs;
use std::io::Cursor;
use std::ops::Range;
use std::path::Path;

use crate::exif::TIMESTAMP_TAGS;

pub const EXIF_DATETIME_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

const EXIF_HEADER: &[u8] = b"Exif\0\0";
const MARKER_SOI: u8 = 0xD8;
const MARKER_EOI: u8 = 0xD9;
const MARKER_SOS: u8 = 0xDA;
const MARKER_APP1: u8 = 0xE1;

/// Format epoch seconds the way EXIF stores dates: local wall-clock time
pub fn format_exif_datetime(timestamp: i64) -> Result<String> {
    let local = Local
        .timestamp_opt(timestamp, 0)
        .single()
        .ok_or_else(|| anyhow!("Timestamp out of range: {}", timestamp))?;
    Ok(local.format(EXIF_DATETIME_FORMAT).to_string())
}

/// Tags carried over from the file being rewritten
struct ExistingTags {
    fields: Vec<Field>,
    thumbnail: Option<Vec<u8>>,
    little_endian: bool,
}

impl ExistingTags {
    fn empty() -> Self {
        Self {
            fields: Vec::new(),
            thumbnail: None,
            little_endian: false,
        }
    }

    /// Missing or unreadable EXIF data yields an empty tag set
    fn load(jpeg: &[u8]) -> Self {
        let exif = match Reader::new().read_from_container(&mut Cursor::new(jpeg)) {
            Ok(exif) => exif,
            Err(e) => {
                debug!("No usable EXIF data, starting from an empty tag set: {}", e);
                return Self::empty();
            }
        };

        let thumbnail = thumbnail_bytes(&exif);
        let fields = exif
            .fields()
            .filter(|field| {
                field.ifd_num == In::PRIMARY
                    || (field.ifd_num == In::THUMBNAIL && thumbnail.is_some())
            })
            .filter(|field| !(field.ifd_num == In::PRIMARY && TIMESTAMP_TAGS.contains(&field.tag)))
            .filter(|field| !matches!(field.value, Value::Unknown(..)))
            .cloned()
            .collect();

        Self {
            fields,
            thumbnail,
            little_endian: exif.little_endian(),
        }
    }
}

fn thumbnail_bytes(exif: &exif::Exif) -> Option<Vec<u8>> {
    let offset = exif
        .get_field(Tag::JPEGInterchangeFormat, In::THUMBNAIL)?
        .value
        .get_uint(0)? as usize;
    let length = exif
        .get_field(Tag::JPEGInterchangeFormatLength, In::THUMBNAIL)?
        .value
        .get_uint(0)? as usize;
    exif.buf()
        .get(offset..offset.checked_add(length)?)
        .map(<[u8]>::to_vec)
}

/// Encode `existing` plus the three timestamp tags set to `stamp` as a TIFF block
fn encode_tags(existing: &ExistingTags, stamp: &str) -> Result<Vec<u8>> {
    let stamped: Vec<Field> = TIMESTAMP_TAGS
        .iter()
        .map(|&tag| Field {
            tag,
            ifd_num: In::PRIMARY,
            value: Value::Ascii(vec![stamp.as_bytes().to_vec()]),
        })
        .collect();

    let mut writer = Writer::new();
    for field in existing.fields.iter().chain(stamped.iter()) {
        writer.push_field(field);
    }
    if let Some(thumbnail) = &existing.thumbnail {
        writer.set_jpeg(thumbnail, In::THUMBNAIL);
    }

    let mut buf = Cursor::new(Vec::new());
    writer
        .write(&mut buf, existing.little_endian)
        .context("Failed to encode EXIF data")?;
    Ok(buf.into_inner())
}

/// Segments between SOI and the start of scan
struct JpegLayout {
    segments: Vec<(Range<usize>, bool)>,
    image_data: usize,
}

fn scan_segments(jpeg: &[u8]) -> Result<JpegLayout> {
    if jpeg.len() < 2 || jpeg[0] != 0xFF || jpeg[1] != MARKER_SOI {
        bail!("Not a JPEG file (missing SOI marker)");
    }

    let mut segments = Vec::new();
    let mut pos = 2;
    loop {
        if pos + 2 > jpeg.len() {
            bail!("Truncated JPEG: no image data after offset {}", pos);
        }
        if jpeg[pos] != 0xFF {
            bail!("Invalid JPEG marker at offset {}", pos);
        }
        let marker = jpeg[pos + 1];
        if marker == 0xFF {
            // fill byte
            pos += 1;
            continue;
        }
        if marker == MARKER_SOS || marker == MARKER_EOI {
            return Ok(JpegLayout {
                segments,
                image_data: pos,
            });
        }
        if pos + 4 > jpeg.len() {
            bail!("Truncated JPEG segment at offset {}", pos);
        }
        let length = u16::from_be_bytes([jpeg[pos + 2], jpeg[pos + 3]]) as usize;
        let end = pos + 2 + length;
        if length < 2 || end > jpeg.len() {
            bail!("Invalid JPEG segment length {} at offset {}", length, pos);
        }
        let is_exif = marker == MARKER_APP1 && jpeg[pos + 4..end].starts_with(EXIF_HEADER);
        segments.push((pos..end, is_exif));
        pos = end;
    }
}

/// Replace the first Exif APP1 segment with `tiff`, or insert one right after SOI.
/// Any further Exif APP1 segments are dropped.
pub fn splice_exif_segment(jpeg: &[u8], tiff: &[u8]) -> Result<Vec<u8>> {
    let payload = EXIF_HEADER.len() + tiff.len();
    let length = u16::try_from(payload + 2).map_err(|_| {
        anyhow!(
            "EXIF block too large for a JPEG APP1 segment ({} bytes)",
            tiff.len()
        )
    })?;

    let mut app1 = Vec::with_capacity(payload + 4);
    app1.extend_from_slice(&[0xFF, MARKER_APP1]);
    app1.extend_from_slice(&length.to_be_bytes());
    app1.extend_from_slice(EXIF_HEADER);
    app1.extend_from_slice(tiff);

    let layout = scan_segments(jpeg)?;
    let has_exif = layout.segments.iter().any(|(_, is_exif)| *is_exif);

    let mut out = Vec::with_capacity(jpeg.len() + app1.len());
    out.extend_from_slice(&jpeg[..2]);
    let mut written = false;
    if !has_exif {
        out.extend_from_slice(&app1);
        written = true;
    }
    for (range, is_exif) in layout.segments {
        if !is_exif {
            out.extend_from_slice(&jpeg[range]);
        } else if !written {
            out.extend_from_slice(&app1);
            written = true;
        }
    }
    out.extend_from_slice(&jpeg[layout.image_data..]);
    Ok(out)
}

/// Set DateTime, DateTimeOriginal and DateTimeDigitized of a JPEG file in place.
///
/// Returns the formatted date string that was written.
pub fn write_timestamps(file_path: &Path, timestamp: i64) -> Result<String> {
    let stamp = format_exif_datetime(timestamp)?;
    let original = fs::read(file_path)
        .with_context(|| format!("Failed to read {}", file_path.display()))?;

    let existing = ExistingTags::load(&original);
    debug!(
        "Writing EXIF timestamps '{}' to {} ({} existing tags kept)",
        stamp,
        file_path.display(),
        existing.fields.len()
    );

    let tiff = encode_tags(&existing, &stamp)?;
    let updated = splice_exif_segment(&original, &tiff)?;
    fs::write(file_path, updated)
        .with_context(|| format!("Failed to write {}", file_path.display()))?;
    Ok(stamp)
}
