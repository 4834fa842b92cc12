//! SpoolEase spool records and the CSV inventory-dump decoder
//!
//! The device serializes its spool table as header-less CSV with exactly 21
//! fields per row, in struct-definition order. Optional integers are empty
//! when absent, booleans are `y`/`n` (empty for the tri-valued flag), and
//! the two consumption counters are little-endian IEEE-754 singles packed
//! into unpadded base64.

use std::str::FromStr;

use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine as _;
use tracing::warn;

use crate::error::{Error, Result};

/// Number of CSV fields in a spool record row
pub const SPOOL_RECORD_FIELDS: usize = 21;

/// One spool as reported by the device inventory dump.
///
/// Field order here is the CSV column order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpoolRecord {
    /// Device-local spool id (opaque, may change across re-enrollments)
    pub id: String,
    /// NFC tag id, 14 hex chars; a leading `-` marks the tag retired
    pub tag_id: String,
    /// Material family, e.g. "PLA", "PETG", "ASA"
    pub material_type: String,
    /// Material subtype, e.g. "CF", "Basic"
    pub material_subtype: String,
    /// Human color name, e.g. "Black"
    pub color_name: String,
    /// 8-char RGBA hex, e.g. "FF0000FF"
    pub color_code: String,
    pub note: String,
    pub brand: String,
    /// Label weight in grams
    pub weight_advertised: Option<i32>,
    /// Empty spool core weight in grams
    pub weight_core: Option<i32>,
    /// Initial full weight when marked new
    pub weight_new: Option<i32>,
    /// Latest scale measurement in grams
    pub weight_current: Option<i32>,
    pub slicer_filament: String,
    /// Unix timestamp the spool was added
    pub added_time: Option<i64>,
    /// Unix timestamp the tag was encoded
    pub encode_time: Option<i64>,
    pub added_full: Option<bool>,
    /// Grams consumed over the lifetime of this spool record
    pub consumed_since_add: f32,
    /// Grams consumed since the spool was last weighed
    pub consumed_since_weight: f32,
    pub ext_has_k: bool,
    pub data_origin: String,
    /// Tag discriminator, e.g. "SpoolEaseV1", "Bambu Lab", "OpenPrintTag"
    pub tag_type: String,
}

impl SpoolRecord {
    /// Whether this record is eligible for cross-system mapping.
    ///
    /// Tags starting with `-` were invalidated (the sticker moved to a
    /// different spool) and must be ignored.
    pub fn has_valid_tag_id(&self) -> bool {
        !self.tag_id.is_empty() && !self.tag_id.starts_with('-')
    }

    /// The color code as 6-char RGB hex (alpha channel stripped).
    pub fn color_hex_rgb(&self) -> &str {
        self.color_code.get(..6).unwrap_or(&self.color_code)
    }
}

/// Parse the decrypted CSV body of `GET /api/spools`.
///
/// Rows with fewer than 21 fields are skipped silently; rows whose fields
/// fail to decode are skipped with a warning. Empty input yields no records.
pub fn parse_spools_csv(csv_text: &str) -> Vec<SpoolRecord> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(csv_text.as_bytes());

    let mut records = Vec::new();
    for row in reader.records() {
        let row = match row {
            Ok(row) => row,
            Err(e) => {
                warn!("Skipping unreadable inventory row: {}", e);
                continue;
            }
        };
        if row.len() < SPOOL_RECORD_FIELDS {
            continue;
        }
        match record_from_row(&row) {
            Ok(record) => records.push(record),
            Err(e) => {
                warn!(
                    "Skipping inventory row (id={}, tag={}): {}",
                    row.get(0).unwrap_or(""),
                    row.get(1).unwrap_or(""),
                    e
                );
            }
        }
    }
    records
}

fn record_from_row(row: &csv::StringRecord) -> Result<SpoolRecord> {
    let field = |i: usize| row.get(i).unwrap_or("").to_owned();

    Ok(SpoolRecord {
        id: field(0),
        tag_id: field(1),
        material_type: field(2),
        material_subtype: field(3),
        color_name: field(4),
        color_code: field(5),
        note: field(6),
        brand: field(7),
        weight_advertised: parse_optional(row.get(8).unwrap_or(""), "weight_advertised")?,
        weight_core: parse_optional(row.get(9).unwrap_or(""), "weight_core")?,
        weight_new: parse_optional(row.get(10).unwrap_or(""), "weight_new")?,
        weight_current: parse_optional(row.get(11).unwrap_or(""), "weight_current")?,
        slicer_filament: field(12),
        added_time: parse_optional(row.get(13).unwrap_or(""), "added_time")?,
        encode_time: parse_optional(row.get(14).unwrap_or(""), "encode_time")?,
        added_full: parse_optional_bool_yn(row.get(15).unwrap_or("")),
        consumed_since_add: parse_f32_base64(row.get(16).unwrap_or(""), "consumed_since_add")?,
        consumed_since_weight: parse_f32_base64(
            row.get(17).unwrap_or(""),
            "consumed_since_weight",
        )?,
        ext_has_k: parse_bool_yn(row.get(18).unwrap_or("")),
        data_origin: field(19),
        tag_type: field(20),
    })
}

/// Decode a base64-no-pad little-endian f32 field; empty means 0.0.
pub fn parse_f32_base64(s: &str, field: &'static str) -> Result<f32> {
    if s.is_empty() {
        return Ok(0.0);
    }
    let raw = STANDARD_NO_PAD
        .decode(s)
        .map_err(|e| Error::InvalidField {
            field,
            reason: e.to_string(),
        })?;
    let bytes: [u8; 4] = raw.as_slice().try_into().map_err(|_| Error::InvalidField {
        field,
        reason: format!("expected 4 bytes, got {}", raw.len()),
    })?;
    Ok(f32::from_le_bytes(bytes))
}

fn parse_optional<T: FromStr>(s: &str, field: &'static str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    if s.is_empty() {
        return Ok(None);
    }
    s.parse()
        .map(Some)
        .map_err(|e: T::Err| Error::InvalidField {
            field,
            reason: e.to_string(),
        })
}

fn parse_optional_bool_yn(s: &str) -> Option<bool> {
    if s.is_empty() {
        None
    } else {
        Some(s.eq_ignore_ascii_case("y"))
    }
}

fn parse_bool_yn(s: &str) -> bool {
    s.eq_ignore_ascii_case("y")
}
