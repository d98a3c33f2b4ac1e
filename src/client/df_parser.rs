//! # DF Payload Decoder
//!
//! Decodes the comma-separated text returned by the instrument's `/df`
//! endpoint into a [`BearingReading`].
//!
//! ## Field Layout
//!
//! | Field | Content |
//! |-------|---------|
//! | 0 | Timestamp token (opaque, used for staleness dedup) |
//! | 1 | Raw heading in degrees (counter-clockwise) |
//! | 2 | Confidence |
//! | 3 | Power |
//! | 4..17 | Unused |
//! | 17..377 | 360 polar magnitudes, reversed before storage |

use super::BearingReading;
use crate::error::{DfCompanionError, Result};

/// Minimum number of fields in a complete DF payload
pub const DF_MIN_FIELDS: usize = 377;

/// Number of polar magnitudes (one per degree)
pub const POLAR_SAMPLES: usize = 360;

/// Index of the first polar magnitude
pub const POLAR_FIRST_FIELD: usize = 17;

/// Decode a raw DF payload
///
/// # Errors
///
/// Returns `Parse` if the payload is empty, has fewer than
/// [`DF_MIN_FIELDS`] fields, or carries a non-numeric heading, confidence,
/// power or polar value.
pub fn parse_df_payload(text: &str) -> Result<BearingReading> {
    if text.trim().is_empty() {
        return Err(DfCompanionError::Parse("DF data is empty".to_string()));
    }

    let fields: Vec<&str> = text.split(',').map(str::trim).collect();

    if fields.len() < DF_MIN_FIELDS {
        return Err(DfCompanionError::Parse(format!(
            "DF data is incomplete: {} fields, expected at least {}",
            fields.len(),
            DF_MIN_FIELDS
        )));
    }

    let raw_heading = parse_number(fields[1], "heading")?;
    let confidence = parse_number(fields[2], "confidence")?;
    let power = parse_number(fields[3], "power")?;

    let mut polar = fields[POLAR_FIRST_FIELD..POLAR_FIRST_FIELD + POLAR_SAMPLES]
        .iter()
        .enumerate()
        .map(|(i, field)| parse_number(field, &format!("polar[{}]", i)))
        .collect::<Result<Vec<f64>>>()?;
    polar.reverse();

    let polar_samples: Box<[f64; POLAR_SAMPLES]> = polar
        .into_boxed_slice()
        .try_into()
        .map_err(|_| DfCompanionError::Parse("DF polar sweep has wrong length".to_string()))?;

    Ok(BearingReading {
        timestamp: fields[0].to_string(),
        heading_degrees: device_heading(raw_heading),
        confidence,
        power,
        polar_samples,
    })
}

/// Convert the device's counter-clockwise heading to a clockwise bearing in [0, 360)
pub fn device_heading(raw: f64) -> f64 {
    (360.0 - raw).rem_euclid(360.0)
}

fn parse_number(field: &str, name: &str) -> Result<f64> {
    field
        .parse::<f64>()
        .map_err(|_| DfCompanionError::Parse(format!("DF {} is not a number: {:?}", name, field)))
}

/// Build a synthetic payload (shared with the store tests)
#[cfg(test)]
pub(crate) fn sample_payload(token: &str, raw_heading: f64, field_count: usize) -> String {
    let mut fields = vec![token.to_string(), raw_heading.to_string(), "0.8".into(), "-40".into()];
    while fields.len() < field_count {
        fields.push((fields.len() - POLAR_FIRST_FIELD.min(fields.len())).to_string());
    }
    fields.truncate(field_count);
    fields.join(",")
}
