//! # DMS Conversion
//!
//! Degrees-minutes-seconds parsing, validation and formatting.
//!
//! Accepted input forms (whitespace anywhere is ignored):
//!
//! | Form | Example |
//! |------|---------|
//! | Degree sign | `6°10'31.36"S` |
//! | Letter `d` | `106d49'37.26"E` |
//! | Typographic marks | `6° 10′ 31.36″ S` |
//! | No seconds mark | `6°10'31.36S` |
//!
//! ## Usage
//!
//! ```
//! use df_companion::coords::{to_decimal, to_dms};
//!
//! let lat = to_decimal("6°10'31.36\"S").unwrap();
//! assert!((lat - -6.175378).abs() < 1e-6);
//! assert_eq!(to_dms(lat, true, 2).as_deref(), Some("6°10'31.36\"S"));
//! ```

use regex::Regex;
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;

/// Maximum latitude magnitude in degrees
pub const MAX_LATITUDE: f64 = 90.0;

/// Maximum longitude magnitude in degrees
pub const MAX_LONGITUDE: f64 = 180.0;

/// Coordinate validation failures
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CoordinateError {
    #[error("Invalid format\nExample: 6°10'31.36\"S or 106°49'37.26\"E")]
    InvalidFormat,

    #[error("Minutes and seconds must be less than 60")]
    MinutesOrSecondsOutOfRange,

    #[error("Latitude cannot exceed 90°")]
    LatitudeOutOfRange,

    #[error("Longitude cannot exceed 180°")]
    LongitudeOutOfRange,

    #[error("Input must be a number")]
    NotANumber,

    #[error("Value must be between -{max} and {max}")]
    OutOfRange { max: f64 },
}

/// Compass hemisphere letter of a DMS coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hemisphere {
    North,
    South,
    East,
    West,
}

impl Hemisphere {
    fn from_letter(letter: &str) -> Option<Self> {
        match letter.to_ascii_uppercase().as_str() {
            "N" => Some(Hemisphere::North),
            "S" => Some(Hemisphere::South),
            "E" => Some(Hemisphere::East),
            "W" => Some(Hemisphere::West),
            _ => None,
        }
    }

    /// True for N/S
    pub fn is_latitude(self) -> bool {
        matches!(self, Hemisphere::North | Hemisphere::South)
    }

    /// True for S/W, which carry a negative decimal sign
    pub fn is_negative(self) -> bool {
        matches!(self, Hemisphere::South | Hemisphere::West)
    }

    fn for_decimal(decimal: f64, is_latitude: bool) -> Self {
        match (is_latitude, decimal >= 0.0) {
            (true, true) => Hemisphere::North,
            (true, false) => Hemisphere::South,
            (false, true) => Hemisphere::East,
            (false, false) => Hemisphere::West,
        }
    }
}

impl fmt::Display for Hemisphere {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let letter = match self {
            Hemisphere::North => "N",
            Hemisphere::South => "S",
            Hemisphere::East => "E",
            Hemisphere::West => "W",
        };
        f.write_str(letter)
    }
}

/// Components of a parsed DMS string
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DmsComponents {
    /// Degree magnitude (a leading minus sign is discarded)
    pub degrees: f64,
    pub minutes: f64,
    pub seconds: f64,
    pub hemisphere: Hemisphere,
}

impl DmsComponents {
    /// Unsigned decimal magnitude
    pub fn magnitude(&self) -> f64 {
        self.degrees + self.minutes / 60.0 + self.seconds / 3600.0
    }

    /// Signed decimal value (S/W negative)
    pub fn to_decimal(&self) -> f64 {
        let magnitude = self.magnitude();
        if self.hemisphere.is_negative() {
            -magnitude
        } else {
            magnitude
        }
    }
}

fn dms_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r#"(?i)^(-?\d+(?:\.\d+)?)[°d](\d+(?:\.\d+)?)['‘’′](\d+(?:\.\d+)?)["“”″]?([NSEW])$"#,
        )
        .expect("DMS pattern is a valid regex")
    })
}

/// Parse a DMS string into its components
///
/// Returns `None` when the string does not match the accepted format.
/// Range checks are left to [`validate_dms`].
pub fn parse(dms: &str) -> Option<DmsComponents> {
    let cleaned: String = dms.chars().filter(|c| !c.is_whitespace()).collect();
    let caps = dms_pattern().captures(&cleaned)?;

    Some(DmsComponents {
        degrees: caps[1].parse::<f64>().ok()?.abs(),
        minutes: caps[2].parse().ok()?,
        seconds: caps[3].parse().ok()?,
        hemisphere: Hemisphere::from_letter(&caps[4])?,
    })
}

/// Validate a DMS string
///
/// # Errors
///
/// - `InvalidFormat` if the string cannot be parsed
/// - `MinutesOrSecondsOutOfRange` if minutes or seconds are 60 or more
/// - `LatitudeOutOfRange` / `LongitudeOutOfRange` if the magnitude exceeds
///   90° (N/S) or 180° (E/W)
pub fn validate_dms(dms: &str) -> Result<(), CoordinateError> {
    let parsed = parse(dms).ok_or(CoordinateError::InvalidFormat)?;

    if parsed.minutes >= 60.0 || parsed.seconds >= 60.0 {
        return Err(CoordinateError::MinutesOrSecondsOutOfRange);
    }

    let magnitude = parsed.magnitude();
    if parsed.hemisphere.is_latitude() && magnitude > MAX_LATITUDE {
        return Err(CoordinateError::LatitudeOutOfRange);
    }
    if !parsed.hemisphere.is_latitude() && magnitude > MAX_LONGITUDE {
        return Err(CoordinateError::LongitudeOutOfRange);
    }

    Ok(())
}

/// Validate a decimal coordinate typed by the operator
pub fn validate_decimal(value: &str, is_latitude: bool) -> Result<(), CoordinateError> {
    let num: f64 = value
        .trim()
        .parse()
        .map_err(|_| CoordinateError::NotANumber)?;
    if num.is_nan() {
        return Err(CoordinateError::NotANumber);
    }

    let max = if is_latitude { MAX_LATITUDE } else { MAX_LONGITUDE };
    if num < -max || num > max {
        return Err(CoordinateError::OutOfRange { max });
    }

    Ok(())
}

/// Convert a DMS string to signed decimal degrees
pub fn to_decimal(dms: &str) -> Option<f64> {
    parse(dms).map(|parsed| parsed.to_decimal())
}

/// Format signed decimal degrees as a DMS string
///
/// `precision` is the number of decimal places on the seconds field.
/// Returns `None` for non-finite input or a magnitude beyond the latitude
/// or longitude bound.
pub fn to_dms(decimal: f64, is_latitude: bool, precision: usize) -> Option<String> {
    if !decimal.is_finite() {
        return None;
    }

    let max = if is_latitude { MAX_LATITUDE } else { MAX_LONGITUDE };
    if decimal < -max || decimal > max {
        return None;
    }

    let absolute = decimal.abs();
    let degrees = absolute.floor();
    let minutes_decimal = (absolute - degrees) * 60.0;
    let minutes = minutes_decimal.floor();
    let seconds = (minutes_decimal - minutes) * 60.0;
    let hemisphere = Hemisphere::for_decimal(decimal, is_latitude);

    Some(format!(
        "{}°{}'{:.*}\"{}",
        degrees as u32, minutes as u32, precision, seconds, hemisphere
    ))
}
