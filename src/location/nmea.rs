//! NMEA 0183 sentence tracking
//!
//! Only the two sentences needed for a position fix are read:
//! - `GGA`: fix quality and HDOP, remembered until the next `GGA`
//! - `RMC`: position, course over ground and UTC date/time
//!
//! Every valid `RMC` with status `A` yields a [`DeviceFix`].

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};

use super::DeviceFix;

/// Accuracy reported per unit of HDOP (meters)
pub const METERS_PER_HDOP: f64 = 5.0;

/// Accuracy reported when no `GGA` has been seen (meters)
pub const UNKNOWN_ACCURACY_M: f64 = 500.0;

/// Validate the `*hh` checksum and return the sentence body between `$` and `*`
///
/// Sentences without a checksum are rejected.
pub fn verify_checksum(sentence: &str) -> Option<&str> {
    let sentence = sentence.trim();
    let rest = sentence.strip_prefix('$')?;
    let (body, checksum) = rest.split_once('*')?;
    let expected = u8::from_str_radix(checksum.get(..2)?, 16).ok()?;
    let actual = body.bytes().fold(0u8, |acc, b| acc ^ b);

    (actual == expected).then_some(body)
}

/// Folds NMEA sentences into position fixes
#[derive(Debug, Default, Clone)]
pub struct NmeaTracker {
    hdop: Option<f64>,
}

impl NmeaTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// HDOP from the last `GGA` with a valid fix
    pub fn hdop(&self) -> Option<f64> {
        self.hdop
    }

    /// Feed one line; returns a fix for each valid `RMC`
    pub fn feed(&mut self, line: &str) -> Option<DeviceFix> {
        let body = verify_checksum(line)?;
        let fields: Vec<&str> = body.split(',').collect();

        // Talker id is the first two characters ("GP", "GN", "GL", ...)
        match fields.first()?.get(2..)? {
            "GGA" => {
                self.apply_gga(&fields);
                None
            }
            "RMC" => self.parse_rmc(&fields),
            _ => None,
        }
    }

    fn apply_gga(&mut self, fields: &[&str]) {
        let quality: u8 = fields.get(6).and_then(|q| q.parse().ok()).unwrap_or(0);
        self.hdop = if quality == 0 {
            None
        } else {
            fields.get(8).and_then(|h| h.parse().ok())
        };
    }

    fn parse_rmc(&self, fields: &[&str]) -> Option<DeviceFix> {
        if fields.len() < 10 || fields[2] != "A" {
            return None;
        }

        let lat = parse_deg_min(fields[3], fields[4])?;
        let lon = parse_deg_min(fields[5], fields[6])?;
        let heading_degrees = fields[8].parse().ok();
        let timestamp = parse_datetime(fields[9], fields[1]).unwrap_or_else(Utc::now);
        let accuracy_meters = self
            .hdop
            .map_or(UNKNOWN_ACCURACY_M, |hdop| hdop * METERS_PER_HDOP);

        Some(DeviceFix {
            lat,
            lon,
            accuracy_meters,
            heading_degrees,
            timestamp,
        })
    }
}

/// `ddmm.mmmm` / `dddmm.mmmm` plus hemisphere to signed decimal degrees
fn parse_deg_min(value: &str, hemisphere: &str) -> Option<f64> {
    let dot = value.find('.')?;
    let deg_len = dot.checked_sub(2)?;
    let degrees: f64 = value.get(..deg_len)?.parse().ok()?;
    let minutes: f64 = value.get(deg_len..)?.parse().ok()?;
    let magnitude = degrees + minutes / 60.0;

    match hemisphere {
        "N" | "E" => Some(magnitude),
        "S" | "W" => Some(-magnitude),
        _ => None,
    }
}

/// `ddmmyy` and `hhmmss[.sss]` to UTC
fn parse_datetime(date: &str, time: &str) -> Option<DateTime<Utc>> {
    let day = date.get(0..2)?.parse().ok()?;
    let month = date.get(2..4)?.parse().ok()?;
    let yy: i32 = date.get(4..6)?.parse().ok()?;
    let year = if yy < 80 { 2000 + yy } else { 1900 + yy };

    let (whole, fraction) = time.split_once('.').unwrap_or((time, ""));
    let hour = whole.get(0..2)?.parse().ok()?;
    let minute = whole.get(2..4)?.parse().ok()?;
    let second = whole.get(4..6)?.parse().ok()?;
    let milli = if fraction.is_empty() {
        0
    } else {
        format!("{:0<3}", fraction).get(..3)?.parse().ok()?
    };

    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    let time = NaiveTime::from_hms_milli_opt(hour, minute, second, milli)?;
    Some(date.and_time(time).and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    const GGA: &str = "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47";
    const RMC: &str = "$GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W*6A";

    #[test]
    fn test_checksum_valid() {
        assert!(verify_checksum(GGA).is_some());
        assert!(verify_checksum(RMC).is_some());
        assert!(verify_checksum(&format!("{}\r\n", RMC)).is_some());
    }

    #[test]
    fn test_checksum_rejects_bad_or_missing() {
        assert!(verify_checksum("$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*48").is_none());
        assert!(verify_checksum("$GPGGA,123519,4807.038,N").is_none());
        assert!(verify_checksum("GPGGA,123519*47").is_none());
        assert!(verify_checksum("$GPGGA,123519*Z").is_none());
    }

    #[test]
    fn test_gga_then_rmc_yields_fix() {
        let mut tracker = NmeaTracker::new();
        assert!(tracker.feed(GGA).is_none());
        assert_eq!(tracker.hdop(), Some(0.9));

        let fix = tracker.feed(RMC).unwrap();
        assert!((fix.lat - 48.1173).abs() < 1e-6);
        assert!((fix.lon - (11.0 + 31.0 / 60.0)).abs() < 1e-9);
        assert!((fix.accuracy_meters - 4.5).abs() < 1e-9);
        assert_eq!(fix.heading_degrees, Some(84.4));

        assert_eq!(fix.timestamp.year(), 1994);
        assert_eq!(fix.timestamp.month(), 3);
        assert_eq!(fix.timestamp.day(), 23);
        assert_eq!(fix.timestamp.hour(), 12);
        assert_eq!(fix.timestamp.minute(), 35);
        assert_eq!(fix.timestamp.second(), 19);
    }

    #[test]
    fn test_rmc_without_gga_is_unknown_accuracy() {
        let mut tracker = NmeaTracker::new();
        let fix = tracker.feed(RMC).unwrap();
        assert_eq!(fix.accuracy_meters, UNKNOWN_ACCURACY_M);
    }

    #[test]
    fn test_gn_talker_and_southern_western_hemisphere() {
        let mut tracker = NmeaTracker::new();
        tracker.feed("$GNGGA,101530.00,5130.000,N,00007.500,W,1,10,1.4,35.0,M,47.0,M,,*52");
        let fix = tracker
            .feed("$GNRMC,101530.00,A,5130.000,N,00007.500,W,0.5,,190326,,,A*75")
            .unwrap();

        assert!((fix.lat - 51.5).abs() < 1e-9);
        assert!((fix.lon + 0.125).abs() < 1e-9);
        assert!((fix.accuracy_meters - 7.0).abs() < 1e-9);
        assert_eq!(fix.heading_degrees, None);
        assert_eq!(fix.timestamp.year(), 2026);
    }

    #[test]
    fn test_void_rmc_ignored() {
        let mut tracker = NmeaTracker::new();
        assert!(tracker.feed("$GPRMC,123519,V,,,,,,,230394,,*33").is_none());
    }

    #[test]
    fn test_gga_without_fix_forgets_hdop() {
        let mut tracker = NmeaTracker::new();
        tracker.feed(GGA);
        tracker.feed("$GPGGA,123519,,,,,0,00,99.9,,M,,M,,*7C");
        assert_eq!(tracker.hdop(), None);
    }

    #[test]
    fn test_poor_hdop_is_degraded_accuracy() {
        let mut tracker = NmeaTracker::new();
        tracker.feed("$GPGGA,123600,4807.038,N,01131.000,E,1,05,40.0,545.4,M,46.9,M,,*7C");
        let fix = tracker
            .feed("$GPRMC,123600,A,4807.038,N,01131.000,E,000.0,,230394,,*38")
            .unwrap();
        assert_eq!(fix.accuracy_meters, 200.0);
    }

    #[test]
    fn test_bad_checksum_rmc_ignored() {
        let mut tracker = NmeaTracker::new();
        assert!(tracker
            .feed("$GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W*6B")
            .is_none());
    }

    #[test]
    fn test_other_sentences_ignored() {
        let mut tracker = NmeaTracker::new();
        assert!(tracker.feed("$GPGSV,1,1,00*79").is_none());
        assert!(tracker.feed("").is_none());
        assert!(tracker.feed("garbage").is_none());
    }

    #[test]
    fn test_parse_deg_min() {
        assert_eq!(parse_deg_min("4807.038", "N"), Some(48.0 + 7.038 / 60.0));
        assert_eq!(parse_deg_min("4807.038", "S"), Some(-(48.0 + 7.038 / 60.0)));
        assert_eq!(parse_deg_min("4807.038", "X"), None);
        assert_eq!(parse_deg_min("", "N"), None);
        assert_eq!(parse_deg_min("7.0", "N"), None);
    }

    #[test]
    fn test_non_ascii_coordinate_ignored() {
        assert_eq!(parse_deg_min("é1.5", "N"), None);
        assert_eq!(parse_deg_min("48é7.038", "N"), None);

        let mut tracker = NmeaTracker::new();
        let sentence = "$GPRMC,123519,A,é1.5,N,01131.000,E,022.4,084.4,230394,003.1,W*34";
        assert!(verify_checksum(sentence).is_some());
        assert!(tracker.feed(sentence).is_none());
    }

    #[test]
    fn test_parse_datetime_fraction() {
        let ts = parse_datetime("190326", "101530.25").unwrap();
        assert_eq!(ts.timestamp_subsec_millis(), 250);
        assert!(parse_datetime("", "101530").is_none());
        assert!(parse_datetime("320126", "101530").is_none());
    }
}
