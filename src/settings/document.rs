//! Persisted settings document

use serde::{Deserialize, Serialize};

/// Key of the compass offset in the settings file
pub const KEY_COMPASS_OFFSET: &str = "compassOffset";

/// Key of the manual GPS position in the settings file
pub const KEY_GPS_LOCATION: &str = "gpsLocation";

/// Key of the manual UTM position in the settings file
pub const KEY_UTM_LOCATION: &str = "utmLocation";

/// Manually entered geographic position
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GpsLocation {
    pub lat: f64,
    pub lng: f64,
}

/// Manually entered UTM position, kept as typed by the operator
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UtmLocation {
    pub zone: String,
    pub easting: String,
    pub northing: String,
    pub co: String,
}

/// All user settings
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsDocument {
    /// Degrees added to the compass heading
    pub compass_offset: f64,
    pub gps_location: GpsLocation,
    pub utm_location: UtmLocation,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let doc = SettingsDocument::default();
        assert_eq!(doc.compass_offset, 0.0);
        assert_eq!(doc.gps_location, GpsLocation { lat: 0.0, lng: 0.0 });
        assert_eq!(doc.utm_location.zone, "");
        assert_eq!(doc.utm_location.co, "");
    }

    #[test]
    fn test_wire_keys() {
        let json = serde_json::to_value(SettingsDocument::default()).unwrap();
        let object = json.as_object().unwrap();
        assert!(object.contains_key(KEY_COMPASS_OFFSET));
        assert!(object.contains_key(KEY_GPS_LOCATION));
        assert!(object.contains_key(KEY_UTM_LOCATION));
        assert_eq!(json[KEY_GPS_LOCATION]["lng"], 0.0);
        assert_eq!(json[KEY_UTM_LOCATION]["easting"], "");
    }
}
