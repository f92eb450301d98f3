//! Core data types for device readings and exported history.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::timestamp::Timestamp;

/// One location sample for a tracked device, as reported by the tracking API.
///
/// Field names follow the API's JSON (`DeviceID`, `Date`, `Latitude`, ...).
/// Fields without a dedicated member are kept in [`extra`](Self::extra) so a
/// stored reading round-trips the document it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceReading {
    /// Device identifier.
    #[serde(rename = "DeviceID", default, deserialize_with = "string_or_number")]
    pub device_id: String,
    /// Device display name.
    #[serde(rename = "DeviceName", default, skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,
    /// When the reading was taken, in the device's local offset.
    #[serde(rename = "Date")]
    pub date: Timestamp,
    /// Latitude in decimal degrees.
    #[serde(rename = "Latitude", deserialize_with = "f64_or_string")]
    pub latitude: f64,
    /// Longitude in decimal degrees.
    #[serde(rename = "Longitude", deserialize_with = "f64_or_string")]
    pub longitude: f64,
    /// Fix type reported by the API (e.g. `GPS`, `WiFi`).
    #[serde(rename = "Type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Speed in miles per hour.
    #[serde(rename = "Speed(mph)", default, skip_serializing_if = "Option::is_none")]
    pub speed_mph: Option<f64>,
    /// Heading in degrees.
    #[serde(rename = "Direction", default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<f64>,
    /// Altitude in metres.
    #[serde(rename = "Altitude(m)", default, skip_serializing_if = "Option::is_none")]
    pub altitude_m: Option<f64>,
    /// Horizontal accuracy in metres.
    #[serde(rename = "Accuracy", default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    /// Any other fields of the API document.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DeviceReading {
    /// API fields that duplicate other fields in different units.
    pub const REDUNDANT_FIELDS: [&'static str; 2] = ["Altitude(ft)", "Speed(km/h)"];

    /// Create a minimal reading.
    pub fn new(device_id: &str, date: Timestamp, latitude: f64, longitude: f64) -> Self {
        Self {
            device_id: device_id.to_string(),
            device_name: None,
            date,
            latitude,
            longitude,
            kind: None,
            speed_mph: None,
            direction: None,
            altitude_m: None,
            accuracy: None,
            extra: Map::new(),
        }
    }

    /// Drop the fields listed in [`REDUNDANT_FIELDS`](Self::REDUNDANT_FIELDS).
    pub fn without_redundant_fields(mut self) -> Self {
        for key in Self::REDUNDANT_FIELDS {
            self.extra.remove(key);
        }
        self
    }
}

/// A row of the flat history export: `Date,Latitude,Longitude`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRow {
    #[serde(rename = "Date")]
    pub date: Timestamp,
    #[serde(rename = "Latitude")]
    pub latitude: f64,
    #[serde(rename = "Longitude")]
    pub longitude: f64,
}

impl HistoryRow {
    /// Project a reading onto the exported columns.
    pub fn from_reading(reading: &DeviceReading) -> Self {
        Self {
            date: reading.date.clone(),
            latitude: reading.latitude,
            longitude: reading.longitude,
        }
    }

    /// Key identifying exact duplicates: the literal date text and both
    /// coordinates bit-for-bit.
    pub fn dedup_key(&self) -> (String, u64, u64) {
        (
            self.date.as_str().to_string(),
            self.latitude.to_bits(),
            self.longitude.to_bits(),
        )
    }
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

fn f64_or_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| serde::de::Error::custom("coordinate out of range")),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid coordinate '{s}'"))),
        other => Err(serde::de::Error::custom(format!(
            "expected coordinate, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_document() -> Value {
        serde_json::json!({
            "DeviceName": "Pixel",
            "DeviceID": 12345678,
            "Date": "2024-05-28T20:09:53+02:00",
            "Latitude": 51.5074,
            "Longitude": "-0.1278",
            "Type": "GPS",
            "Speed(mph)": 3.1,
            "Speed(km/h)": 5.0,
            "Direction": 90,
            "Altitude(ft)": 98,
            "Altitude(m)": 30,
            "Accuracy": 12,
            "Battery": "87%"
        })
    }

    #[test]
    fn test_deserialize_api_document() {
        let reading: DeviceReading = serde_json::from_value(api_document()).unwrap();
        assert_eq!(reading.device_id, "12345678");
        assert_eq!(reading.device_name.as_deref(), Some("Pixel"));
        assert_eq!(reading.date.as_str(), "2024-05-28T20:09:53+02:00");
        assert_eq!(reading.latitude, 51.5074);
        assert_eq!(reading.longitude, -0.1278);
        assert_eq!(reading.kind.as_deref(), Some("GPS"));
        assert_eq!(reading.altitude_m, Some(30.0));
        assert_eq!(reading.extra.get("Battery"), Some(&Value::from("87%")));
        assert!(reading.extra.contains_key("Altitude(ft)"));
    }

    #[test]
    fn test_without_redundant_fields() {
        let reading: DeviceReading = serde_json::from_value(api_document()).unwrap();
        let reading = reading.without_redundant_fields();
        assert!(!reading.extra.contains_key("Altitude(ft)"));
        assert!(!reading.extra.contains_key("Speed(km/h)"));
        assert!(reading.extra.contains_key("Battery"));
    }

    #[test]
    fn test_serialize_keeps_api_names() {
        let reading: DeviceReading = serde_json::from_value(api_document()).unwrap();
        let json = serde_json::to_value(reading.without_redundant_fields()).unwrap();
        assert_eq!(json["DeviceID"], "12345678");
        assert_eq!(json["Date"], "2024-05-28T20:09:53+02:00");
        assert_eq!(json["Battery"], "87%");
        assert!(json.get("Speed(km/h)").is_none());
    }

    #[test]
    fn test_missing_date_is_rejected() {
        let doc = serde_json::json!({"DeviceID": "a", "Latitude": 1.0, "Longitude": 2.0});
        assert!(serde_json::from_value::<DeviceReading>(doc).is_err());
    }

    #[test]
    fn test_history_row_projection_and_key() {
        let date = Timestamp::parse("2024-07-02T09:00:00+02:00").unwrap();
        let reading = DeviceReading::new("dev", date, 48.85, 2.35);
        let row = HistoryRow::from_reading(&reading);
        assert_eq!(row.latitude, 48.85);

        let same_instant = HistoryRow {
            date: Timestamp::parse("2024-07-02T07:00:00Z").unwrap(),
            latitude: 48.85,
            longitude: 2.35,
        };
        // Duplicates are exact on the written text, not on the instant.
        assert_ne!(row.dedup_key(), same_instant.dedup_key());
        assert_eq!(row.dedup_key(), row.clone().dedup_key());
    }
}
