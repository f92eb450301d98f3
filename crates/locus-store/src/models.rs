//! Data models for stored data.

use serde::Serialize;
use time::{OffsetDateTime, UtcOffset};

use locus_types::{DeviceReading, Timestamp, offset_label};

/// A reading as persisted in the database.
#[derive(Debug, Clone, Serialize)]
pub struct StoredLocation {
    /// Device the reading belongs to.
    pub device_id: String,
    /// The reading document.
    pub reading: DeviceReading,
    /// When the reading was written locally.
    #[serde(with = "time::serde::rfc3339")]
    pub stored_at: OffsetDateTime,
}

/// Per-device overview.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceSummary {
    pub device_id: String,
    /// Number of stored readings.
    pub readings: u64,
    /// Current watermark, if the device was ever ingested.
    pub last_updated_time: Option<Timestamp>,
}

/// A newer reading arrived in a different UTC offset than the watermark.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimezoneChange {
    pub device_id: String,
    pub previous: UtcOffset,
    pub current: UtcOffset,
    /// The reading that carried the new offset.
    pub at: Timestamp,
}

impl std::fmt::Display for TimezoneChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "device {} moved from {} to {}",
            self.device_id,
            offset_label(self.previous),
            offset_label(self.current)
        )
    }
}

/// Outcome of [`Store::store_locations`](crate::Store::store_locations).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestReport {
    /// Devices whose reading was persisted.
    pub stored: Vec<String>,
    /// Devices whose reading was not newer than the watermark.
    pub skipped: Vec<String>,
    /// Offset transitions detected among the stored readings.
    pub timezone_changes: Vec<TimezoneChange>,
}
