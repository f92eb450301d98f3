//! ISO-8601 timestamps as reported by the tracking API.
//!
//! The tracking API reports local time with a UTC offset
//! (`2024-05-28T20:09:53+02:00`). The store keys readings by that exact text,
//! while every ordering decision is made on the UTC instant. [`Timestamp`]
//! keeps both.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::format_description::well_known::{Iso8601, Rfc3339};
use time::macros::format_description;
use time::{Date, OffsetDateTime, Time, UtcOffset};

use crate::error::{ParseError, ParseResult};

/// Text of the default watermark used before a device has stored anything.
pub const EPOCH: &str = "1970-01-01T00:00:00Z";

/// An instant with its original ISO-8601 text and UTC offset.
///
/// Equality and ordering compare the UTC instant only, so
/// `18:09:53+01:00` and `17:09:53+00:00` are equal.
#[derive(Debug, Clone)]
pub struct Timestamp {
    raw: String,
    instant: OffsetDateTime,
}

impl Timestamp {
    /// Parse an RFC 3339 / ISO-8601 timestamp carrying a UTC offset.
    pub fn parse(value: &str) -> ParseResult<Self> {
        let trimmed = value.trim();
        let instant = OffsetDateTime::parse(trimmed, &Rfc3339)
            .or_else(|_| OffsetDateTime::parse(trimmed, &Iso8601::DEFAULT))
            .map_err(|e| ParseError::InvalidTimestamp {
                value: value.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            raw: trimmed.to_string(),
            instant,
        })
    }

    /// The Unix epoch, used as the watermark of a device never seen before.
    pub fn epoch() -> Self {
        Self {
            raw: EPOCH.to_string(),
            instant: OffsetDateTime::UNIX_EPOCH,
        }
    }

    /// Build a timestamp from an instant, rendering it as RFC 3339.
    pub fn from_datetime(instant: OffsetDateTime) -> Self {
        let raw = instant
            .format(&Rfc3339)
            .unwrap_or_else(|_| instant.unix_timestamp().to_string());
        Self { raw, instant }
    }

    /// The original text, exactly as received.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The instant in its original offset.
    pub fn instant(&self) -> OffsetDateTime {
        self.instant
    }

    /// The UTC offset the timestamp was reported in.
    pub fn offset(&self) -> UtcOffset {
        self.instant.offset()
    }

    /// Seconds since the Unix epoch.
    pub fn unix_timestamp(&self) -> i64 {
        self.instant.unix_timestamp()
    }

    /// Calendar date in the timestamp's own offset.
    pub fn date(&self) -> Date {
        self.instant.date()
    }

    /// The same instant rendered in UTC (`2024-05-28T18:09:53Z`).
    pub fn to_utc_string(&self) -> String {
        self.instant
            .to_offset(UtcOffset::UTC)
            .format(&Rfc3339)
            .unwrap_or_else(|_| self.raw.clone())
    }

    /// Whether this timestamp is strictly after `other` in UTC.
    pub fn is_newer_than(&self, other: &Timestamp) -> bool {
        self.instant > other.instant
    }

    /// Human-friendly label, e.g. `2024 Jul 02 09:15:00AM`.
    pub fn display_label(&self) -> String {
        self.instant
            .format(format_description!(
                "[year] [month repr:short] [day] [hour repr:12]:[minute]:[second][period]"
            ))
            .unwrap_or_else(|_| self.raw.clone())
    }
}

impl PartialEq for Timestamp {
    fn eq(&self, other: &Self) -> bool {
        self.instant == other.instant
    }
}

impl Eq for Timestamp {}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.instant.cmp(&other.instant)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl std::str::FromStr for Timestamp {
    type Err = ParseError;

    fn from_str(s: &str) -> ParseResult<Self> {
        Self::parse(s)
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Timestamp::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Render a UTC offset as a short zone label (`UTC`, `UTC+2`, `UTC+5:30`).
pub fn offset_label(offset: UtcOffset) -> String {
    if offset.is_utc() {
        return "UTC".to_string();
    }
    let sign = if offset.is_negative() { '-' } else { '+' };
    let hours = offset.whole_hours().unsigned_abs();
    let minutes = offset.minutes_past_hour().unsigned_abs();
    if minutes == 0 {
        format!("UTC{sign}{hours}")
    } else {
        format!("UTC{sign}{hours}:{minutes:02}")
    }
}

/// Parse a `YYYY-MM-DD` calendar date.
pub fn parse_date(value: &str) -> ParseResult<Date> {
    Date::parse(value.trim(), format_description!("[year]-[month]-[day]"))
        .map_err(|_| ParseError::InvalidDate(value.to_string()))
}

/// Parse an `HH:MM` wall-clock time.
pub fn parse_time_of_day(value: &str) -> ParseResult<Time> {
    Time::parse(value.trim(), format_description!("[hour]:[minute]"))
        .map_err(|_| ParseError::InvalidTimeOfDay(value.to_string()))
}
