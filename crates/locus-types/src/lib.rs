//! Shared types for the Locus location tracker.
//!
//! This crate provides the data model used by the fetchers, the store and the
//! service:
//!
//! - [`Timestamp`]: an ISO-8601 instant that remembers its original text and
//!   UTC offset, compared in UTC
//! - [`DeviceReading`]: one location sample reported by the tracking API
//! - [`HistoryRow`]: the flat `Date,Latitude,Longitude` projection used for
//!   exports and the map viewer
//! - [`WeatherSample`] and [`LocationMetadata`]: a normalised forecast
//!
//! # Example
//!
//! ```
//! use locus_types::Timestamp;
//!
//! let watermark = Timestamp::parse("2024-05-28T18:09:53+00:00")?;
//! let incoming = Timestamp::parse("2024-05-28T18:09:53+01:00")?;
//!
//! // One hour earlier once normalised to UTC.
//! assert!(!incoming.is_newer_than(&watermark));
//! # Ok::<(), locus_types::ParseError>(())
//! ```

pub mod error;
pub mod timestamp;
pub mod types;
pub mod weather;

pub use error::{ParseError, ParseResult};
pub use timestamp::{Timestamp, offset_label, parse_date, parse_time_of_day};
pub use types::{DeviceReading, HistoryRow};
pub use weather::{LocationMetadata, WeatherSample};
