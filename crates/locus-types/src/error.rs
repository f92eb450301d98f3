//! Error types for data parsing in locus-types.

use thiserror::Error;

/// Errors that can occur when parsing tracker or forecast data.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// A timestamp was not valid ISO-8601 / RFC 3339.
    #[error("Invalid timestamp '{value}': {reason}")]
    InvalidTimestamp { value: String, reason: String },

    /// A wall-clock time (e.g. `05:58`) could not be parsed.
    #[error("Invalid time of day '{0}': expected HH:MM")]
    InvalidTimeOfDay(String),

    /// A calendar date (e.g. `2024-07-02`) could not be parsed.
    #[error("Invalid date '{0}': expected YYYY-MM-DD")]
    InvalidDate(String),
}

/// Result type alias using locus-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
