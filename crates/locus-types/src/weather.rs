//! Normalised forecast types.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// One forecast interval, in metric units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSample {
    /// Start of the forecast interval.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    /// Condition text (e.g. "light rain").
    pub weather: String,
    /// Temperature in °C.
    pub temp: f64,
    /// Perceived temperature in °C.
    pub temp_feels_like: f64,
    /// Pressure in hPa.
    pub pressure: f64,
    /// Relative humidity in %.
    pub humidity: f64,
    /// Wind speed in km/h.
    pub wind_speed: f64,
    /// Wind gust in km/h.
    pub wind_gust: f64,
    /// Wind direction in degrees.
    pub wind_direction: f64,
    /// Probability of precipitation in %.
    pub prob_precip: f64,
    /// Rain volume over the interval in mm.
    pub rain: f64,
    /// Snow volume over the interval in mm.
    pub snow: f64,
    /// Cloudiness in %.
    pub cloudiness: f64,
}

/// Where a forecast applies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationMetadata {
    /// City name.
    pub name: String,
    /// Country code.
    pub country: String,
    /// UTC offset in hours.
    pub timezone: f64,
    /// Sunrise, ISO-8601 in the city's offset.
    pub sunrise: String,
    /// Sunset, ISO-8601 in the city's offset.
    pub sunset: String,
}
