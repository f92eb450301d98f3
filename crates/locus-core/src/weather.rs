//! OpenWeatherMap 5-day forecast client and normalisation.
//!
//! The API returns 3-hourly entries in Kelvin and m/s. [`parse_forecast`]
//! keeps the entries around the current day and converts them to °C and
//! km/h, together with the city metadata used in the notification.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime, UtcOffset};
use tracing::{debug, info};

use locus_types::{LocationMetadata, Timestamp, WeatherSample};

use crate::error::{Error, Result};
use crate::http::{build_client, decode_json, require};
use crate::traits::WeatherSource;

/// Default forecast endpoint.
pub const OPENWEATHER_API_URL: &str = "https://api.openweathermap.org/data/2.5/forecast";

/// How far before `now` forecast entries are kept.
pub const WINDOW_BEFORE: Duration = Duration::hours(1);
/// How far after `now` forecast entries are kept.
pub const WINDOW_AFTER: Duration = Duration::hours(16);

const SERVICE: &str = "OpenWeatherMap";
const KELVIN_OFFSET: f64 = 273.15;
const MS_TO_KMH: f64 = 3.6;

/// Forecast response as returned by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawForecast {
    pub list: Vec<RawEntry>,
    pub city: RawCity,
}

/// One 3-hour forecast entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEntry {
    /// Start of the interval, Unix seconds UTC.
    pub dt: i64,
    pub main: RawMain,
    #[serde(default)]
    pub weather: Vec<RawCondition>,
    pub clouds: RawClouds,
    pub wind: RawWind,
    /// Probability of precipitation, 0..1.
    #[serde(default)]
    pub pop: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rain: Option<RawVolume>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snow: Option<RawVolume>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMain {
    pub temp: f64,
    pub feels_like: f64,
    pub pressure: f64,
    pub humidity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawCondition {
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawClouds {
    pub all: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawWind {
    pub speed: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gust: Option<f64>,
    #[serde(default)]
    pub deg: f64,
}

/// Precipitation volume over the last 3 hours, in mm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawVolume {
    #[serde(rename = "3h", default)]
    pub three_hours: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawCity {
    pub name: String,
    #[serde(default)]
    pub country: String,
    /// Shift from UTC in seconds.
    pub timezone: i32,
    pub sunrise: i64,
    pub sunset: i64,
}

/// Normalised forecast for the coming day.
#[derive(Debug, Clone, PartialEq)]
pub struct Forecast {
    /// Samples within the window, timestamps in the city's offset.
    pub samples: Vec<WeatherSample>,
    pub metadata: LocationMetadata,
    /// The city's UTC offset.
    pub offset: UtcOffset,
}

/// Client for the OpenWeatherMap forecast API.
#[derive(Debug, Clone)]
pub struct OpenWeatherClient {
    client: Client,
    url: String,
    api_key: String,
}

impl OpenWeatherClient {
    pub fn new(api_key: &str) -> Result<Self> {
        Ok(Self {
            client: build_client()?,
            url: OPENWEATHER_API_URL.to_string(),
            api_key: require(api_key, "OPENWEATHERMAP_API_KEY")?,
        })
    }

    /// Point the client at a different endpoint.
    pub fn with_url(mut self, url: &str) -> Self {
        self.url = url.to_string();
        self
    }
}

#[async_trait]
impl WeatherSource for OpenWeatherClient {
    async fn forecast(&self, latitude: f64, longitude: f64) -> Result<RawForecast> {
        debug!("Requesting forecast for ({}, {})", latitude, longitude);

        let response = self
            .client
            .get(&self.url)
            .query(&[
                ("lat", latitude.to_string()),
                ("lon", longitude.to_string()),
                ("appid", self.api_key.clone()),
            ])
            .send()
            .await?;

        let forecast: RawForecast = decode_json(SERVICE, response).await?;
        info!(
            "Fetched {} forecast entries for {}",
            forecast.list.len(),
            forecast.city.name
        );
        Ok(forecast)
    }
}

/// Normalise a raw forecast around `now`.
///
/// Entries whose start lies in `[now - 1h, now + 16h]` are kept, in API
/// order. Missing gust, rain and snow values become 0.
pub fn parse_forecast(raw: &RawForecast, now: OffsetDateTime) -> Result<Forecast> {
    let offset = UtcOffset::from_whole_seconds(raw.city.timezone)
        .map_err(|e| Error::invalid(SERVICE, format!("bad timezone shift: {e}")))?;

    let start = now - WINDOW_BEFORE;
    let end = now + WINDOW_AFTER;

    let mut samples = Vec::new();
    for entry in &raw.list {
        let at = unix_to_datetime(entry.dt)?;
        if at < start || at > end {
            continue;
        }
        samples.push(normalise(entry, at.to_offset(offset)));
    }

    let metadata = LocationMetadata {
        name: raw.city.name.clone(),
        country: raw.city.country.clone(),
        timezone: f64::from(raw.city.timezone) / 3600.0,
        sunrise: Timestamp::from_datetime(unix_to_datetime(raw.city.sunrise)?.to_offset(offset))
            .to_string(),
        sunset: Timestamp::from_datetime(unix_to_datetime(raw.city.sunset)?.to_offset(offset))
            .to_string(),
    };

    debug!(
        "Kept {} of {} forecast entries",
        samples.len(),
        raw.list.len()
    );

    Ok(Forecast {
        samples,
        metadata,
        offset,
    })
}

fn normalise(entry: &RawEntry, timestamp: OffsetDateTime) -> WeatherSample {
    WeatherSample {
        timestamp,
        weather: entry
            .weather
            .first()
            .map(|w| w.description.clone())
            .unwrap_or_default(),
        temp: entry.main.temp - KELVIN_OFFSET,
        temp_feels_like: entry.main.feels_like - KELVIN_OFFSET,
        pressure: entry.main.pressure,
        humidity: entry.main.humidity,
        wind_speed: entry.wind.speed * MS_TO_KMH,
        wind_gust: entry.wind.gust.unwrap_or(0.0) * MS_TO_KMH,
        wind_direction: entry.wind.deg,
        prob_precip: (entry.pop * 100.0).round(),
        rain: entry.rain.as_ref().map_or(0.0, |v| v.three_hours),
        snow: entry.snow.as_ref().map_or(0.0, |v| v.three_hours),
        cloudiness: entry.clouds.all,
    }
}

fn unix_to_datetime(seconds: i64) -> Result<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp(seconds)
        .map_err(|e| Error::invalid(SERVICE, format!("bad timestamp {seconds}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::sample_forecast;
    use time::macros::datetime;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_parse_converts_units() {
        let now = datetime!(2024-05-28 04:00 UTC);
        let raw = sample_forecast(now, 1, 7200);
        let forecast = parse_forecast(&raw, now).unwrap();

        assert_eq!(forecast.samples.len(), 1);
        let sample = &forecast.samples[0];
        assert!((sample.temp - 15.0).abs() < 1e-9);
        assert!((sample.wind_speed - 18.0).abs() < 1e-9);
        assert_eq!(sample.prob_precip, 20.0);
        assert_eq!(sample.timestamp.offset(), UtcOffset::from_hms(2, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_defaults_missing_values() {
        let now = datetime!(2024-05-28 04:00 UTC);
        let mut raw = sample_forecast(now, 1, 0);
        raw.list[0].wind.gust = None;
        raw.list[0].rain = None;
        raw.list[0].snow = None;

        let sample = &parse_forecast(&raw, now).unwrap().samples[0];
        assert_eq!(sample.wind_gust, 0.0);
        assert_eq!(sample.rain, 0.0);
        assert_eq!(sample.snow, 0.0);
    }

    #[test]
    fn test_parse_keeps_window_only() {
        let now = datetime!(2024-05-28 04:00 UTC);
        // Entries every 3h from now - 6h.
        let mut raw = sample_forecast(now - Duration::hours(6), 10, 0);
        let forecast = parse_forecast(&raw, now).unwrap();
        // now-6h, now-3h dropped; now..now+15h kept (6 entries); now+18h..now+21h dropped.
        assert_eq!(forecast.samples.len(), 6);
        assert_eq!(forecast.samples[0].timestamp, now);

        // Window edges are inclusive.
        raw.list[0].dt = (now - WINDOW_BEFORE).unix_timestamp();
        raw.list[1].dt = (now + WINDOW_AFTER).unix_timestamp();
        let forecast = parse_forecast(&raw, now).unwrap();
        assert_eq!(forecast.samples.len(), 8);
    }

    #[test]
    fn test_parse_metadata() {
        let now = datetime!(2024-05-28 04:00 UTC);
        let raw = sample_forecast(now, 1, 7200);
        let metadata = parse_forecast(&raw, now).unwrap().metadata;

        assert_eq!(metadata.name, "Amsterdam");
        assert_eq!(metadata.country, "NL");
        assert_eq!(metadata.timezone, 2.0);
        assert!(metadata.sunrise.ends_with("+02:00"));
        assert!(metadata.sunset.ends_with("+02:00"));
    }

    #[test]
    fn test_deserialize_api_document() {
        let body = serde_json::json!({
            "cod": "200",
            "list": [{
                "dt": 1716868800,
                "main": {"temp": 290.0, "feels_like": 289.0, "pressure": 1012, "humidity": 70},
                "weather": [{"id": 500, "main": "Rain", "description": "light rain"}],
                "clouds": {"all": 75},
                "wind": {"speed": 4.1, "deg": 240},
                "pop": 0.4,
                "rain": {"3h": 0.25}
            }],
            "city": {
                "name": "Amsterdam", "country": "NL", "timezone": 7200,
                "sunrise": 1716866000, "sunset": 1716924000
            }
        });
        let raw: RawForecast = serde_json::from_value(body).unwrap();
        assert_eq!(raw.list[0].rain.as_ref().unwrap().three_hours, 0.25);
        assert!(raw.list[0].snow.is_none());
        assert!(raw.list[0].wind.gust.is_none());
    }

    #[tokio::test]
    async fn test_client_sends_coordinates_and_key() {
        let now = datetime!(2024-05-28 04:00 UTC);
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("lat", "52.37"))
            .and(query_param("lon", "4.89"))
            .and(query_param("appid", "owm-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(sample_forecast(now, 2, 0)))
            .expect(1)
            .mount(&server)
            .await;

        let client = OpenWeatherClient::new("owm-key").unwrap().with_url(&server.uri());
        let raw = client.forecast(52.37, 4.89).await.unwrap();
        assert_eq!(raw.list.len(), 2);
    }

    #[tokio::test]
    async fn test_client_rejects_malformed_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let client = OpenWeatherClient::new("key").unwrap().with_url(&server.uri());
        assert!(matches!(
            client.forecast(0.0, 0.0).await,
            Err(Error::InvalidResponse { .. })
        ));
    }
}
