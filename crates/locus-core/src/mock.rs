//! Mock service implementations for testing.
//!
//! Each mock implements one of the service traits in [`crate::traits`] and
//! records what it was asked, so jobs can be exercised without network
//! access.
//!
//! # Features
//!
//! - **Failure injection**: every mock can be switched to return an error
//! - **Latency simulation**: the location source can be made slow
//! - **Call recording**: requests, prompts and notifications are kept for assertions

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use async_trait::async_trait;
use time::{Duration, OffsetDateTime};
use tokio::sync::RwLock;

use locus_types::DeviceReading;

use crate::error::{Error, Result};
use crate::traits::{
    LocationSource, Notification, Notifier, NotifyStatus, TextGenerator, WeatherSource,
};
use crate::weather::{
    RawCity, RawClouds, RawCondition, RawEntry, RawForecast, RawMain, RawVolume, RawWind,
};

/// A forecast document with `count` 3-hourly entries starting at `start`.
///
/// Every entry reads 15 °C (feels like 14 °C), light rain, 5 m/s wind with
/// 7 m/s gusts from 240°, 20% precipitation probability and 0.5 mm rain.
/// The city is Amsterdam, NL, shifted `timezone` seconds from UTC.
pub fn sample_forecast(start: OffsetDateTime, count: usize, timezone: i32) -> RawForecast {
    let list = (0..count)
        .map(|i| RawEntry {
            dt: (start + Duration::hours(3 * i as i64)).unix_timestamp(),
            main: RawMain {
                temp: 288.15,
                feels_like: 287.15,
                pressure: 1012.0,
                humidity: 70.0,
            },
            weather: vec![RawCondition {
                description: "light rain".to_string(),
            }],
            clouds: RawClouds { all: 75.0 },
            wind: RawWind {
                speed: 5.0,
                gust: Some(7.0),
                deg: 240.0,
            },
            pop: 0.2,
            rain: Some(RawVolume { three_hours: 0.5 }),
            snow: None,
        })
        .collect();

    RawForecast {
        list,
        city: RawCity {
            name: "Amsterdam".to_string(),
            country: "NL".to_string(),
            timezone,
            sunrise: (start - Duration::hours(1)).unix_timestamp(),
            sunset: (start + Duration::hours(15)).unix_timestamp(),
        },
    }
}

/// In-memory [`LocationSource`].
#[derive(Debug, Default)]
pub struct MockLocationSource {
    readings: RwLock<BTreeMap<String, DeviceReading>>,
    call_count: AtomicU32,
    should_fail: AtomicBool,
    /// Simulated latency in milliseconds (0 = no delay).
    latency_ms: AtomicU64,
}

impl MockLocationSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the reading reported for a device.
    pub async fn set_reading(&self, reading: DeviceReading) {
        self.readings
            .write()
            .await
            .insert(reading.device_id.clone(), reading);
    }

    pub fn set_should_fail(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::Relaxed);
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    pub fn set_latency(&self, latency: std::time::Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }
}

#[async_trait]
impl LocationSource for MockLocationSource {
    async fn current_locations(&self) -> Result<BTreeMap<String, DeviceReading>> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        let latency = self.latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(latency)).await;
        }
        if self.should_fail.load(Ordering::Relaxed) {
            return Err(Error::Mock("location source unavailable".to_string()));
        }
        Ok(self.readings.read().await.clone())
    }
}

/// In-memory [`WeatherSource`] returning a fixed forecast.
#[derive(Debug)]
pub struct MockWeatherSource {
    forecast: RwLock<RawForecast>,
    requests: RwLock<Vec<(f64, f64)>>,
    should_fail: AtomicBool,
}

impl MockWeatherSource {
    pub fn new(forecast: RawForecast) -> Self {
        Self {
            forecast: RwLock::new(forecast),
            requests: RwLock::new(Vec::new()),
            should_fail: AtomicBool::new(false),
        }
    }

    pub fn set_should_fail(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::Relaxed);
    }

    /// Coordinates requested so far.
    pub async fn requests(&self) -> Vec<(f64, f64)> {
        self.requests.read().await.clone()
    }
}

#[async_trait]
impl WeatherSource for MockWeatherSource {
    async fn forecast(&self, latitude: f64, longitude: f64) -> Result<RawForecast> {
        self.requests.write().await.push((latitude, longitude));
        if self.should_fail.load(Ordering::Relaxed) {
            return Err(Error::Mock("forecast unavailable".to_string()));
        }
        Ok(self.forecast.read().await.clone())
    }
}

/// [`TextGenerator`] that always answers with the same reply.
#[derive(Debug)]
pub struct MockTextGenerator {
    reply: String,
    prompts: RwLock<Vec<String>>,
    should_fail: AtomicBool,
}

impl MockTextGenerator {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            prompts: RwLock::new(Vec::new()),
            should_fail: AtomicBool::new(false),
        }
    }

    pub fn set_should_fail(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::Relaxed);
    }

    /// Prompts received so far.
    pub async fn prompts(&self) -> Vec<String> {
        self.prompts.read().await.clone()
    }
}

#[async_trait]
impl TextGenerator for MockTextGenerator {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts.write().await.push(prompt.to_string());
        if self.should_fail.load(Ordering::Relaxed) {
            return Err(Error::Mock("text generation unavailable".to_string()));
        }
        Ok(self.reply.clone())
    }
}

/// [`Notifier`] that records notifications and answers with a fixed status.
#[derive(Debug)]
pub struct MockNotifier {
    status: RwLock<NotifyStatus>,
    sent: RwLock<Vec<Notification>>,
}

impl Default for MockNotifier {
    fn default() -> Self {
        Self {
            status: RwLock::new(NotifyStatus::Success),
            sent: RwLock::new(Vec::new()),
        }
    }
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Status returned by subsequent sends.
    pub async fn set_status(&self, status: NotifyStatus) {
        *self.status.write().await = status;
    }

    pub async fn sent(&self) -> Vec<Notification> {
        self.sent.read().await.clone()
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn send(&self, notification: &Notification) -> Result<NotifyStatus> {
        self.sent.write().await.push(notification.clone());
        Ok(*self.status.read().await)
    }
}
