//! Application state shared across handlers and background jobs.
//!
//! The store sits behind a `Mutex`, so two job invocations in the same
//! process never interleave their watermark reads and writes.
//!
//! The UTC offset of the daily weather run is published on a `watch`
//! channel. Ingestion pushes the new offset through the [`Rescheduler`]
//! when the tracked device changes timezone, and the scheduler's weather
//! loop wakes up and recomputes its next run.

use std::sync::Arc;

use serde::Serialize;
use time::{OffsetDateTime, UtcOffset};
use tokio::sync::{Mutex, RwLock, watch};
use tracing::{info, warn};

use locus_store::Store;

use crate::config::Config;
use crate::scheduler::{OffsetRescheduler, Rescheduler};
use crate::services::Services;

/// Shared application state.
pub struct AppState {
    /// The location store.
    pub store: Mutex<Store>,
    /// Configuration (RwLock for runtime updates).
    pub config: RwLock<Config>,
    /// External service clients.
    pub services: Services,
    /// Receives timezone changes detected during ingestion.
    pub rescheduler: Arc<dyn Rescheduler>,
    /// UTC offset the weather job is scheduled in.
    pub weather_offset: Arc<watch::Sender<UtcOffset>>,
    /// Job run statistics.
    pub jobs: RwLock<JobStats>,
}

impl AppState {
    /// Create new application state.
    ///
    /// The weather offset starts at the offset of the tracked device's
    /// watermark, or UTC when there is none.
    pub fn new(store: Store, config: Config, services: Services) -> Arc<Self> {
        let offset = initial_offset(&store, config.tracking.device_id.as_deref());
        let weather_offset = Arc::new(watch::Sender::new(offset));
        let rescheduler = Arc::new(OffsetRescheduler::new(
            Arc::clone(&weather_offset),
            config.tracking.device_id.clone(),
        ));
        Self::build(store, config, services, rescheduler, weather_offset)
    }

    /// Create state with a custom rescheduler.
    pub fn with_rescheduler(
        store: Store,
        config: Config,
        services: Services,
        rescheduler: Arc<dyn Rescheduler>,
    ) -> Arc<Self> {
        let offset = initial_offset(&store, config.tracking.device_id.as_deref());
        let weather_offset = Arc::new(watch::Sender::new(offset));
        Self::build(store, config, services, rescheduler, weather_offset)
    }

    fn build(
        store: Store,
        config: Config,
        services: Services,
        rescheduler: Arc<dyn Rescheduler>,
        weather_offset: Arc<watch::Sender<UtcOffset>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            store: Mutex::new(store),
            config: RwLock::new(config),
            services,
            rescheduler,
            weather_offset,
            jobs: RwLock::new(JobStats::default()),
        })
    }

    /// Subscribe to weather offset updates.
    pub fn subscribe_offset(&self) -> watch::Receiver<UtcOffset> {
        self.weather_offset.subscribe()
    }

    /// The tracked device, if one is configured.
    pub async fn device_id(&self) -> Option<String> {
        self.config.read().await.tracking.device_id.clone()
    }
}

fn initial_offset(store: &Store, device_id: Option<&str>) -> UtcOffset {
    let Some(device_id) = device_id else {
        return UtcOffset::UTC;
    };
    match store.watermark(device_id) {
        Ok(watermark) => {
            info!(
                "Scheduling weather for device {} in {}",
                device_id,
                locus_types::offset_label(watermark.offset())
            );
            watermark.offset()
        }
        Err(e) => {
            warn!("Failed to read watermark of {}: {}", device_id, e);
            UtcOffset::UTC
        }
    }
}

/// Run statistics of a single job.
#[derive(Debug, Clone, Default, Serialize)]
pub struct JobStatus {
    /// Total runs.
    pub runs: u64,
    /// Total failed runs.
    pub failures: u64,
    /// Failures since the last success.
    pub consecutive_failures: u32,
    /// Time of the last successful run.
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_success: Option<OffsetDateTime>,
    /// Time of the last failed run.
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_failure: Option<OffsetDateTime>,
    /// Last error message.
    pub last_error: Option<String>,
}

impl JobStatus {
    pub fn record_success(&mut self, at: OffsetDateTime) {
        self.runs += 1;
        self.consecutive_failures = 0;
        self.last_success = Some(at);
    }

    pub fn record_failure(&mut self, at: OffsetDateTime, error: String) {
        self.runs += 1;
        self.failures += 1;
        self.consecutive_failures += 1;
        self.last_failure = Some(at);
        self.last_error = Some(error);
    }
}

/// Statistics of both jobs.
#[derive(Debug, Clone, Default, Serialize)]
pub struct JobStats {
    pub location: JobStatus,
    pub weather: JobStatus,
    /// When the scheduler will next run the weather job.
    #[serde(with = "time::serde::rfc3339::option")]
    pub next_weather_run: Option<OffsetDateTime>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use locus_types::{DeviceReading, Timestamp};
    use std::collections::BTreeMap;
    use time::macros::{datetime, offset};

    use crate::testing::mock_services;

    #[tokio::test]
    async fn test_app_state_new() {
        let store = Store::open_in_memory().unwrap();
        let state = AppState::new(store, Config::default(), mock_services().0);

        assert_eq!(*state.subscribe_offset().borrow(), UtcOffset::UTC);
        assert!(state.device_id().await.is_none());

        let jobs = state.jobs.read().await;
        assert_eq!(jobs.location.runs, 0);
        assert!(jobs.next_weather_run.is_none());
    }

    #[tokio::test]
    async fn test_initial_offset_from_watermark() {
        let store = Store::open_in_memory().unwrap();
        let reading = DeviceReading::new(
            "42",
            Timestamp::parse("2024-05-28T20:09:53+02:00").unwrap(),
            52.37,
            4.89,
        );
        store
            .store_locations(&BTreeMap::from([("42".to_string(), reading)]))
            .unwrap();

        let mut config = Config::default();
        config.tracking.device_id = Some("42".to_string());
        let state = AppState::new(store, config, mock_services().0);

        assert_eq!(*state.subscribe_offset().borrow(), offset!(+2));
    }

    #[test]
    fn test_job_status_counters() {
        let mut status = JobStatus::default();
        let at = datetime!(2024-05-28 06:00 UTC);

        status.record_failure(at, "boom".to_string());
        status.record_failure(at, "boom".to_string());
        assert_eq!(status.consecutive_failures, 2);
        assert_eq!(status.failures, 2);

        status.record_success(at);
        assert_eq!(status.runs, 3);
        assert_eq!(status.consecutive_failures, 0);
        assert_eq!(status.last_success, Some(at));
        assert_eq!(status.last_error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_job_stats_serialize() {
        let stats = JobStats {
            next_weather_run: Some(datetime!(2024-05-29 05:58 +02:00)),
            ..Default::default()
        };
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["next_weather_run"], "2024-05-29T05:58:00+02:00");
        assert_eq!(json["location"]["runs"], 0);
        assert!(json["weather"]["last_success"].is_null());
    }
}
