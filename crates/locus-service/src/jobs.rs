//! The two jobs: location ingestion and the daily weather notification.
//!
//! Both run the same way whether triggered by the scheduler, the HTTP entry
//! point or the `task` subcommand, and every run is recorded in
//! [`JobStats`](crate::state::JobStats).

use std::str::FromStr;

use serde_json::{Value, json};
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use locus_core::{NotifyStatus, compose_message, parse_forecast, weather_notification};
use locus_store::IngestReport;
use locus_types::offset_label;

use crate::state::AppState;

/// A job that can be triggered by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    /// Fetch and store the current location of every device.
    Location,
    /// Send the weather forecast for the tracked device's location.
    Weather,
}

impl Task {
    pub fn as_str(&self) -> &'static str {
        match self {
            Task::Location => "location",
            Task::Weather => "weather",
        }
    }
}

impl FromStr for Task {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "location" => Ok(Task::Location),
            "weather" => Ok(Task::Weather),
            other => Err(JobError::UnknownTask(other.to_string())),
        }
    }
}

impl std::fmt::Display for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a completed job.
#[derive(Debug, Clone)]
pub enum TaskOutcome {
    Location(IngestReport),
    /// Status reported by the push service.
    Weather(NotifyStatus),
}

impl TaskOutcome {
    /// JSON body reported to the caller.
    pub fn to_json(&self) -> Value {
        match self {
            TaskOutcome::Location(report) => json!({
                "status": "success",
                "stored": report.stored.len(),
                "skipped": report.skipped.len(),
                "timezone_changes": report
                    .timezone_changes
                    .iter()
                    .map(|change| json!({
                        "device_id": change.device_id,
                        "previous": offset_label(change.previous),
                        "current": offset_label(change.current),
                        "at": change.at.as_str(),
                    }))
                    .collect::<Vec<_>>(),
            }),
            TaskOutcome::Weather(status) => json!({ "status": status.as_str() }),
        }
    }
}

/// Job errors.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error(transparent)]
    Service(#[from] locus_core::Error),
    #[error(transparent)]
    Store(#[from] locus_store::Error),
    #[error("Unknown task: {0}")]
    UnknownTask(String),
    #[error("No device configured: set tracking.device_id or FOLLOWMEE_DEVICE_ID")]
    MissingDeviceId,
    #[error("No stored location for device {0}")]
    NoLocation(String),
    #[error("Failed to reschedule: {0}")]
    Reschedule(String),
}

/// Run a job and record the outcome.
pub async fn run_task(state: &AppState, task: Task) -> Result<TaskOutcome, JobError> {
    run_task_at(state, task, OffsetDateTime::now_utc()).await
}

pub(crate) async fn run_task_at(
    state: &AppState,
    task: Task,
    now: OffsetDateTime,
) -> Result<TaskOutcome, JobError> {
    debug!("Running {} job", task);

    let result = match task {
        Task::Location => run_location(state).await.map(TaskOutcome::Location),
        Task::Weather => run_weather(state, now).await.map(TaskOutcome::Weather),
    };

    let mut jobs = state.jobs.write().await;
    let status = match task {
        Task::Location => &mut jobs.location,
        Task::Weather => &mut jobs.weather,
    };
    match &result {
        Ok(_) => status.record_success(now),
        Err(e) => status.record_failure(now, e.to_string()),
    }

    result
}

/// Fetch current locations and store the newer ones.
///
/// Timezone changes are handed to the rescheduler; a rescheduling failure
/// is logged and does not fail the job.
async fn run_location(state: &AppState) -> Result<IngestReport, JobError> {
    let locations = state.services.location.current_locations().await?;
    debug!("Fetched {} device location(s)", locations.len());

    let report = {
        let store = state.store.lock().await;
        store.store_locations(&locations)?
    };

    for change in &report.timezone_changes {
        if let Err(e) = state.rescheduler.reschedule(change).await {
            warn!("Failed to reschedule after {}: {}", change, e);
        }
    }

    info!(
        "Location job stored {} and skipped {} reading(s)",
        report.stored.len(),
        report.skipped.len()
    );
    Ok(report)
}

/// Send the forecast for the tracked device's latest location.
async fn run_weather(state: &AppState, now: OffsetDateTime) -> Result<NotifyStatus, JobError> {
    let (device_id, use_llm) = {
        let config = state.config.read().await;
        (config.tracking.device_id.clone(), config.weather.use_llm)
    };
    let device_id = device_id.ok_or(JobError::MissingDeviceId)?;

    let reading = {
        let store = state.store.lock().await;
        store.latest_location(&device_id)?
    }
    .ok_or_else(|| JobError::NoLocation(device_id.clone()))?;

    info!(
        "Requesting forecast for {:.4}, {:.4}",
        reading.latitude, reading.longitude
    );
    let raw = state
        .services
        .weather
        .forecast(reading.latitude, reading.longitude)
        .await?;
    let forecast = parse_forecast(&raw, now)?;

    let message = compose_message(&forecast, state.services.text.as_ref(), use_llm).await?;
    let notification = weather_notification(&forecast.metadata.name, &message);
    let status = state.services.notifier.send(&notification).await?;

    info!("Weather notification: {}", status.as_str());
    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use locus_core::mock::sample_forecast;
    use locus_store::{Store, TimezoneChange};
    use locus_types::{DeviceReading, Timestamp};
    use time::macros::datetime;
    use tokio::sync::Mutex;

    use crate::config::Config;
    use crate::scheduler::Rescheduler;
    use crate::testing::{Mocks, mock_services};

    fn reading(device: &str, date: &str) -> DeviceReading {
        DeviceReading::new(device, Timestamp::parse(date).unwrap(), 52.37, 4.89)
    }

    fn tracked_config() -> Config {
        let mut config = Config::default();
        config.tracking.device_id = Some("42".to_string());
        config
    }

    fn create_state(config: Config) -> (Arc<AppState>, Mocks) {
        let (services, mocks) = mock_services();
        let state = AppState::new(Store::open_in_memory().unwrap(), config, services);
        (state, mocks)
    }

    #[derive(Default)]
    struct RecordingRescheduler {
        changes: Mutex<Vec<TimezoneChange>>,
        fail: bool,
    }

    #[async_trait]
    impl Rescheduler for RecordingRescheduler {
        async fn reschedule(&self, change: &TimezoneChange) -> Result<(), JobError> {
            self.changes.lock().await.push(change.clone());
            if self.fail {
                return Err(JobError::Reschedule("scheduler unavailable".to_string()));
            }
            Ok(())
        }
    }

    #[test]
    fn test_task_from_str() {
        assert_eq!("location".parse::<Task>().unwrap(), Task::Location);
        assert_eq!("weather".parse::<Task>().unwrap(), Task::Weather);

        let err = "Weather".parse::<Task>().unwrap_err();
        assert_eq!(err.to_string(), "Unknown task: Weather");
    }

    #[tokio::test]
    async fn test_location_job_stores_newer_readings() {
        let (state, mocks) = create_state(Config::default());
        mocks
            .location
            .set_reading(reading("42", "2024-05-28T18:09:53+00:00"))
            .await;

        let outcome = run_task(&state, Task::Location).await.unwrap();
        let json = outcome.to_json();
        assert_eq!(json["status"], "success");
        assert_eq!(json["stored"], 1);
        assert_eq!(json["skipped"], 0);

        // Same reading again is skipped
        let json = run_task(&state, Task::Location).await.unwrap().to_json();
        assert_eq!(json["stored"], 0);
        assert_eq!(json["skipped"], 1);

        let jobs = state.jobs.read().await;
        assert_eq!(jobs.location.runs, 2);
        assert_eq!(jobs.location.failures, 0);
    }

    #[tokio::test]
    async fn test_location_job_reports_timezone_change() {
        let (services, mocks) = mock_services();
        let rescheduler = Arc::new(RecordingRescheduler::default());
        let state = AppState::with_rescheduler(
            Store::open_in_memory().unwrap(),
            Config::default(),
            services,
            rescheduler.clone(),
        );

        mocks
            .location
            .set_reading(reading("42", "2024-05-28T20:09:53+02:00"))
            .await;
        let json = run_task(&state, Task::Location).await.unwrap().to_json();

        let changes = &json["timezone_changes"];
        assert_eq!(changes[0]["device_id"], "42");
        assert_eq!(changes[0]["previous"], "UTC");
        assert_eq!(changes[0]["current"], "UTC+2");
        assert_eq!(rescheduler.changes.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_reschedule_failure_does_not_fail_job() {
        let (services, mocks) = mock_services();
        let rescheduler = Arc::new(RecordingRescheduler {
            fail: true,
            ..Default::default()
        });
        let state = AppState::with_rescheduler(
            Store::open_in_memory().unwrap(),
            Config::default(),
            services,
            rescheduler,
        );

        mocks
            .location
            .set_reading(reading("42", "2024-05-28T20:09:53+02:00"))
            .await;
        let outcome = run_task(&state, Task::Location).await.unwrap();
        assert_eq!(outcome.to_json()["stored"], 1);
    }

    #[tokio::test]
    async fn test_location_job_failure_is_recorded() {
        let (state, mocks) = create_state(Config::default());
        mocks.location.set_should_fail(true);

        assert!(run_task(&state, Task::Location).await.is_err());

        let jobs = state.jobs.read().await;
        assert_eq!(jobs.location.consecutive_failures, 1);
        assert!(jobs.location.last_error.is_some());
    }

    #[tokio::test]
    async fn test_weather_job_sends_advice() {
        let now = datetime!(2024-05-28 04:00 UTC);
        let (state, mocks) = create_state(tracked_config());
        mocks
            .location
            .set_reading(reading("42", "2024-05-28T05:30:00+02:00"))
            .await;
        run_task_at(&state, Task::Location, now).await.unwrap();

        let outcome = run_task_at(&state, Task::Weather, now).await.unwrap();
        assert_eq!(outcome.to_json(), json!({ "status": "success" }));

        assert_eq!(mocks.weather.requests().await, vec![(52.37, 4.89)]);
        let prompts = mocks.text.prompts().await;
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].starts_with("It is 6am."));

        let sent = mocks.notifier.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].title, "Weather Forecast");
        assert_eq!(sent[0].message, "Amsterdam Weather:\n- Bring an umbrella.");
    }

    #[tokio::test]
    async fn test_weather_job_without_llm() {
        let now = datetime!(2024-05-28 04:00 UTC);
        let mut config = tracked_config();
        config.weather.use_llm = false;
        let (state, mocks) = create_state(config);
        mocks
            .location
            .set_reading(reading("42", "2024-05-28T05:30:00+02:00"))
            .await;
        run_task_at(&state, Task::Location, now).await.unwrap();

        run_task_at(&state, Task::Weather, now).await.unwrap();

        assert!(mocks.text.prompts().await.is_empty());
        let sent = mocks.notifier.sent().await;
        assert!(
            sent[0]
                .message
                .starts_with("Amsterdam Weather:\nHere is the weather forecast for Amsterdam, NL:")
        );
    }

    #[tokio::test]
    async fn test_weather_job_reports_push_failure() {
        let now = datetime!(2024-05-28 04:00 UTC);
        let (state, mocks) = create_state(tracked_config());
        mocks
            .location
            .set_reading(reading("42", "2024-05-28T05:30:00+02:00"))
            .await;
        run_task_at(&state, Task::Location, now).await.unwrap();
        mocks.notifier.set_status(NotifyStatus::Failure).await;

        let outcome = run_task_at(&state, Task::Weather, now).await.unwrap();
        assert_eq!(outcome.to_json()["status"], "failure");
    }

    #[tokio::test]
    async fn test_weather_job_requires_device() {
        let (state, _mocks) = create_state(Config::default());
        let err = run_task(&state, Task::Weather).await.unwrap_err();
        assert!(matches!(err, JobError::MissingDeviceId));
    }

    #[tokio::test]
    async fn test_weather_job_requires_location() {
        let (state, _mocks) = create_state(tracked_config());
        let err = run_task(&state, Task::Weather).await.unwrap_err();
        assert!(matches!(err, JobError::NoLocation(ref id) if id == "42"));

        let jobs = state.jobs.read().await;
        assert_eq!(jobs.weather.failures, 1);
    }

    #[tokio::test]
    async fn test_weather_job_forecast_failure() {
        let now = datetime!(2024-05-28 04:00 UTC);
        let (state, mocks) = create_state(tracked_config());
        mocks
            .location
            .set_reading(reading("42", "2024-05-28T05:30:00+02:00"))
            .await;
        run_task_at(&state, Task::Location, now).await.unwrap();
        mocks.weather.set_should_fail(true);

        let err = run_task_at(&state, Task::Weather, now).await.unwrap_err();
        assert!(matches!(err, JobError::Service(_)));
        assert!(mocks.notifier.sent().await.is_empty());
    }

    #[test]
    fn test_sample_forecast_fits_window() {
        let now = datetime!(2024-05-28 04:00 UTC);
        let forecast = parse_forecast(&sample_forecast(now, 8, 7200), now).unwrap();
        assert_eq!(forecast.samples.len(), 6);
    }
}
