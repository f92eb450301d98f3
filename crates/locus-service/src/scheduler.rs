//! Background scheduler.
//!
//! Two loops run on the tokio runtime:
//!
//! - the location job, every `tracking.poll_interval` seconds;
//! - the weather job, once a day at `weather.at` in the tracked device's
//!   current UTC offset. A timezone change reported by ingestion moves the
//!   next run without waiting for the current sleep to finish.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use time::{OffsetDateTime, Time, UtcOffset};
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

use locus_store::TimezoneChange;
use locus_types::{offset_label, parse_time_of_day};

use crate::jobs::{JobError, Task, run_task};
use crate::state::AppState;

/// Receives timezone changes detected while storing locations.
#[async_trait]
pub trait Rescheduler: Send + Sync {
    async fn reschedule(&self, change: &TimezoneChange) -> Result<(), JobError>;
}

/// Moves the daily weather run to the tracked device's new offset.
pub struct OffsetRescheduler {
    tx: Arc<watch::Sender<UtcOffset>>,
    device_id: Option<String>,
}

impl OffsetRescheduler {
    pub fn new(tx: Arc<watch::Sender<UtcOffset>>, device_id: Option<String>) -> Self {
        Self { tx, device_id }
    }
}

#[async_trait]
impl Rescheduler for OffsetRescheduler {
    async fn reschedule(&self, change: &TimezoneChange) -> Result<(), JobError> {
        if self.device_id.as_deref() != Some(change.device_id.as_str()) {
            debug!("Ignoring timezone change of untracked device {}", change.device_id);
            return Ok(());
        }

        let previous = self.tx.send_replace(change.current);
        if previous != change.current {
            info!(
                "Weather notification moved from {} to {}",
                offset_label(previous),
                offset_label(change.current)
            );
        }
        Ok(())
    }
}

/// Next occurrence of `at` in `offset`, strictly after `now`.
pub fn next_weather_run(now: OffsetDateTime, at: Time, offset: UtcOffset) -> OffsetDateTime {
    let local = now.to_offset(offset);
    let today = local.replace_time(at);
    if today > local {
        today
    } else {
        today + time::Duration::days(1)
    }
}

/// Runs the jobs in the background.
pub struct Scheduler {
    state: Arc<AppState>,
}

impl Scheduler {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Spawn the enabled job loops and return immediately.
    pub async fn start(&self) {
        let config = self.state.config.read().await.clone();

        if config.tracking.enabled {
            info!(
                "Starting location job (interval: {}s)",
                config.tracking.poll_interval
            );
            let state = Arc::clone(&self.state);
            let period = Duration::from_secs(config.tracking.poll_interval);
            tokio::spawn(async move {
                location_loop(state, period).await;
            });
        } else {
            info!("Location job disabled");
        }

        if !config.weather.enabled {
            info!("Weather job disabled");
            return;
        }
        match parse_time_of_day(&config.weather.at) {
            Ok(at) => {
                info!("Starting weather job (daily at {})", config.weather.at);
                let state = Arc::clone(&self.state);
                tokio::spawn(async move {
                    weather_loop(state, at).await;
                });
            }
            Err(e) => error!("Weather job not started: {}", e),
        }
    }
}

async fn location_loop(state: Arc<AppState>, period: Duration) {
    let mut interval_timer = interval(period);
    // A slow poll pushes the next one back instead of firing a burst.
    interval_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut consecutive_failures = 0u32;

    loop {
        interval_timer.tick().await;

        match run_task(&state, Task::Location).await {
            Ok(_) => consecutive_failures = 0,
            Err(e) => {
                consecutive_failures += 1;
                if consecutive_failures <= 3 {
                    warn!(
                        "Location job failed: {} (attempt {})",
                        e, consecutive_failures
                    );
                } else if consecutive_failures == 4 {
                    error!(
                        "Location job failed {} times in a row, will keep trying silently",
                        consecutive_failures
                    );
                }
            }
        }
    }
}

async fn weather_loop(state: Arc<AppState>, at: Time) {
    let mut offset_rx = state.subscribe_offset();
    let mut offset_open = true;

    loop {
        let offset = *offset_rx.borrow_and_update();
        let now = OffsetDateTime::now_utc();
        let next = next_weather_run(now, at, offset);
        state.jobs.write().await.next_weather_run = Some(next);
        info!("Next weather notification at {}", next);

        let wait = Duration::try_from(next - now).unwrap_or_default();
        tokio::select! {
            _ = tokio::time::sleep(wait) => {
                match run_task(&state, Task::Weather).await {
                    Ok(outcome) => debug!("Weather job finished: {}", outcome.to_json()),
                    Err(e) => error!("Weather job failed: {}", e),
                }
            }
            changed = offset_rx.changed(), if offset_open => {
                if changed.is_err() {
                    offset_open = false;
                } else {
                    debug!("Weather offset changed, recomputing next run");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use locus_store::Store;
    use locus_types::Timestamp;
    use time::macros::{datetime, offset, time};

    use crate::config::Config;
    use crate::testing::mock_services;

    fn change(device: &str, current: UtcOffset) -> TimezoneChange {
        TimezoneChange {
            device_id: device.to_string(),
            previous: UtcOffset::UTC,
            current,
            at: Timestamp::parse("2024-05-28T20:09:53+02:00").unwrap(),
        }
    }

    #[test]
    fn test_next_weather_run_later_today() {
        let next = next_weather_run(
            datetime!(2024-05-28 02:00 UTC),
            time!(05:58),
            offset!(+2),
        );
        assert_eq!(next, datetime!(2024-05-28 05:58 +02:00));
    }

    #[test]
    fn test_next_weather_run_tomorrow() {
        let next = next_weather_run(
            datetime!(2024-05-28 04:00 UTC),
            time!(05:58),
            offset!(+2),
        );
        assert_eq!(next, datetime!(2024-05-29 05:58 +02:00));
    }

    #[test]
    fn test_next_weather_run_exact_time_moves_to_tomorrow() {
        let next = next_weather_run(datetime!(2024-05-28 05:58 UTC), time!(05:58), UtcOffset::UTC);
        assert_eq!(next, datetime!(2024-05-29 05:58 UTC));
    }

    #[test]
    fn test_next_weather_run_crosses_date_line() {
        // 20:00 UTC is already the next morning's 09:00 in UTC+13
        let next = next_weather_run(
            datetime!(2024-05-28 20:00 UTC),
            time!(05:58),
            offset!(+13),
        );
        assert_eq!(next, datetime!(2024-05-30 05:58 +13:00));
        assert_eq!(next.offset(), offset!(+13));
    }

    #[tokio::test]
    async fn test_offset_rescheduler_tracks_device() {
        let tx = Arc::new(watch::Sender::new(UtcOffset::UTC));
        let rx = tx.subscribe();
        let rescheduler = OffsetRescheduler::new(Arc::clone(&tx), Some("42".to_string()));

        rescheduler.reschedule(&change("7", offset!(+9))).await.unwrap();
        assert_eq!(*rx.borrow(), UtcOffset::UTC);

        rescheduler.reschedule(&change("42", offset!(+2))).await.unwrap();
        assert_eq!(*rx.borrow(), offset!(+2));
    }

    #[tokio::test]
    async fn test_offset_rescheduler_without_receivers() {
        let tx = Arc::new(watch::Sender::new(UtcOffset::UTC));
        let rescheduler = OffsetRescheduler::new(Arc::clone(&tx), Some("42".to_string()));

        rescheduler.reschedule(&change("42", offset!(-3:30))).await.unwrap();
        assert_eq!(*tx.subscribe().borrow(), offset!(-3:30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_location_loop_polls_on_interval() {
        let mut config = Config::default();
        config.weather.enabled = false;
        let (services, mocks) = mock_services();
        let state = AppState::new(Store::open_in_memory().unwrap(), config, services);

        Scheduler::new(Arc::clone(&state)).start().await;
        tokio::time::sleep(Duration::from_secs(250)).await;

        // Ticks at 0s, 120s and 240s
        assert_eq!(mocks.location.call_count(), 3);
        assert_eq!(state.jobs.read().await.location.runs, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_location_loop_continues_after_failures() {
        let mut config = Config::default();
        config.weather.enabled = false;
        config.tracking.poll_interval = 10;
        let (services, mocks) = mock_services();
        mocks.location.set_should_fail(true);
        let state = AppState::new(Store::open_in_memory().unwrap(), config, services);

        Scheduler::new(Arc::clone(&state)).start().await;
        tokio::time::sleep(Duration::from_secs(55)).await;

        assert_eq!(mocks.location.call_count(), 6);
        assert_eq!(state.jobs.read().await.location.consecutive_failures, 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_polls_stay_spaced_by_interval() {
        let mut config = Config::default();
        config.weather.enabled = false;
        config.tracking.poll_interval = 10;
        let (services, mocks) = mock_services();
        mocks.location.set_latency(Duration::from_secs(25));
        let state = AppState::new(Store::open_in_memory().unwrap(), config, services);

        Scheduler::new(Arc::clone(&state)).start().await;
        tokio::time::sleep(Duration::from_secs(1)).await;
        // Only the first poll is slow
        mocks.location.set_latency(Duration::ZERO);
        tokio::time::sleep(Duration::from_secs(37)).await;

        // Polls at 0s, 25s and 35s; catching up the missed ticks would add
        // another poll at 25s and one at 30s.
        assert_eq!(mocks.location.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_weather_loop_publishes_next_run() {
        let mut config = Config::default();
        config.tracking.enabled = false;
        let (services, _mocks) = mock_services();
        let state = AppState::new(Store::open_in_memory().unwrap(), config, services);

        Scheduler::new(Arc::clone(&state)).start().await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        let next = state.jobs.read().await.next_weather_run.unwrap();
        assert_eq!(next.time(), time!(05:58));
        assert_eq!(next.offset(), UtcOffset::UTC);

        state.weather_offset.send_replace(offset!(+2));
        tokio::time::sleep(Duration::from_millis(10)).await;

        let next = state.jobs.read().await.next_weather_run.unwrap();
        assert_eq!(next.offset(), offset!(+2));
        assert_eq!(next.time(), time!(05:58));
    }
}
