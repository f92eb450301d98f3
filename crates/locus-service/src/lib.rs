//! Location polling, daily weather notifications and a map viewer.
//!
//! This crate provides a service that:
//! - Polls the tracking API on a schedule and stores newer readings
//! - Sends a weather forecast for the tracked device's location every morning
//! - Moves the morning notification when the device changes timezone
//! - Exposes an HTTP entry point that runs either job on demand
//! - Serves a map of the exported location history
//!
//! # HTTP Endpoints
//!
//! - `GET|POST /?task=location|weather` - Run a job
//! - `GET /api/health` - Service health check
//! - `GET /api/status` - Job statistics and next weather run
//! - `GET /api/devices` - Devices with stored readings
//! - `GET /api/devices/{id}/locations` - Stored readings of a device
//! - `GET /api/map` - Filtered history as points, track and viewport
//! - `GET /map` - Map page
//!
//! # Configuration
//!
//! The service reads configuration from `~/.config/locus/locus.toml`:
//!
//! ```toml
//! [server]
//! bind = "127.0.0.1:8080"
//!
//! [tracking]
//! poll_interval = 120
//! device_id = "12345678"
//!
//! [weather]
//! at = "05:58"
//! use_llm = true
//! ```
//!
//! API credentials are read from the environment: `FOLLOWMEE_API_KEY`,
//! `FOLLOWMEE_USERNAME`, `OPENWEATHERMAP_API_KEY`, `OPENAI_API_KEY`,
//! `PUSHOVER_WEATHER_API_TOKEN` and `PUSHOVER_USER_KEY`.

pub mod api;
pub mod config;
pub mod jobs;
pub mod map;
pub mod scheduler;
pub mod services;
pub mod state;

pub use config::{Config, ConfigError, Secrets, default_config_path};
pub use jobs::{JobError, Task, TaskOutcome, run_task};
pub use scheduler::{OffsetRescheduler, Rescheduler, Scheduler, next_weather_run};
pub use services::Services;
pub use state::{AppState, JobStats, JobStatus};
