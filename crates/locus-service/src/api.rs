//! HTTP entry point and REST API.
//!
//! `GET /` and `POST /` run a job named by the `task` parameter, taken from
//! the query string or from a JSON body (`{"task": "weather"}`). The query
//! string wins when both are present. A missing or unknown task is reported
//! as a `failure` status with HTTP 200; a job that fails returns HTTP 500
//! with an `error` message.
//!
//! # Lock Ordering
//!
//! Handlers that need several locks acquire `config`, then `store`, then
//! `jobs`.

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use time::OffsetDateTime;
use tracing::error;

use locus_store::{DeviceSummary, LocationQuery, StoredLocation};
use locus_types::offset_label;

use crate::jobs::{JobError, Task, run_task};
use crate::state::{AppState, JobStats};

/// Create the API router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        // Job dispatch
        .route("/", get(dispatch).post(dispatch))
        // Health and status
        .route("/api/health", get(health))
        .route("/api/status", get(get_status))
        // Data endpoints
        .route("/api/devices", get(list_devices))
        .route("/api/devices/{id}/locations", get(get_locations))
}

/// `task` parameter of the entry point.
#[derive(Debug, Default, Deserialize)]
pub struct TaskParams {
    pub task: Option<String>,
}

/// Run the job named by `task`.
async fn dispatch(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TaskParams>,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    // A body that is not JSON counts as no body
    let name = params.task.or_else(|| {
        serde_json::from_slice::<TaskParams>(&body)
            .ok()
            .and_then(|p| p.task)
    });

    let Some(name) = name else {
        return Ok(Json(failure("No task specified")));
    };
    let task = match name.parse::<Task>() {
        Ok(task) => task,
        Err(e) => return Ok(Json(failure(&e.to_string()))),
    };

    let outcome = run_task(&state, task).await?;
    Ok(Json(outcome.to_json()))
}

fn failure(message: &str) -> Value {
    json!({ "status": "failure", "message": message })
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// Health check endpoint.
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: OffsetDateTime::now_utc(),
    })
}

/// Service status response.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub version: &'static str,
    /// Device driving the weather job and the map.
    pub device_id: Option<String>,
    /// UTC offset the weather job is scheduled in.
    pub weather_offset: String,
    /// Number of stored readings across all devices.
    pub stored_locations: u64,
    pub jobs: JobStats,
}

async fn get_status(State(state): State<Arc<AppState>>) -> Result<Json<StatusResponse>, AppError> {
    let device_id = state.device_id().await;
    let stored_locations = {
        let store = state.store.lock().await;
        store.count_locations(None)?
    };
    let jobs = state.jobs.read().await.clone();
    let weather_offset = offset_label(*state.weather_offset.borrow());

    Ok(Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION"),
        device_id,
        weather_offset,
        stored_locations,
        jobs,
    }))
}

/// List every device with stored readings or a watermark.
async fn list_devices(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<DeviceSummary>>, AppError> {
    let store = state.store.lock().await;
    Ok(Json(store.list_devices()?))
}

/// Query parameters of the locations endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct LocationsQuery {
    /// Unix timestamp, inclusive.
    pub since: Option<i64>,
    /// Unix timestamp, inclusive.
    pub until: Option<i64>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl LocationsQuery {
    /// Returns an error if `since > until` or a bound is out of range.
    pub fn to_query(&self, device_id: &str) -> Result<LocationQuery, AppError> {
        if let (Some(since), Some(until)) = (self.since, self.until)
            && since > until
        {
            return Err(AppError::BadRequest(format!(
                "Invalid time range: 'since' ({}) must be less than or equal to 'until' ({})",
                since, until
            )));
        }

        let mut query = LocationQuery::new().device(device_id);
        if let Some(since) = self.since {
            query = query.since(unix_time("since", since)?);
        }
        if let Some(until) = self.until {
            query = query.until(unix_time("until", until)?);
        }
        if let Some(limit) = self.limit {
            query = query.limit(limit);
        }
        if let Some(offset) = self.offset {
            query = query.offset(offset);
        }
        Ok(query)
    }
}

fn unix_time(name: &str, value: i64) -> Result<OffsetDateTime, AppError> {
    OffsetDateTime::from_unix_timestamp(value)
        .map_err(|_| AppError::BadRequest(format!("'{}' is out of range: {}", name, value)))
}

/// Stored readings of a device, newest first.
async fn get_locations(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<LocationsQuery>,
) -> Result<Json<Vec<StoredLocation>>, AppError> {
    let query = params.to_query(&id)?;
    let store = state.store.lock().await;
    Ok(Json(store.query_locations(&query)?))
}

/// Application error type.
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Job(JobError),
    Store(locus_store::Error),
}

impl From<locus_store::Error> for AppError {
    fn from(e: locus_store::Error) -> Self {
        AppError::Store(e)
    }
}

impl From<JobError> for AppError {
    fn from(e: JobError) -> Self {
        AppError::Job(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Job(e) => {
                error!("Job failed: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
            AppError::Store(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        };

        let body = json!({
            "error": message,
        });

        (status, Json(body)).into_response()
    }
}
