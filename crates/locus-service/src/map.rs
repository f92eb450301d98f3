//! Map viewer over an exported history file.
//!
//! `GET /api/map` filters the rows of a `Date,Latitude,Longitude` CSV and
//! returns the points, the chronological track and a viewport as JSON.
//! `GET /map` serves a Leaflet page that renders it.
//!
//! Query parameters of `/api/map`:
//!
//! - `mode`: `single_day` (default), `all_history` or `custom_range`
//! - `date`: `YYYY-MM-DD` for `single_day`, today (UTC) when omitted
//! - `start`, `end`: `YYYY-MM-DD` bounds for `custom_range`, both inclusive

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    response::Html,
    routing::get,
};
use serde::{Deserialize, Serialize};
use time::macros::format_description;
use time::{Date, OffsetDateTime};
use tracing::{debug, warn};

use locus_store::load_history;
use locus_types::{HistoryRow, Timestamp, parse_date};

use crate::api::AppError;

/// Zoom level used when every point has the same coordinates.
pub const SINGLE_POINT_ZOOM: u8 = 14;

const EMPTY_SELECTION: &str = "No valid location data to display for the selected period.";

const MAP_PAGE: &str = include_str!("../assets/map.html");

/// Which rows to show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    SingleDay(Date),
    AllHistory,
    /// Inclusive on both ends.
    CustomRange(Date, Date),
}

/// A plotted location.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub date: Timestamp,
    /// Hover text, e.g. `2024 Jul 02 09:15:00AM`.
    pub label: String,
}

/// Initial map position.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Viewport {
    Center {
        latitude: f64,
        longitude: f64,
        zoom: u8,
    },
    Bounds {
        west: f64,
        east: f64,
        south: f64,
        north: f64,
    },
}

/// Everything the page needs to draw the map.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapView {
    pub points: Vec<MapPoint>,
    /// `[longitude, latitude]` pairs in chronological order.
    pub line: Vec<[f64; 2]>,
    pub viewport: Option<Viewport>,
    /// Status line shown under the map.
    pub info: String,
    /// Shown instead of the map when there is nothing to plot.
    pub empty_message: Option<String>,
}

impl MapView {
    fn empty(info: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            points: Vec::new(),
            line: Vec::new(),
            viewport: None,
            info: info.into(),
            empty_message: Some(message.into()),
        }
    }
}

/// Read the valid rows of a history file.
///
/// When there is nothing to show, the error is the view to render instead.
pub fn load_rows(path: &Path) -> Result<Vec<HistoryRow>, MapView> {
    let not_found = || {
        let message = format!("Error: CSV file not found at {}", path.display());
        MapView::empty(message.clone(), message)
    };

    if !path.exists() {
        return Err(not_found());
    }
    let file = load_history(path).map_err(|e| {
        warn!("Failed to read {}: {}", path.display(), e);
        not_found()
    })?;

    if file.total() == 0 {
        return Err(MapView::empty("No data in CSV file.", EMPTY_SELECTION));
    }
    if file.rows.is_empty() {
        return Err(MapView::empty(
            "No valid date entries found in CSV.",
            EMPTY_SELECTION,
        ));
    }
    if file.invalid > 0 {
        debug!("Dropped {} row(s) with an invalid date", file.invalid);
    }

    Ok(file.rows)
}

/// Keep the rows selected by `mode`, comparing each reading's own calendar
/// date.
pub fn filter_rows(rows: &[HistoryRow], mode: FilterMode) -> Vec<HistoryRow> {
    rows.iter()
        .filter(|row| match mode {
            FilterMode::SingleDay(day) => row.date.date() == day,
            FilterMode::AllHistory => true,
            FilterMode::CustomRange(start, end) => {
                let day = row.date.date();
                start <= day && day <= end
            }
        })
        .cloned()
        .collect()
}

/// Filter `rows` and lay them out for the map.
pub fn build_view(rows: &[HistoryRow], mode: FilterMode) -> MapView {
    let selected = filter_rows(rows, mode);
    let info = format!(
        "Displaying {} location points. {}",
        selected.len(),
        describe_range(&selected, mode)
    );

    if selected.is_empty() {
        return MapView::empty(info, EMPTY_SELECTION);
    }

    let points = selected
        .iter()
        .map(|row| MapPoint {
            latitude: row.latitude,
            longitude: row.longitude,
            date: row.date.clone(),
            label: row.date.display_label(),
        })
        .collect();

    let mut chronological: Vec<&HistoryRow> = selected.iter().collect();
    chronological.sort_by(|a, b| a.date.cmp(&b.date));
    let line = chronological
        .iter()
        .map(|row| [row.longitude, row.latitude])
        .collect();

    MapView {
        points,
        line,
        viewport: Some(viewport(&selected)),
        info,
        empty_message: None,
    }
}

fn viewport(rows: &[HistoryRow]) -> Viewport {
    let latitudes: HashSet<u64> = rows.iter().map(|r| r.latitude.to_bits()).collect();
    let longitudes: HashSet<u64> = rows.iter().map(|r| r.longitude.to_bits()).collect();

    if latitudes.len() == 1 && longitudes.len() == 1 {
        return Viewport::Center {
            latitude: rows[0].latitude,
            longitude: rows[0].longitude,
            zoom: SINGLE_POINT_ZOOM,
        };
    }

    let mut bounds = (f64::INFINITY, f64::NEG_INFINITY, f64::INFINITY, f64::NEG_INFINITY);
    for row in rows {
        bounds.0 = bounds.0.min(row.longitude);
        bounds.1 = bounds.1.max(row.longitude);
        bounds.2 = bounds.2.min(row.latitude);
        bounds.3 = bounds.3.max(row.latitude);
    }
    let (west, east, south, north) = bounds;
    Viewport::Bounds {
        west,
        east,
        south,
        north,
    }
}

fn describe_range(rows: &[HistoryRow], mode: FilterMode) -> String {
    match mode {
        FilterMode::SingleDay(day) => {
            let label = day
                .format(format_description!(
                    "[weekday], [month repr:long] [day], [year]"
                ))
                .unwrap_or_else(|_| day.to_string());
            format!("Showing data for {}.", label)
        }
        FilterMode::AllHistory => match (
            rows.iter().min_by(|a, b| a.date.cmp(&b.date)),
            rows.iter().max_by(|a, b| a.date.cmp(&b.date)),
        ) {
            (Some(first), Some(last)) => format!(
                "Showing all data from {} to {}.",
                wall_clock(&first.date),
                wall_clock(&last.date)
            ),
            _ => "Showing all data (none available).".to_string(),
        },
        FilterMode::CustomRange(start, end) => {
            format!("Showing data from {} to {}.", start, end)
        }
    }
}

fn wall_clock(date: &Timestamp) -> String {
    date.instant()
        .format(format_description!(
            "[year]-[month]-[day] [hour]:[minute]:[second]"
        ))
        .unwrap_or_else(|_| date.to_string())
}

/// Query parameters of `/api/map`.
#[derive(Debug, Default, Deserialize)]
pub struct MapQuery {
    pub mode: Option<String>,
    pub date: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
}

impl MapQuery {
    /// The requested filter, or `None` when a custom range is incomplete.
    pub fn filter_mode(&self, today: Date) -> Result<Option<FilterMode>, AppError> {
        match self.mode.as_deref().unwrap_or("single_day") {
            "single_day" => {
                let day = match non_empty(&self.date) {
                    Some(value) => date_param("date", value)?,
                    None => today,
                };
                Ok(Some(FilterMode::SingleDay(day)))
            }
            "all_history" => Ok(Some(FilterMode::AllHistory)),
            "custom_range" => match (non_empty(&self.start), non_empty(&self.end)) {
                (Some(start), Some(end)) => Ok(Some(FilterMode::CustomRange(
                    date_param("start", start)?,
                    date_param("end", end)?,
                ))),
                _ => Ok(None),
            },
            other => Err(AppError::BadRequest(format!(
                "Unknown mode '{}': expected single_day, all_history or custom_range",
                other
            ))),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.trim().is_empty())
}

fn date_param(name: &str, value: &str) -> Result<Date, AppError> {
    parse_date(value).map_err(|e| AppError::BadRequest(format!("'{}': {}", name, e)))
}

/// History file the viewer reads.
#[derive(Debug, Clone)]
pub struct MapSource {
    pub path: PathBuf,
}

/// Create the map router for a history file.
pub fn router<S>(path: PathBuf) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .route("/map", get(map_page))
        .route("/api/map", get(get_map))
        .with_state(Arc::new(MapSource { path }))
}

async fn map_page() -> Html<&'static str> {
    Html(MAP_PAGE)
}

async fn get_map(
    State(source): State<Arc<MapSource>>,
    Query(query): Query<MapQuery>,
) -> Result<Json<MapView>, AppError> {
    let today = OffsetDateTime::now_utc().date();
    let Some(mode) = query.filter_mode(today)? else {
        return Ok(Json(MapView::empty(
            "Please select a start and end date for the custom range.",
            EMPTY_SELECTION,
        )));
    };

    let view = match load_rows(&source.path) {
        Ok(rows) => build_view(&rows, mode),
        Err(view) => view,
    };
    Ok(Json(view))
}
