//! Flat CSV export of a device's location history.
//!
//! The export has three columns, `Date,Latitude,Longitude`. In append mode
//! the existing file is kept, readings are re-queried from its latest
//! `Date` onward, and exact duplicates are dropped. A file with rows that
//! do not parse is never rewritten in append mode.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::{Map, Value};
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use locus_types::{HistoryRow, Timestamp};

use crate::error::{Error, Result};
use crate::queries::LocationQuery;
use crate::store::Store;

/// CSV header of the export.
pub const HEADER: [&str; 3] = ["Date", "Latitude", "Longitude"];

/// What to export and where.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub device_id: String,
    /// Inclusive lower bound; unbounded when `None`.
    pub start: Option<OffsetDateTime>,
    /// Inclusive upper bound; unbounded when `None`.
    pub end: Option<OffsetDateTime>,
    /// Merge with the existing file instead of replacing it.
    pub append: bool,
    pub path: PathBuf,
}

impl ExportOptions {
    /// Full-history export to the default path, appending.
    pub fn new(device_id: &str) -> Self {
        Self {
            device_id: device_id.to_string(),
            start: None,
            end: None,
            append: true,
            path: default_export_path(device_id),
        }
    }

    pub fn start(mut self, start: OffsetDateTime) -> Self {
        self.start = Some(start);
        self
    }

    pub fn end(mut self, end: OffsetDateTime) -> Self {
        self.end = Some(end);
        self
    }

    pub fn append(mut self, append: bool) -> Self {
        self.append = append;
        self
    }

    pub fn path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.path = path.into();
        self
    }
}

/// `output/location_export_{device_id}.csv`
pub fn default_export_path(device_id: &str) -> PathBuf {
    PathBuf::from("output").join(format!("location_export_{device_id}.csv"))
}

/// Result of an export.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportSummary {
    pub path: PathBuf,
    /// Rows kept from the existing file.
    pub existing_rows: usize,
    /// Rows queried from the store.
    pub queried_rows: usize,
    /// Rows in the written file.
    pub written_rows: usize,
}

/// Contents of a history file, with rows whose `Date` did not parse
/// counted separately.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryFile {
    pub rows: Vec<HistoryRow>,
    pub invalid: usize,
}

impl HistoryFile {
    /// Number of records in the file, valid or not.
    pub fn total(&self) -> usize {
        self.rows.len() + self.invalid
    }
}

/// Export a device's readings to CSV.
pub fn export_history(store: &Store, options: &ExportOptions) -> Result<ExportSummary> {
    let existing = if options.append && options.path.exists() {
        let file = load_history(&options.path)?;
        if file.invalid > 0 {
            return Err(Error::UnreadableHistory {
                path: options.path.clone(),
                invalid: file.invalid,
            });
        }
        file.rows
    } else {
        Vec::new()
    };

    let mut since = options.start;
    if let Some(max) = existing.iter().map(|r| r.date.instant()).max() {
        debug!("Existing export ends at {}", max);
        since = Some(since.map_or(max, |start| start.max(max)));
    }

    let mut query = LocationQuery::new().device(&options.device_id).oldest_first();
    if let Some(since) = since {
        query = query.since(since);
    }
    if let Some(end) = options.end {
        query = query.until(end);
    }

    let queried: Vec<HistoryRow> = store
        .query_locations(&query)?
        .iter()
        .map(|l| HistoryRow::from_reading(&l.reading))
        .collect();

    let existing_rows = existing.len();
    let queried_rows = queried.len();
    let rows = dedup_keep_last(existing.into_iter().chain(queried).collect());

    write_history(&options.path, &rows)?;

    info!(
        "Exported {} row(s) for device {} to {}",
        rows.len(),
        options.device_id,
        options.path.display()
    );

    Ok(ExportSummary {
        path: options.path.clone(),
        existing_rows,
        queried_rows,
        written_rows: rows.len(),
    })
}

/// Drop exact duplicates on `(Date, Latitude, Longitude)`, keeping the last
/// occurrence and the relative order of the kept rows.
pub fn dedup_keep_last(rows: Vec<HistoryRow>) -> Vec<HistoryRow> {
    let mut seen = HashSet::new();
    let mut kept: Vec<HistoryRow> = rows
        .into_iter()
        .rev()
        .filter(|row| seen.insert(row.dedup_key()))
        .collect();
    kept.reverse();
    kept
}

/// Write rows with the `Date,Latitude,Longitude` header, creating the
/// parent directory.
pub fn write_history(path: &Path, rows: &[HistoryRow]) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        std::fs::create_dir_all(parent).map_err(|e| Error::CreateDirectory {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)?;
    writer.write_record(HEADER)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;

    Ok(())
}

/// Read the valid rows of a history file.
pub fn read_history(path: &Path) -> Result<Vec<HistoryRow>> {
    Ok(load_history(path)?.rows)
}

/// Import a history file into the store without moving the watermark.
///
/// Rows are stored as bare coordinate documents and then backfilled with
/// `Date` and `DeviceID`. Readings already in the store are kept as they
/// are. Returns the number of rows inserted.
pub fn import_history(store: &Store, device_id: &str, path: &Path) -> Result<usize> {
    let rows = read_history(path)?;
    let mut inserted = 0;

    for row in &rows {
        let mut document = Map::new();
        document.insert("Latitude".to_string(), Value::from(row.latitude));
        document.insert("Longitude".to_string(), Value::from(row.longitude));
        if store.import_document(device_id, &row.date, &document)? {
            inserted += 1;
        }
    }
    store.backfill_device_fields(device_id)?;

    info!(
        "Imported {} of {} row(s) from {} for device {}",
        inserted,
        rows.len(),
        path.display(),
        device_id
    );
    Ok(inserted)
}

#[derive(Deserialize)]
struct RawHistoryRow {
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "Latitude")]
    latitude: f64,
    #[serde(rename = "Longitude")]
    longitude: f64,
}

/// Read a history file, keeping track of rows with an unparseable `Date`.
pub fn load_history(path: &Path) -> Result<HistoryFile> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut file = HistoryFile::default();

    for record in reader.deserialize::<RawHistoryRow>() {
        let raw = match record {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Skipping malformed row in {}: {}", path.display(), e);
                file.invalid += 1;
                continue;
            }
        };
        match Timestamp::parse(&raw.date) {
            Ok(date) => file.rows.push(HistoryRow {
                date,
                latitude: raw.latitude,
                longitude: raw.longitude,
            }),
            Err(_) => file.invalid += 1,
        }
    }

    debug!(
        "Read {} row(s) from {} ({} invalid)",
        file.rows.len(),
        path.display(),
        file.invalid
    );
    Ok(file)
}
