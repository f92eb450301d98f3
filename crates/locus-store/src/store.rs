//! Main store implementation.

use std::collections::BTreeMap;
use std::path::Path;

use rusqlite::{Connection, OptionalExtension};
use serde::Deserialize;
use serde_json::{Map, Value};
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use locus_types::{DeviceReading, Timestamp};

use crate::error::{Error, Result};
use crate::models::{DeviceSummary, IngestReport, StoredLocation, TimezoneChange};
use crate::queries::LocationQuery;
use crate::schema;

/// SQLite-based store for device locations.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| Error::CreateDirectory {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        info!("Opening database at {}", path.display());
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;

        schema::initialize(&conn)?;

        Ok(Self { conn })
    }

    /// Open the default database location.
    pub fn open_default() -> Result<Self> {
        Self::open(crate::default_db_path())
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }
}

// Ingestion
impl Store {
    /// Persist the readings that are newer than each device's watermark.
    ///
    /// A reading is stored only when its timestamp is strictly after the
    /// watermark in UTC; the watermark then becomes exactly that timestamp.
    /// Older or equal readings are skipped. Devices are handled in id order,
    /// each in its own transaction. The first error (a database failure or a
    /// stored watermark that no longer parses) aborts the call; devices
    /// before it stay committed.
    pub fn store_locations(
        &self,
        locations: &BTreeMap<String, DeviceReading>,
    ) -> Result<IngestReport> {
        let mut report = IngestReport::default();

        for (device_id, reading) in locations {
            let watermark = self.watermark(device_id)?;

            if !reading.date.is_newer_than(&watermark) {
                info!(
                    "No new data for device {} ({} is not after {})",
                    device_id, reading.date, watermark
                );
                report.skipped.push(device_id.clone());
                continue;
            }

            self.persist(device_id, reading)?;
            debug!("Stored location for device {} at {}", device_id, reading.date);

            if reading.date.offset() != watermark.offset() {
                let change = TimezoneChange {
                    device_id: device_id.clone(),
                    previous: watermark.offset(),
                    current: reading.date.offset(),
                    at: reading.date.clone(),
                };
                info!("Timezone change: {}", change);
                report.timezone_changes.push(change);
            }

            report.stored.push(device_id.clone());
        }

        Ok(report)
    }

    fn persist(&self, device_id: &str, reading: &DeviceReading) -> Result<()> {
        let mut reading = reading.clone();
        if reading.device_id.is_empty() {
            reading.device_id = device_id.to_string();
        }
        let payload = serde_json::to_string(&reading)?;
        let now = OffsetDateTime::now_utc().unix_timestamp();

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO locations
                (device_id, date, captured_at, utc_offset, latitude, longitude, payload, stored_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
                device_id,
                reading.date.as_str(),
                reading.date.unix_timestamp(),
                reading.date.offset().whole_seconds(),
                reading.latitude,
                reading.longitude,
                payload,
                now,
            ],
        )?;
        tx.execute(
            "INSERT INTO watermarks (device_id, last_updated_time, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(device_id) DO UPDATE SET
                last_updated_time = ?2,
                updated_at = ?3",
            rusqlite::params![device_id, reading.date.as_str(), now],
        )?;
        tx.commit()?;

        Ok(())
    }

    /// Watermark of a device; the epoch if it was never ingested.
    pub fn watermark(&self, device_id: &str) -> Result<Timestamp> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT last_updated_time FROM watermarks WHERE device_id = ?",
                [device_id],
                |row| row.get(0),
            )
            .optional()?;

        match raw {
            Some(raw) => Ok(Timestamp::parse(&raw)?),
            None => Ok(Timestamp::epoch()),
        }
    }

    /// The reading the watermark points at.
    pub fn latest_location(&self, device_id: &str) -> Result<Option<DeviceReading>> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT last_updated_time FROM watermarks WHERE device_id = ?",
                [device_id],
                |row| row.get(0),
            )
            .optional()?;

        let Some(date) = raw else {
            return Ok(None);
        };

        let row: Option<RawRow> = self
            .conn
            .query_row(
                "SELECT device_id, date, payload, stored_at FROM locations
                 WHERE device_id = ?1 AND date = ?2",
                rusqlite::params![device_id, date],
                RawRow::from_row,
            )
            .optional()?;

        match row {
            Some(row) => Ok(Some(row.decode()?.reading)),
            None => {
                warn!(
                    "Watermark of device {} points at missing reading {}",
                    device_id, date
                );
                Ok(None)
            }
        }
    }
}

// Queries
impl Store {
    /// Query stored locations with filters.
    pub fn query_locations(&self, query: &LocationQuery) -> Result<Vec<StoredLocation>> {
        let sql = query.build_sql();
        let (_, params) = query.build_where();

        debug!("Executing query: {}", sql);

        let params_ref: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_ref.as_slice(), RawRow::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter().map(RawRow::decode).collect()
    }

    /// Count stored locations, optionally for one device.
    pub fn count_locations(&self, device_id: Option<&str>) -> Result<u64> {
        let count: i64 = match device_id {
            Some(id) => self.conn.query_row(
                "SELECT COUNT(*) FROM locations WHERE device_id = ?",
                [id],
                |row| row.get(0),
            )?,
            None => self
                .conn
                .query_row("SELECT COUNT(*) FROM locations", [], |row| row.get(0))?,
        };

        Ok(count as u64)
    }

    /// Every device with stored readings or a watermark.
    pub fn list_devices(&self) -> Result<Vec<DeviceSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT d.device_id, COALESCE(l.n, 0), w.last_updated_time
             FROM (SELECT device_id FROM locations UNION SELECT device_id FROM watermarks) d
             LEFT JOIN (SELECT device_id, COUNT(*) AS n FROM locations GROUP BY device_id) l
                ON l.device_id = d.device_id
             LEFT JOIN watermarks w ON w.device_id = d.device_id
             ORDER BY d.device_id",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(device_id, readings, watermark)| -> Result<DeviceSummary> {
                Ok(DeviceSummary {
                    device_id,
                    readings: readings as u64,
                    last_updated_time: watermark.as_deref().map(Timestamp::parse).transpose()?,
                })
            })
            .collect()
    }
}

// Legacy documents
impl Store {
    /// Store a raw document under a timestamp key without moving the
    /// watermark.
    ///
    /// Used to import history written by other tools. The document must
    /// carry `Latitude` and `Longitude`; `Date` and `DeviceID` may be
    /// missing and are filled in on read or by
    /// [`backfill_device_fields`](Self::backfill_device_fields).
    ///
    /// A reading already stored under the same key is left untouched.
    /// Returns whether the document was inserted.
    pub fn import_document(
        &self,
        device_id: &str,
        date: &Timestamp,
        document: &Map<String, Value>,
    ) -> Result<bool> {
        #[derive(Deserialize)]
        struct Coordinates {
            #[serde(rename = "Latitude")]
            latitude: f64,
            #[serde(rename = "Longitude")]
            longitude: f64,
        }

        let coords: Coordinates = serde_json::from_value(Value::Object(document.clone()))?;
        let payload = serde_json::to_string(document)?;

        let inserted = self.conn.execute(
            "INSERT INTO locations
                (device_id, date, captured_at, utc_offset, latitude, longitude, payload, stored_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(device_id, date) DO NOTHING",
            rusqlite::params![
                device_id,
                date.as_str(),
                date.unix_timestamp(),
                date.offset().whole_seconds(),
                coords.latitude,
                coords.longitude,
                payload,
                OffsetDateTime::now_utc().unix_timestamp(),
            ],
        )?;

        Ok(inserted > 0)
    }

    /// Add `Date` and `DeviceID` to stored documents of a device that lack
    /// them. Returns the number of documents rewritten.
    pub fn backfill_device_fields(&self, device_id: &str) -> Result<usize> {
        let rows = {
            let mut stmt = self
                .conn
                .prepare("SELECT date, payload FROM locations WHERE device_id = ?")?;
            let rows = stmt
                .query_map([device_id], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows
        };

        let tx = self.conn.unchecked_transaction()?;
        let mut updated = 0;

        for (date, payload) in rows {
            let mut document: Map<String, Value> = serde_json::from_str(&payload)?;
            if document.contains_key("Date") && document.contains_key("DeviceID") {
                continue;
            }

            document
                .entry("Date")
                .or_insert_with(|| Value::String(date.clone()));
            document
                .entry("DeviceID")
                .or_insert_with(|| Value::String(device_id.to_string()));

            tx.execute(
                "UPDATE locations SET payload = ?1 WHERE device_id = ?2 AND date = ?3",
                rusqlite::params![serde_json::to_string(&document)?, device_id, date],
            )?;
            updated += 1;
        }

        tx.commit()?;
        info!("Backfilled {} document(s) for device {}", updated, device_id);
        Ok(updated)
    }
}

struct RawRow {
    device_id: String,
    date: String,
    payload: String,
    stored_at: i64,
}

impl RawRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            device_id: row.get(0)?,
            date: row.get(1)?,
            payload: row.get(2)?,
            stored_at: row.get(3)?,
        })
    }

    fn decode(self) -> Result<StoredLocation> {
        let mut document: Map<String, Value> = serde_json::from_str(&self.payload)?;
        document
            .entry("Date")
            .or_insert_with(|| Value::String(self.date.clone()));
        document
            .entry("DeviceID")
            .or_insert_with(|| Value::String(self.device_id.clone()));

        Ok(StoredLocation {
            reading: serde_json::from_value(Value::Object(document))?,
            device_id: self.device_id,
            stored_at: OffsetDateTime::from_unix_timestamp(self.stored_at)
                .unwrap_or(OffsetDateTime::UNIX_EPOCH),
        })
    }
}
