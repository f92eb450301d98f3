//! Query builder for stored locations.
//!
//! # Example
//!
//! ```
//! use locus_store::{LocationQuery, Store};
//! use time::{Duration, OffsetDateTime};
//!
//! let store = Store::open_in_memory()?;
//! let yesterday = OffsetDateTime::now_utc() - Duration::hours(24);
//!
//! let query = LocationQuery::new()
//!     .device("12345678")
//!     .since(yesterday)
//!     .oldest_first();
//!
//! let locations = store.query_locations(&query)?;
//! assert!(locations.is_empty());
//! # Ok::<(), locus_store::Error>(())
//! ```

use time::OffsetDateTime;

/// Fluent query builder for [`Store::query_locations`](crate::Store::query_locations).
///
/// Time bounds are inclusive and compared in UTC, whatever offset each
/// reading was reported in. By default results are ordered newest first.
#[derive(Debug, Default, Clone)]
pub struct LocationQuery {
    /// Filter by device ID.
    pub device_id: Option<String>,
    /// Readings at or after this instant.
    pub since: Option<OffsetDateTime>,
    /// Readings at or before this instant.
    pub until: Option<OffsetDateTime>,
    /// Maximum number of results.
    pub limit: Option<u32>,
    /// Offset for pagination.
    pub offset: Option<u32>,
    /// Order by capture time descending.
    pub newest_first: bool,
}

impl LocationQuery {
    /// Query over all devices and all time, newest first.
    pub fn new() -> Self {
        Self {
            newest_first: true,
            ..Default::default()
        }
    }

    pub fn device(mut self, device_id: &str) -> Self {
        self.device_id = Some(device_id.to_string());
        self
    }

    pub fn since(mut self, time: OffsetDateTime) -> Self {
        self.since = Some(time);
        self
    }

    pub fn until(mut self, time: OffsetDateTime) -> Self {
        self.until = Some(time);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skip the first N results. SQLite only honours an offset together
    /// with a limit, so an offset alone implies no upper bound.
    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Chronological order, as used by the exporter.
    pub fn oldest_first(mut self) -> Self {
        self.newest_first = false;
        self
    }

    pub(crate) fn build_where(&self) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ref device_id) = self.device_id {
            conditions.push("device_id = ?");
            params.push(Box::new(device_id.clone()));
        }

        if let Some(since) = self.since {
            conditions.push("captured_at >= ?");
            params.push(Box::new(since.unix_timestamp()));
        }

        if let Some(until) = self.until {
            conditions.push("captured_at <= ?");
            params.push(Box::new(until.unix_timestamp()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }

    pub(crate) fn build_sql(&self) -> String {
        let (where_clause, _) = self.build_where();
        let order = if self.newest_first { "DESC" } else { "ASC" };

        let mut sql = format!(
            "SELECT device_id, date, payload, stored_at FROM locations {} \
             ORDER BY captured_at {}, date {}",
            where_clause, order, order
        );

        match (self.limit, self.offset) {
            (Some(limit), Some(offset)) => sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}")),
            (Some(limit), None) => sql.push_str(&format!(" LIMIT {limit}")),
            (None, Some(offset)) => sql.push_str(&format!(" LIMIT -1 OFFSET {offset}")),
            (None, None) => {}
        }

        sql
    }
}
