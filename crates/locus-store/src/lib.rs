//! Local persistence of device locations.
//!
//! This crate keeps every ingested reading in SQLite, keyed by device and
//! by the reading's own timestamp, together with a per-device watermark.
//!
//! # Features
//!
//! - Watermark-based ingestion that only stores strictly newer readings
//! - Timezone change detection on ingestion
//! - Query by device and time range, with pagination
//! - Incremental CSV export of a device's history
//!
//! # Example
//!
//! ```no_run
//! use locus_store::{LocationQuery, Store};
//!
//! let store = Store::open_default()?;
//!
//! let query = LocationQuery::new().device("12345678").limit(10);
//! for location in store.query_locations(&query)? {
//!     println!("{} {}", location.reading.date, location.reading.latitude);
//! }
//! # Ok::<(), locus_store::Error>(())
//! ```

mod error;
pub mod export;
mod models;
mod queries;
mod schema;
mod store;

pub use error::{Error, Result};
pub use export::{
    ExportOptions, ExportSummary, HistoryFile, export_history, import_history, load_history,
    read_history,
};
pub use models::{DeviceSummary, IngestReport, StoredLocation, TimezoneChange};
pub use queries::LocationQuery;
pub use store::Store;

/// Default database path following platform conventions.
///
/// - Linux: `~/.local/share/locus/data.db`
/// - macOS: `~/Library/Application Support/locus/data.db`
/// - Windows: `C:\Users\<user>\AppData\Local\locus\data.db`
pub fn default_db_path() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("locus")
        .join("data.db")
}
