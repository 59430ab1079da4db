//! The event source: where candidate events come from.
//!
//! The pipeline only ever *pulls* from the source; one fetch per poll cycle
//! returns an ordered batch of candidate records. The trait seam exists so
//! the orchestrator can be exercised with in-memory sources in tests, with
//! the Postgres implementation used in production.

mod postgres;

pub use postgres::{PgEventSource, QueryParams};

use std::future::Future;
use std::io;
use std::path::Path;

use thiserror::Error;

use crate::types::EventRecord;

/// Errors from fetching candidate events.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The SQL query file could not be read.
    #[error("failed to load SQL query from {path}: {source}")]
    QueryFile {
        path: String,
        #[source]
        source: io::Error,
    },

    /// The database query failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Result type for source operations.
pub type Result<T> = std::result::Result<T, SourceError>;

/// Supplies a batch of candidate events per poll cycle.
///
/// Implementations return records in source order; the tracker preserves
/// that order when filtering.
pub trait EventSource {
    /// Fetches the current batch of candidate events.
    fn fetch(&self) -> impl Future<Output = Result<Vec<EventRecord>>> + Send;
}

/// Reads a SQL query from a file under the queries directory.
///
/// The contents are trimmed; a missing or unreadable file is a
/// [`SourceError::QueryFile`].
pub fn load_sql_query(queries_dir: &Path, file_name: &str) -> Result<String> {
    let path = queries_dir.join(file_name);
    let sql = std::fs::read_to_string(&path).map_err(|source| SourceError::QueryFile {
        path: path.display().to_string(),
        source,
    })?;
    Ok(sql.trim().to_string())
}
