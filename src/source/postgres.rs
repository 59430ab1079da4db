//! Postgres-backed event source.
//!
//! The query text lives in a `.sql` file (loaded once at construction) and
//! takes four positional parameters:
//!
//! 1. `$1` - event-type id (`i32`)
//! 2. `$2` - name filter pattern, already wrapped in `%...%` (`text`)
//! 3. `$3` - name exclusion pattern, already wrapped in `%...%` (`text`)
//! 4. `$4` - lookback window in days (`i64`)
//!
//! The result set must expose `id` (nullable bigint), `event_name` (text)
//! and `created_at` (timestamptz) columns. A NULL `id` maps to
//! `EventRecord::id == None`, which downstream deduplication handles by
//! degrading gracefully.

use std::path::Path;

use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use sqlx::Row;
use tracing::{debug, info};

use super::{load_sql_query, EventSource, Result};
use crate::types::{EventId, EventRecord};

/// Filter parameters bound into the candidate-event query.
#[derive(Debug, Clone)]
pub struct QueryParams {
    /// Event-type id to match.
    pub type_id: i32,

    /// Substring the event name must contain (bound as `%value%`).
    pub name_filter: String,

    /// Substring that excludes an event (bound as `%value%`).
    pub name_excluded: String,

    /// How many days back to look.
    pub lookback_days: i64,
}

/// Candidate-event source backed by a Postgres pool.
#[derive(Debug, Clone)]
pub struct PgEventSource {
    pool: PgPool,
    sql: String,
    params: QueryParams,
}

impl PgEventSource {
    /// Creates a source, loading the SQL text from `queries_dir/query_file`.
    pub fn new(
        pool: PgPool,
        queries_dir: &Path,
        query_file: &str,
        params: QueryParams,
    ) -> Result<Self> {
        let sql = load_sql_query(queries_dir, query_file)?;
        debug!(query_file, "loaded candidate-event query");
        Ok(PgEventSource { pool, sql, params })
    }
}

impl EventSource for PgEventSource {
    async fn fetch(&self) -> Result<Vec<EventRecord>> {
        debug!(
            type_id = self.params.type_id,
            name_filter = %self.params.name_filter,
            name_excluded = %self.params.name_excluded,
            lookback_days = self.params.lookback_days,
            "querying candidate events"
        );

        let rows = sqlx::query(&self.sql)
            .bind(self.params.type_id)
            .bind(format!("%{}%", self.params.name_filter))
            .bind(format!("%{}%", self.params.name_excluded))
            .bind(self.params.lookback_days)
            .fetch_all(&self.pool)
            .await?;

        let mut events = Vec::with_capacity(rows.len());
        for row in rows {
            let id: Option<i64> = row.try_get("id")?;
            let name: String = row.try_get("event_name")?;
            let created_at: DateTime<Utc> = row.try_get("created_at")?;
            events.push(EventRecord::new(id.map(EventId), name, created_at));
        }

        info!(count = events.len(), "fetched candidate events");
        Ok(events)
    }
}
