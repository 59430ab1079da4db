//! The candidate-event record produced by the event source.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::EventId;

/// A domain event (e.g. a permit) fetched from the event source.
///
/// The `id` is optional because a misconfigured query can return rows without
/// an identifier column; deduplication degrades gracefully in that case
/// instead of failing the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Unique event identifier, if the source exposed one.
    pub id: Option<EventId>,

    /// Human-readable event name.
    pub name: String,

    /// When the event was created in the source system.
    pub created_at: DateTime<Utc>,

    /// Any additional columns the query returned, keyed by column name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl EventRecord {
    /// Creates a record with no extra attributes.
    pub fn new(id: Option<EventId>, name: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        EventRecord {
            id,
            name: name.into(),
            created_at,
            extra: BTreeMap::new(),
        }
    }
}
