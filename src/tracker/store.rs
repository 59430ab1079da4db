//! Durable storage for tracker state.
//!
//! # File Format
//!
//! The current schema is a JSON document:
//!
//! ```json
//! {
//!   "sent_events": { "<event_id>": "<RFC 3339 timestamp>", ... },
//!   "last_updated": "<RFC 3339 timestamp>",
//!   "total_count": <n>
//! }
//! ```
//!
//! A legacy shape (a flat id list with no per-entry timestamps) is accepted
//! on read only and migrated by stamping every id with the load time:
//!
//! ```json
//! { "sent_event_ids": [<event_id>, ...], "last_updated": "...", "total_count": <n> }
//! ```
//!
//! Parse precedence is explicit: current schema first, then legacy, then the
//! file is treated as corrupt and the tracker starts empty.
//!
//! # Atomic Writes
//!
//! Saves use a write-to-temp-then-rename pattern (write `<path>.tmp`, fsync
//! the file, rename, fsync the directory) so readers always see either the
//! old or the new state, never a partial write.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::fsync::{fsync_dir, fsync_file};
use super::state::TrackerState;
use super::Result;
use crate::types::EventId;

/// Current on-disk schema.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedState {
    /// Event id (as a JSON object key, hence a string) to sent-at timestamp.
    sent_events: BTreeMap<String, String>,

    /// When the file was last written.
    #[serde(default = "Utc::now")]
    last_updated: DateTime<Utc>,

    /// Entry count, written for operator convenience; never trusted on read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    total_count: Option<usize>,
}

/// Legacy on-disk schema: a flat id list with no per-entry timestamps.
#[derive(Debug, Deserialize)]
struct LegacyPersistedState {
    sent_event_ids: Vec<i64>,
}

/// How a [`SentTracker::load`] obtained its state.
///
/// Callers can distinguish "nothing to load" from "something was lost"
/// without changing the recovery behavior: every variant still yields a
/// usable state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// No state file existed; started empty.
    Absent,

    /// Parsed the current schema.
    Loaded {
        /// Entries retained after normalization.
        kept: usize,
        /// Entries dropped because their timestamp fell outside the
        /// retention window.
        expired: usize,
        /// Entries dropped because their id or timestamp was unparseable.
        invalid: usize,
    },

    /// Migrated the legacy id-list schema, stamping each id with the load
    /// time.
    Migrated {
        /// Ids carried over from the legacy list.
        migrated: usize,
    },

    /// The file existed but was not valid JSON in any recognized shape;
    /// started empty.
    Corrupted,

    /// The file existed but could not be read; started empty.
    Unreadable,
}

impl LoadOutcome {
    /// Number of entries that were dropped during load.
    pub fn dropped(&self) -> usize {
        match self {
            LoadOutcome::Loaded {
                expired, invalid, ..
            } => expired + invalid,
            _ => 0,
        }
    }
}

/// Owns read/write access to the persisted tracker state.
///
/// Single-writer, single-reader: no other process is assumed to touch the
/// state file concurrently.
#[derive(Debug, Clone)]
pub struct SentTracker {
    path: PathBuf,
    retention: Duration,
}

impl SentTracker {
    /// Creates a tracker backed by the given state file, forgetting entries
    /// older than `retention_days`.
    pub fn new(path: impl Into<PathBuf>, retention_days: i64) -> Self {
        SentTracker {
            path: path.into(),
            retention: Duration::days(retention_days),
        }
    }

    /// Path of the backing state file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads and normalizes the persisted state.
    ///
    /// Never fails: a missing, unreadable, or corrupt file degrades to an
    /// empty state, with the reason reported in the [`LoadOutcome`].
    /// Normalization drops entries with unparseable ids or timestamps and
    /// prunes entries older than `now - retention`; if anything was dropped
    /// or migrated, the normalized state is written back immediately so the
    /// on-disk file never re-grows against an in-memory view that already
    /// forgot them, and a migrated file is re-stamped only once.
    pub fn load(&self) -> (TrackerState, LoadOutcome) {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no tracker state file; starting empty");
                return (TrackerState::empty(), LoadOutcome::Absent);
            }
            Err(e) => {
                error!(
                    path = %self.path.display(),
                    error = %e,
                    "failed to read tracker state; starting empty"
                );
                return (TrackerState::empty(), LoadOutcome::Unreadable);
            }
        };

        let (mut state, outcome) = self.parse(&bytes);

        let migrated = matches!(outcome, LoadOutcome::Migrated { .. });
        if outcome.dropped() > 0 || migrated {
            state.touch();
            if let Err(e) = self.persist(&state) {
                // Not fatal here: the in-memory view is already pruned, and
                // the next successful persist catches the file up.
                error!(
                    path = %self.path.display(),
                    error = %e,
                    "failed to write back pruned tracker state"
                );
            }
        }

        (state, outcome)
    }

    /// Parses file contents, trying the current schema, then the legacy
    /// schema, then giving up.
    fn parse(&self, bytes: &[u8]) -> (TrackerState, LoadOutcome) {
        if let Ok(doc) = serde_json::from_slice::<PersistedState>(bytes) {
            return self.normalize(doc);
        }

        if let Ok(legacy) = serde_json::from_slice::<LegacyPersistedState>(bytes) {
            let now = Utc::now();
            let entries: BTreeMap<EventId, DateTime<Utc>> = legacy
                .sent_event_ids
                .iter()
                .map(|id| (EventId(*id), now))
                .collect();
            let migrated = entries.len();
            info!(
                migrated,
                "migrated legacy sent-event list to timestamped format"
            );
            return (
                TrackerState {
                    entries,
                    last_updated: now,
                },
                LoadOutcome::Migrated { migrated },
            );
        }

        warn!(
            path = %self.path.display(),
            "tracker state file is not valid JSON in any recognized shape; starting empty"
        );
        (TrackerState::empty(), LoadOutcome::Corrupted)
    }

    /// Converts a parsed document into tracker state, dropping invalid
    /// entries and pruning everything older than the retention cutoff.
    fn normalize(&self, doc: PersistedState) -> (TrackerState, LoadOutcome) {
        let cutoff = Utc::now() - self.retention;
        let mut entries = BTreeMap::new();
        let mut invalid = 0usize;
        let mut expired = 0usize;

        for (raw_id, raw_ts) in &doc.sent_events {
            let id = match raw_id.parse::<i64>() {
                Ok(n) => EventId(n),
                Err(_) => {
                    warn!(entry = %raw_id, "dropping tracker entry with unparseable id");
                    invalid += 1;
                    continue;
                }
            };
            let sent_at = match DateTime::parse_from_rfc3339(raw_ts) {
                Ok(dt) => dt.with_timezone(&Utc),
                Err(_) => {
                    warn!(
                        event_id = %id,
                        timestamp = %raw_ts,
                        "dropping tracker entry with unparseable timestamp"
                    );
                    invalid += 1;
                    continue;
                }
            };
            if sent_at < cutoff {
                expired += 1;
                continue;
            }
            entries.insert(id, sent_at);
        }

        let kept = entries.len();
        if expired > 0 {
            info!(expired, retention_days = self.retention.num_days(), "pruned expired tracker entries");
        }

        (
            TrackerState {
                entries,
                last_updated: doc.last_updated,
            },
            LoadOutcome::Loaded {
                kept,
                expired,
                invalid,
            },
        )
    }

    /// Atomically replaces the state file with the given state.
    ///
    /// Serializes entries sorted by id (stable diffs) plus `last_updated`.
    /// Unlike `load`, a failure here propagates: the caller must know the
    /// write was lost, because future cycles would otherwise re-notify
    /// already-sent events.
    pub fn persist(&self, state: &TrackerState) -> Result<()> {
        let doc = PersistedState {
            sent_events: state
                .entries
                .iter()
                .map(|(id, ts)| (id.to_string(), ts.to_rfc3339()))
                .collect(),
            last_updated: state.last_updated,
            total_count: Some(state.entries.len()),
        };
        let bytes = serde_json::to_vec_pretty(&doc)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let tmp_path = tmp_path_for(&self.path);
        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp_path)?;
            file.write_all(&bytes)?;
            fsync_file(&file)?;
        }
        std::fs::rename(&tmp_path, &self.path)?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fsync_dir(parent)?;
            }
        }

        debug!(
            path = %self.path.display(),
            entries = state.entries.len(),
            "persisted tracker state"
        );
        Ok(())
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(".tmp");
    PathBuf::from(os)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::TrackerError;
    use proptest::prelude::*;
    use std::collections::BTreeSet;
    use tempfile::tempdir;

    fn tracker_in(dir: &Path) -> SentTracker {
        SentTracker::new(dir.join("sent_events.json"), 30)
    }

    fn rfc3339_days_ago(days: i64) -> String {
        (Utc::now() - Duration::days(days)).to_rfc3339()
    }

    fn write_state_file(tracker: &SentTracker, json: &str) {
        std::fs::write(tracker.path(), json).unwrap();
    }

    // ─── load ───

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempdir().unwrap();
        let tracker = tracker_in(dir.path());

        let (state, outcome) = tracker.load();

        assert!(state.entries.is_empty());
        assert_eq!(outcome, LoadOutcome::Absent);
    }

    #[test]
    fn corrupted_file_loads_empty_without_panicking() {
        let dir = tempdir().unwrap();
        let tracker = tracker_in(dir.path());
        write_state_file(&tracker, "{ invalid json content");

        let (state, outcome) = tracker.load();

        assert!(state.entries.is_empty());
        assert_eq!(outcome, LoadOutcome::Corrupted);
    }

    #[test]
    fn wrong_shape_is_corrupted_not_fatal() {
        let dir = tempdir().unwrap();
        let tracker = tracker_in(dir.path());
        write_state_file(&tracker, r#"["not", "an", "object"]"#);

        let (state, outcome) = tracker.load();

        assert!(state.entries.is_empty());
        assert_eq!(outcome, LoadOutcome::Corrupted);
    }

    #[test]
    fn loads_current_schema() {
        let dir = tempdir().unwrap();
        let tracker = tracker_in(dir.path());
        let json = format!(
            r#"{{ "sent_events": {{ "99": "{ts}", "100": "{ts}" }}, "last_updated": "{ts}" }}"#,
            ts = rfc3339_days_ago(1)
        );
        write_state_file(&tracker, &json);

        let (state, outcome) = tracker.load();

        assert_eq!(state.entries.len(), 2);
        assert!(state.entries.contains_key(&EventId(99)));
        assert!(state.entries.contains_key(&EventId(100)));
        assert_eq!(
            outcome,
            LoadOutcome::Loaded {
                kept: 2,
                expired: 0,
                invalid: 0
            }
        );
    }

    #[test]
    fn legacy_list_is_migrated_with_load_time_stamps() {
        let dir = tempdir().unwrap();
        let tracker = tracker_in(dir.path());
        write_state_file(
            &tracker,
            r#"{
                "sent_event_ids": [1, 2, 3],
                "last_updated": "2025-10-28T15:30:00+02:00",
                "total_count": 3
            }"#,
        );

        let before = Utc::now();
        let (state, outcome) = tracker.load();
        let after = Utc::now();

        assert_eq!(outcome, LoadOutcome::Migrated { migrated: 3 });
        assert_eq!(
            state.entries.keys().copied().collect::<Vec<_>>(),
            vec![EventId(1), EventId(2), EventId(3)]
        );
        for sent_at in state.entries.values() {
            assert!(*sent_at >= before && *sent_at <= after);
        }
        // Migration rewrites the file in the current schema straight away.
        let contents = std::fs::read_to_string(tracker.path()).unwrap();
        assert!(contents.contains("sent_events"));
        assert!(!contents.contains("sent_event_ids"));
    }

    #[test]
    fn unparseable_timestamps_are_dropped_individually() {
        let dir = tempdir().unwrap();
        let tracker = tracker_in(dir.path());
        let json = format!(
            r#"{{
                "sent_events": {{
                    "1": "{good}",
                    "2": "not a timestamp",
                    "bad-id": "{good}"
                }},
                "last_updated": "{good}"
            }}"#,
            good = rfc3339_days_ago(1)
        );
        write_state_file(&tracker, &json);

        let (state, outcome) = tracker.load();

        assert_eq!(state.entries.len(), 1);
        assert!(state.entries.contains_key(&EventId(1)));
        assert_eq!(
            outcome,
            LoadOutcome::Loaded {
                kept: 1,
                expired: 0,
                invalid: 2
            }
        );
    }

    #[test]
    fn entries_outside_retention_window_are_pruned() {
        let dir = tempdir().unwrap();
        let tracker = tracker_in(dir.path());
        let json = format!(
            r#"{{
                "sent_events": {{
                    "1": "{too_old}",
                    "2": "{recent}"
                }},
                "last_updated": "{recent}"
            }}"#,
            too_old = rfc3339_days_ago(31),
            recent = rfc3339_days_ago(29),
        );
        write_state_file(&tracker, &json);

        let (state, outcome) = tracker.load();

        assert!(!state.entries.contains_key(&EventId(1)));
        assert!(state.entries.contains_key(&EventId(2)));
        assert_eq!(
            outcome,
            LoadOutcome::Loaded {
                kept: 1,
                expired: 1,
                invalid: 0
            }
        );
    }

    #[test]
    fn pruned_state_is_written_back_to_disk() {
        let dir = tempdir().unwrap();
        let tracker = tracker_in(dir.path());
        let json = format!(
            r#"{{ "sent_events": {{ "1": "{old}", "2": "{fresh}" }}, "last_updated": "{fresh}" }}"#,
            old = rfc3339_days_ago(40),
            fresh = rfc3339_days_ago(1),
        );
        write_state_file(&tracker, &json);

        tracker.load();

        // A second load must not resurrect the expired entry from disk.
        let contents = std::fs::read_to_string(tracker.path()).unwrap();
        assert!(!contents.contains("\"1\""));
        assert!(contents.contains("\"2\""));
    }

    // ─── persist ───

    #[test]
    fn persist_then_load_roundtrips() {
        let dir = tempdir().unwrap();
        let tracker = tracker_in(dir.path());
        let mut state = TrackerState::empty();
        state.commit(
            &BTreeSet::from([EventId(101), EventId(102)]),
            Utc::now() - Duration::hours(1),
        );
        state.touch();

        tracker.persist(&state).unwrap();
        let (loaded, outcome) = tracker.load();

        assert_eq!(loaded.entries, state.entries);
        assert_eq!(
            outcome,
            LoadOutcome::Loaded {
                kept: 2,
                expired: 0,
                invalid: 0
            }
        );
    }

    #[test]
    fn persist_leaves_no_temp_file() {
        let dir = tempdir().unwrap();
        let tracker = tracker_in(dir.path());

        tracker.persist(&TrackerState::empty()).unwrap();

        assert!(tracker.path().exists());
        assert!(!tmp_path_for(tracker.path()).exists());
    }

    #[test]
    fn persist_failure_is_visible() {
        let dir = tempdir().unwrap();
        // Parent "file.txt" is a regular file, so creating the state file
        // underneath it must fail.
        let blocker = dir.path().join("file.txt");
        std::fs::write(&blocker, "x").unwrap();
        let tracker = SentTracker::new(blocker.join("sent_events.json"), 30);

        let result = tracker.persist(&TrackerState::empty());

        assert!(matches!(result, Err(TrackerError::Io(_))));
    }

    #[test]
    fn persist_writes_sorted_object_with_count() {
        let dir = tempdir().unwrap();
        let tracker = tracker_in(dir.path());
        let mut state = TrackerState::empty();
        state.commit(&BTreeSet::from([EventId(2), EventId(1)]), Utc::now());
        state.touch();

        tracker.persist(&state).unwrap();

        let doc: serde_json::Value =
            serde_json::from_slice(&std::fs::read(tracker.path()).unwrap()).unwrap();
        assert_eq!(doc["total_count"], 2);
        assert!(doc["sent_events"].get("1").is_some());
        assert!(doc["sent_events"].get("2").is_some());
        assert!(doc.get("last_updated").is_some());
    }

    #[test]
    fn commit_persist_load_sequence_retains_delivered_ids() {
        let dir = tempdir().unwrap();
        let tracker = tracker_in(dir.path());
        let at = Utc::now() - Duration::minutes(5);

        let (mut state, _) = tracker.load();
        state.commit(&BTreeSet::from([EventId(101), EventId(102)]), at);
        state.touch();
        tracker.persist(&state).unwrap();

        let (reloaded, _) = tracker.load();
        // RFC 3339 serialization preserves the instant exactly.
        assert_eq!(reloaded.entries[&EventId(101)], at);
        assert_eq!(reloaded.entries[&EventId(102)], at);
    }

    // ─── property tests ───

    fn arb_entries() -> impl Strategy<Value = BTreeMap<EventId, DateTime<Utc>>> {
        // Timestamps a whole number of seconds in the past, safely inside
        // the 30-day retention window.
        prop::collection::btree_map(
            (0i64..1_000_000).prop_map(EventId),
            (0i64..60 * 60 * 24 * 29).prop_map(|secs| Utc::now() - Duration::seconds(secs)),
            0..20,
        )
    }

    proptest! {
        /// load(persist(S)) == S for states with valid, non-expired entries.
        #[test]
        fn persist_load_roundtrip(entries in arb_entries()) {
            let dir = tempdir().unwrap();
            let tracker = tracker_in(dir.path());
            let state = TrackerState { entries, last_updated: Utc::now() };

            tracker.persist(&state).unwrap();
            let (loaded, _) = tracker.load();

            // Sub-second precision survives RFC 3339, but equality is
            // checked per entry to pinpoint failures.
            prop_assert_eq!(loaded.entries.len(), state.entries.len());
            for (id, ts) in &state.entries {
                prop_assert_eq!(&loaded.entries[id], ts);
            }
        }

        /// Expiry boundary: one day inside the window survives, one day
        /// outside does not.
        #[test]
        fn expiry_boundary(window in 2i64..365) {
            let dir = tempdir().unwrap();
            let tracker = SentTracker::new(dir.path().join("state.json"), window);
            let json = format!(
                r#"{{ "sent_events": {{ "1": "{inside}", "2": "{outside}" }}, "last_updated": "{inside}" }}"#,
                inside = rfc3339_days_ago(window - 1),
                outside = rfc3339_days_ago(window + 1),
            );
            std::fs::write(tracker.path(), json).unwrap();

            let (state, _) = tracker.load();

            prop_assert!(state.entries.contains_key(&EventId(1)));
            prop_assert!(!state.entries.contains_key(&EventId(2)));
        }
    }
}
