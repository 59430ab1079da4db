//! In-memory tracker state: the mapping of notified events to timestamps.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::types::{EventId, EventRecord};

/// The tracker's aggregate state.
///
/// `entries` maps each notified event id to the time its notification was
/// last successfully committed. A sorted map keeps the serialized form stable
/// and diffable. `last_updated` records the most recent successful persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerState {
    /// Notified event ids and their commit timestamps.
    pub entries: BTreeMap<EventId, DateTime<Utc>>,

    /// When this state was last persisted.
    pub last_updated: DateTime<Utc>,
}

impl Default for TrackerState {
    fn default() -> Self {
        Self::empty()
    }
}

impl TrackerState {
    /// Creates an empty state.
    pub fn empty() -> Self {
        TrackerState {
            entries: BTreeMap::new(),
            last_updated: Utc::now(),
        }
    }

    /// Updates `last_updated` to now. Call before persisting.
    pub fn touch(&mut self) {
        self.last_updated = Utc::now();
    }

    /// Returns the candidates whose id is not yet recorded as sent.
    ///
    /// Input order and all fields are preserved. If any candidate lacks an
    /// id, deduplication cannot be trusted for the batch: the filter degrades
    /// to a no-op, returning every candidate unchanged, and logs a warning.
    /// Idempotent for a fixed state.
    pub fn filter_unsent(&self, candidates: &[EventRecord]) -> Vec<EventRecord> {
        if candidates.iter().any(|c| c.id.is_none()) {
            warn!(
                candidates = candidates.len(),
                "candidate batch is missing event ids; skipping deduplication"
            );
            return candidates.to_vec();
        }

        candidates
            .iter()
            .filter(|c| {
                // Checked above: every candidate has an id.
                c.id.map(|id| !self.entries.contains_key(&id))
                    .unwrap_or(true)
            })
            .cloned()
            .collect()
    }

    /// Records a set of delivered event ids at the given commit timestamp.
    ///
    /// Purely additive: a later commit for an id already present overwrites
    /// its timestamp (re-sending refreshes the suppression window). Entries
    /// are never removed here; expiry happens only on load. The orchestrator
    /// must only call this when at least one delivery channel succeeded for
    /// the batch.
    pub fn commit(&mut self, delivered: &BTreeSet<EventId>, at: DateTime<Utc>) {
        for id in delivered {
            self.entries.insert(*id, at);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use proptest::prelude::*;

    fn record(id: i64) -> EventRecord {
        EventRecord::new(Some(EventId(id)), format!("event {id}"), Utc::now())
    }

    fn record_without_id(name: &str) -> EventRecord {
        EventRecord::new(None, name, Utc::now())
    }

    fn state_with(ids: &[i64]) -> TrackerState {
        let mut state = TrackerState::empty();
        for id in ids {
            state.entries.insert(EventId(*id), Utc::now());
        }
        state
    }

    #[test]
    fn all_candidates_new_pass_through() {
        let state = state_with(&[99]);
        let candidates = vec![record(101), record(102)];

        let unsent = state.filter_unsent(&candidates);

        assert_eq!(unsent, candidates);
    }

    #[test]
    fn already_sent_candidates_are_suppressed() {
        let state = state_with(&[101, 102]);
        let candidates = vec![record(101), record(102)];

        let unsent = state.filter_unsent(&candidates);

        assert!(unsent.is_empty());
    }

    #[test]
    fn partially_sent_batch_keeps_only_new() {
        let state = state_with(&[101]);
        let candidates = vec![record(101), record(102)];

        let unsent = state.filter_unsent(&candidates);

        assert_eq!(unsent.len(), 1);
        assert_eq!(unsent[0].id, Some(EventId(102)));
    }

    #[test]
    fn missing_id_disables_dedupe_for_the_batch() {
        let state = state_with(&[101]);
        let candidates = vec![record(101), record_without_id("no id here")];

        let unsent = state.filter_unsent(&candidates);

        // Dedupe degrades to a no-op rather than dropping events it cannot
        // identify.
        assert_eq!(unsent, candidates);
    }

    #[test]
    fn empty_candidate_set_stays_empty() {
        let state = state_with(&[99]);
        assert!(state.filter_unsent(&[]).is_empty());
    }

    #[test]
    fn commit_overwrites_prior_timestamp() {
        let mut state = TrackerState::empty();
        let early = Utc::now() - Duration::days(2);
        let late = Utc::now();

        state.commit(&BTreeSet::from([EventId(7)]), early);
        state.commit(&BTreeSet::from([EventId(7)]), late);

        assert_eq!(state.entries.len(), 1);
        assert_eq!(state.entries[&EventId(7)], late);
    }

    #[test]
    fn commit_never_removes_entries() {
        let mut state = state_with(&[1, 2, 3]);

        state.commit(&BTreeSet::from([EventId(4)]), Utc::now());

        assert_eq!(state.entries.len(), 4);
    }

    proptest! {
        /// The filter returns exactly the candidates absent from the state,
        /// in input order.
        #[test]
        fn filter_is_exact_and_order_preserving(
            sent in prop::collection::btree_set(0i64..200, 0..20),
            candidate_ids in prop::collection::vec(0i64..200, 0..20),
        ) {
            let mut state = TrackerState::empty();
            for id in &sent {
                state.entries.insert(EventId(*id), Utc::now());
            }
            let candidates: Vec<_> = candidate_ids.iter().map(|id| record(*id)).collect();

            let unsent = state.filter_unsent(&candidates);

            let expected: Vec<_> = candidates
                .iter()
                .filter(|c| !sent.contains(&c.id.unwrap().0))
                .cloned()
                .collect();
            prop_assert_eq!(unsent, expected);
        }

        /// Filtering twice with the same state yields the same output.
        #[test]
        fn filter_is_idempotent(
            sent in prop::collection::btree_set(0i64..100, 0..10),
            candidate_ids in prop::collection::vec(0i64..100, 0..10),
        ) {
            let mut state = TrackerState::empty();
            for id in &sent {
                state.entries.insert(EventId(*id), Utc::now());
            }
            let candidates: Vec<_> = candidate_ids.iter().map(|id| record(*id)).collect();

            let once = state.filter_unsent(&candidates);
            let twice = state.filter_unsent(&once);

            prop_assert_eq!(once, twice);
        }

        /// Commit inserts every delivered id at the given timestamp.
        #[test]
        fn commit_records_all_delivered_ids(
            delivered in prop::collection::btree_set(0i64..1000, 0..20),
        ) {
            let mut state = TrackerState::empty();
            let at = Utc::now();
            let ids: BTreeSet<EventId> = delivered.iter().map(|n| EventId(*n)).collect();

            state.commit(&ids, at);

            prop_assert_eq!(state.entries.len(), ids.len());
            for id in &ids {
                prop_assert_eq!(state.entries[id], at);
            }
        }
    }
}
