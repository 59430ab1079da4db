//! Newtype wrappers for domain identifiers.
//!
//! These types prevent accidental mixing of different integer fields (e.g.
//! using an event-type id where an event id is expected) and make the code
//! more self-documenting.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The unique identifier of a domain event, stable across polls.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct EventId(pub i64);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for EventId {
    fn from(n: i64) -> Self {
        EventId(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn serde_roundtrip(n: i64) {
            let id = EventId(n);
            let json = serde_json::to_string(&id).unwrap();
            let parsed: EventId = serde_json::from_str(&json).unwrap();
            prop_assert_eq!(id, parsed);
        }

        #[test]
        fn display_format(n: i64) {
            prop_assert_eq!(format!("{}", EventId(n)), format!("{}", n));
        }

        #[test]
        fn ordering_matches_underlying(a: i64, b: i64) {
            prop_assert_eq!(EventId(a) < EventId(b), a < b);
        }
    }

    #[test]
    fn transparent_serde_is_a_bare_integer() {
        assert_eq!(serde_json::to_string(&EventId(42)).unwrap(), "42");
    }
}
