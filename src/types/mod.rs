//! Core domain types.

mod event;
mod ids;

pub use event::EventRecord;
pub use ids::EventId;
