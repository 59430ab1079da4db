//! Pure digest rendering.
//!
//! Everything in this module is a pure function of a [`Digest`]: no state is
//! mutated and no identifiers are extracted as a side effect of rendering.
//! The orchestrator computes the delivered-id set from the filtered batch
//! itself, never from rendered output.

mod html;
mod text;

pub use html::render_html;
pub use text::render_plain_text;

use chrono::{DateTime, Utc};

use crate::config::AlertsConfig;
use crate::types::EventRecord;

/// One cycle's worth of renderable content: the filtered events plus the
/// metadata shown in headers and footers.
#[derive(Debug, Clone)]
pub struct Digest {
    /// When the cycle ran.
    pub run_time: DateTime<Utc>,

    /// Human label for the event type (e.g. "Permit").
    pub event_label: String,

    /// Query lookback shown in the metadata block.
    pub lookback_days: i64,

    /// Cycle frequency shown in the metadata block, in hours.
    pub frequency_hours: u64,

    /// Company name for footers.
    pub company_name: String,

    /// Base URL for per-event links.
    pub event_link_base: String,

    /// The filtered, not-yet-notified events, in source order.
    pub events: Vec<EventRecord>,
}

impl Digest {
    /// Builds a digest from the filtered batch and configuration.
    pub fn new(config: &AlertsConfig, run_time: DateTime<Utc>, events: Vec<EventRecord>) -> Self {
        Digest {
            run_time,
            event_label: config.event_label.clone(),
            lookback_days: config.lookback_days,
            frequency_hours: config.poll_interval_hours,
            company_name: config.company_name.clone(),
            event_link_base: config.event_link_base.clone(),
            events,
        }
    }

    /// Email subject line, with count-aware pluralization.
    pub fn subject(&self) -> String {
        format!(
            "AlertDev | {} {} Event{} Found",
            self.events.len(),
            self.event_label,
            plural(self.events.len()),
        )
    }

    /// Link for one event, if it has an id.
    pub fn event_url(&self, event: &EventRecord) -> Option<String> {
        event
            .id
            .map(|id| format!("{}/{}", self.event_link_base.trim_end_matches('/'), id))
    }
}

/// "s" for counts other than one.
pub(crate) fn plural(count: usize) -> &'static str {
    if count == 1 { "" } else { "s" }
}
