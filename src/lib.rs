//! Event Alerts - a scheduled notification pipeline for maritime event records.
//!
//! This library polls a relational database for event records matching
//! configurable filters, renders the results into email and Teams-webhook
//! digests, and tracks which events have already been notified so that a
//! given event is alerted at most once per retention window.

pub mod config;
pub mod notify;
pub mod orchestrator;
pub mod render;
pub mod source;
pub mod tracker;
pub mod types;
