//! Cycle orchestration.
//!
//! A cycle is: load tracker state, fetch candidates, filter out already-sent
//! events, render once, deliver through every channel, and commit the batch
//! if at least one channel succeeded. Channels fail independently; a single
//! channel outage neither blocks the others nor suppresses the commit.
//!
//! Delivery is at-least-once: the commit happens only after a successful
//! delivery, so a crash between delivery and persist re-sends rather than
//! silently drops.

use std::collections::BTreeSet;

use chrono::Utc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::AlertsConfig;
use crate::notify::Notifier;
use crate::render::Digest;
use crate::source::{EventSource, SourceError};
use crate::tracker::{LoadOutcome, SentTracker, TrackerError};

/// Errors that end a cycle.
#[derive(Debug, Error)]
pub enum CycleError {
    /// Fetching candidates failed; nothing was delivered.
    #[error("event source failed: {0}")]
    Source(#[from] SourceError),

    /// Every enabled channel failed for a non-empty batch; nothing was
    /// committed.
    #[error("all {failed} delivery channels failed")]
    Delivery { failed: usize },

    /// Deliveries went out but the commit could not be persisted. The next
    /// cycle will re-notify the batch.
    #[error("failed to persist tracker state: {0}")]
    Persist(#[from] TrackerError),
}

/// Result type for cycle operations.
pub type Result<T> = std::result::Result<T, CycleError>;

/// What one cycle did, for logging and tests.
#[derive(Debug)]
pub struct CycleReport {
    /// How tracker state was obtained.
    pub load: LoadOutcome,

    /// Candidates returned by the source.
    pub fetched: usize,

    /// Candidates remaining after deduplication.
    pub fresh: usize,

    /// Channels that accepted the digest.
    pub delivered_channels: usize,

    /// Event ids committed to the tracker this cycle.
    pub committed: usize,
}

/// Runs one poll-notify-commit cycle.
///
/// With an empty notifier list (dry run) the digest is rendered and logged
/// but nothing is delivered and nothing is committed, so tracker state on
/// disk is untouched.
pub async fn run_cycle<S, N>(
    tracker: &SentTracker,
    source: &S,
    notifiers: &[N],
    config: &AlertsConfig,
) -> Result<CycleReport>
where
    S: EventSource,
    N: Notifier,
{
    let (mut state, load) = tracker.load();

    let candidates = source.fetch().await?;
    let fresh = state.filter_unsent(&candidates);
    let fetched = candidates.len();
    let fresh_count = fresh.len();

    if fresh.is_empty() {
        info!(fetched, "no new events; nothing to send");
        return Ok(CycleReport {
            load,
            fetched,
            fresh: 0,
            delivered_channels: 0,
            committed: 0,
        });
    }

    let run_time = Utc::now();
    // Delivered ids come from the filtered batch itself, never from the
    // rendered output.
    let delivered: BTreeSet<_> = fresh.iter().filter_map(|e| e.id).collect();
    let digest = Digest::new(config, run_time, fresh);

    if notifiers.is_empty() {
        info!(
            subject = %digest.subject(),
            events = digest.events.len(),
            "dry run: skipping delivery and commit"
        );
        return Ok(CycleReport {
            load,
            fetched,
            fresh: fresh_count,
            delivered_channels: 0,
            committed: 0,
        });
    }

    let mut succeeded = 0usize;
    for notifier in notifiers {
        match notifier.deliver(&digest).await {
            Ok(()) => {
                info!(channel = notifier.name(), events = digest.events.len(), "digest delivered");
                succeeded += 1;
            }
            Err(e) => {
                error!(channel = notifier.name(), error = %e, "channel delivery failed");
            }
        }
    }

    if succeeded == 0 {
        warn!(
            channels = notifiers.len(),
            "no channel accepted the digest; leaving tracker state unchanged"
        );
        return Err(CycleError::Delivery {
            failed: notifiers.len(),
        });
    }

    state.commit(&delivered, run_time);
    state.touch();
    tracker.persist(&state)?;

    Ok(CycleReport {
        load,
        fetched,
        fresh: fresh_count,
        delivered_channels: succeeded,
        committed: delivered.len(),
    })
}

/// Runs cycles until cancelled.
///
/// A successful cycle sleeps for the poll interval; a failed one logs and
/// retries after the shorter cooldown. Cancellation interrupts either sleep.
pub async fn run_loop<S, N>(
    tracker: &SentTracker,
    source: &S,
    notifiers: &[N],
    config: &AlertsConfig,
    token: CancellationToken,
) where
    S: EventSource,
    N: Notifier,
{
    loop {
        if token.is_cancelled() {
            info!("shutdown requested; stopping poll loop");
            return;
        }

        let delay = match run_cycle(tracker, source, notifiers, config).await {
            Ok(report) => {
                info!(
                    fetched = report.fetched,
                    fresh = report.fresh,
                    delivered_channels = report.delivered_channels,
                    committed = report.committed,
                    "cycle complete"
                );
                config.poll_interval
            }
            Err(e) => {
                error!(error = %e, cooldown_secs = config.cycle_cooldown.as_secs(), "cycle failed");
                config.cycle_cooldown
            }
        };

        tokio::select! {
            _ = token.cancelled() => {
                info!("shutdown requested; stopping poll loop");
                return;
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
