//! Delivery channels.
//!
//! Each notifier delivers a rendered digest independently and reports
//! success or failure; the orchestrator isolates failures per channel, so
//! one channel going down never blocks another and never suppresses the
//! commit when some other channel succeeded.

mod email;
mod teams;

pub use email::EmailNotifier;
pub use teams::TeamsNotifier;

use std::future::Future;

use thiserror::Error;

use crate::render::Digest;

/// Errors from a single delivery attempt.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// Building or sending the email failed.
    #[error("email delivery failed: {0}")]
    Email(String),

    /// The webhook POST failed or returned a non-success status.
    #[error("webhook delivery failed: {0}")]
    Webhook(String),
}

/// Result type for delivery operations.
pub type Result<T> = std::result::Result<T, NotifyError>;

/// A delivery channel for rendered digests.
///
/// Implementations must not mutate tracker state; they only report the
/// outcome of their own delivery attempt.
pub trait Notifier {
    /// Channel name used in logs ("email", "teams", ...).
    fn name(&self) -> &str;

    /// Delivers the digest through this channel.
    fn deliver(&self, digest: &Digest) -> impl Future<Output = Result<()>> + Send;
}

/// The production channel set, enum-dispatched so a heterogeneous list can
/// be passed to the orchestrator.
#[derive(Debug)]
pub enum Channel {
    Email(EmailNotifier),
    Teams(TeamsNotifier),
}

impl Notifier for Channel {
    fn name(&self) -> &str {
        match self {
            Channel::Email(n) => n.name(),
            Channel::Teams(n) => n.name(),
        }
    }

    async fn deliver(&self, digest: &Digest) -> Result<()> {
        match self {
            Channel::Email(n) => n.deliver(digest).await,
            Channel::Teams(n) => n.deliver(digest).await,
        }
    }
}
