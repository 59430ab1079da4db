//! Runtime configuration.
//!
//! All configuration is collected into one explicitly constructed
//! [`AlertsConfig`] at startup and passed into the orchestrator and tracker;
//! there are no process-wide mutable singletons. Values come from environment
//! variables with the defaults the operations team runs with.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Default event-type id queried ("permit" events).
const DEFAULT_EVENT_TYPE_ID: i32 = 18;

/// Default substring the event name must contain.
const DEFAULT_NAME_FILTER: &str = "hot";

/// Default substring that excludes an event.
const DEFAULT_NAME_EXCLUDED: &str = "vessel";

/// Default query lookback, in days.
const DEFAULT_LOOKBACK_DAYS: i64 = 17;

/// Default retention window for sent-event markers, in days.
const DEFAULT_RETENTION_DAYS: i64 = 30;

/// Default interval between poll cycles, in hours.
const DEFAULT_POLL_INTERVAL_HOURS: u64 = 1;

/// Cooldown after a failed cycle before the next attempt.
const DEFAULT_CYCLE_COOLDOWN_SECS: u64 = 60;

/// Base URL for per-event links in rendered digests.
const DEFAULT_EVENT_LINK_BASE: &str = "https://prominence.orca.tools/events";

/// Errors raised while building the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required variable is absent or empty.
    #[error("required configuration '{0}' is missing")]
    Missing(&'static str),

    /// A variable is present but not parseable as the expected type.
    #[error("configuration '{name}' has invalid value '{value}'")]
    Invalid { name: &'static str, value: String },
}

/// SMTP connection settings for the email channel.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub pass: String,
}

/// Complete runtime configuration for the alerts pipeline.
#[derive(Debug, Clone)]
pub struct AlertsConfig {
    /// Postgres connection string for the event source.
    pub database_url: String,

    /// Directory containing `.sql` query files.
    pub queries_dir: PathBuf,

    /// Query file name within `queries_dir`.
    pub query_file: String,

    /// Event-type id bound into the query.
    pub type_id: i32,

    /// Name substring the query matches (wrapped in `%...%`).
    pub name_filter: String,

    /// Name substring the query excludes (wrapped in `%...%`).
    pub name_excluded: String,

    /// How many days back the query looks.
    pub lookback_days: i64,

    /// Human label for the event type in rendered digests (e.g. "Permit").
    pub event_label: String,

    /// Base URL for per-event links.
    pub event_link_base: String,

    /// Company name shown in digest footers.
    pub company_name: String,

    /// SMTP settings; validated only when email alerts are enabled.
    pub smtp: SmtpConfig,

    /// Internal digest recipients.
    pub recipients: Vec<String>,

    /// Optional Teams channel inbound email (gets the logo-free digest).
    pub teams_channel_email: Option<String>,

    /// Optional inline logo attached to internal digest emails.
    pub logo_path: Option<PathBuf>,

    /// Teams incoming-webhook URL.
    pub teams_webhook_url: Option<String>,

    /// Whether the email channel is enabled.
    pub enable_email: bool,

    /// Whether the Teams webhook channel is enabled.
    pub enable_teams: bool,

    /// Path of the sent-event tracker state file.
    pub state_file: PathBuf,

    /// Retention window for sent-event markers, in days.
    pub retention_days: i64,

    /// Sleep between poll cycles.
    pub poll_interval: Duration,

    /// Hours between cycles, kept for display in rendered digests.
    pub poll_interval_hours: u64,

    /// Back-off after a failed cycle.
    pub cycle_cooldown: Duration,
}

impl AlertsConfig {
    /// Builds the configuration from environment variables.
    ///
    /// Returns an error when a value fails to parse, or when email alerts
    /// are enabled but the SMTP settings are incomplete. Startup is the only
    /// place configuration can fail; after this the pipeline never re-reads
    /// the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let enable_email = env_flag("ENABLE_EMAIL_ALERTS", true);
        let enable_teams = env_flag("ENABLE_TEAMS_ALERTS", false);

        let smtp = SmtpConfig {
            host: env_or("SMTP_HOST", ""),
            port: env_parse("SMTP_PORT", 465u16)?,
            user: env_or("SMTP_USER", ""),
            pass: env_or("SMTP_PASS", ""),
        };
        if enable_email {
            if smtp.host.is_empty() {
                return Err(ConfigError::Missing("SMTP_HOST"));
            }
            if smtp.user.is_empty() {
                return Err(ConfigError::Missing("SMTP_USER"));
            }
            if smtp.pass.is_empty() {
                return Err(ConfigError::Missing("SMTP_PASS"));
            }
        }

        let poll_interval_hours = env_parse("SCHEDULE_FREQUENCY", DEFAULT_POLL_INTERVAL_HOURS)?;

        Ok(AlertsConfig {
            database_url: env_or("DATABASE_URL", ""),
            queries_dir: PathBuf::from(env_or("QUERIES_DIR", "queries")),
            query_file: env_or("SQL_QUERY_FILE", "permit_events.sql"),
            type_id: env_parse("EVENT_TYPE_ID", DEFAULT_EVENT_TYPE_ID)?,
            name_filter: env_or("EVENT_NAME_FILTER", DEFAULT_NAME_FILTER),
            name_excluded: env_or("EVENT_EXCLUDE", DEFAULT_NAME_EXCLUDED),
            lookback_days: env_parse("EVENT_LOOKBACK_DAYS", DEFAULT_LOOKBACK_DAYS)?,
            event_label: env_or("EVENT_LABEL", "Permit"),
            event_link_base: env_or("EVENT_LINK_BASE", DEFAULT_EVENT_LINK_BASE),
            company_name: env_or("COMPANY_NAME", "Company"),
            smtp,
            recipients: split_list(&env_or("INTERNAL_RECIPIENTS", "")),
            teams_channel_email: non_empty(env_or("SPECIAL_TEAMS_EMAIL", ""))
                .filter(|_| env_flag("ENABLE_SPECIAL_TEAMS_EMAIL_ALERT", false)),
            logo_path: non_empty(env_or("COMPANY_LOGO", "")).map(PathBuf::from),
            teams_webhook_url: non_empty(env_or("TEAMS_WEBHOOK_URL", "")),
            enable_email,
            enable_teams,
            state_file: PathBuf::from(env_or("SENT_EVENTS_FILE", "data/sent_events.json")),
            retention_days: env_parse("RETENTION_WINDOW_DAYS", DEFAULT_RETENTION_DAYS)?,
            poll_interval: Duration::from_secs(poll_interval_hours * 3600),
            poll_interval_hours,
            cycle_cooldown: Duration::from_secs(env_parse(
                "CYCLE_COOLDOWN_SECS",
                DEFAULT_CYCLE_COOLDOWN_SECS,
            )?),
        })
    }
}

fn env_or(name: &str, default: &str) -> String {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => default.to_string(),
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(v) => matches!(v.trim(), "1" | "true" | "TRUE" | "True" | "yes"),
        Err(_) => default,
    }
}

fn env_parse<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => {
            v.trim()
                .parse()
                .map_err(|_| ConfigError::Invalid { name, value: v })
        }
        _ => Ok(default),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() { None } else { Some(s) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_list_trims_and_drops_empties() {
        assert_eq!(
            split_list(" a@x.com , b@x.com ,, "),
            vec!["a@x.com".to_string(), "b@x.com".to_string()]
        );
        assert!(split_list("").is_empty());
    }

    #[test]
    fn non_empty_maps_empty_to_none() {
        assert_eq!(non_empty(String::new()), None);
        assert_eq!(non_empty("x".to_string()), Some("x".to_string()));
    }
}
