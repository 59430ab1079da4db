//! Binary entry point: wires configuration, the Postgres source, delivery
//! channels and the tracker together, then runs once or polls until a
//! shutdown signal arrives.

use std::process::ExitCode;

use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use event_alerts::config::AlertsConfig;
use event_alerts::notify::{Channel, EmailNotifier, NotifyError, TeamsNotifier};
use event_alerts::orchestrator::{run_cycle, run_loop};
use event_alerts::source::{PgEventSource, QueryParams};
use event_alerts::tracker::SentTracker;

#[derive(Debug, Parser)]
#[command(name = "event-alerts", version, about = "Scheduled event digest alerts")]
struct Cli {
    /// Run a single cycle and exit instead of polling.
    #[arg(long)]
    once: bool,

    /// Render the digest but deliver nothing and commit nothing.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("event_alerts=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let config = match AlertsConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };
    if config.database_url.is_empty() {
        error!("DATABASE_URL is not set");
        return ExitCode::FAILURE;
    }

    let pool = match PgPoolOptions::new()
        .max_connections(2)
        .connect_lazy(&config.database_url)
    {
        Ok(pool) => pool,
        Err(e) => {
            error!(error = %e, "invalid database URL");
            return ExitCode::FAILURE;
        }
    };

    let params = QueryParams {
        type_id: config.type_id,
        name_filter: config.name_filter.clone(),
        name_excluded: config.name_excluded.clone(),
        lookback_days: config.lookback_days,
    };
    let source = match PgEventSource::new(pool, &config.queries_dir, &config.query_file, params) {
        Ok(source) => source,
        Err(e) => {
            error!(error = %e, "failed to set up event source");
            return ExitCode::FAILURE;
        }
    };

    let tracker = SentTracker::new(config.state_file.clone(), config.retention_days);

    let notifiers = match build_notifiers(&cli, &config) {
        Ok(notifiers) => notifiers,
        Err(e) => {
            error!(error = %e, "failed to set up delivery channels");
            return ExitCode::FAILURE;
        }
    };
    if cli.dry_run {
        info!("dry run: channels disabled, tracker state will not change");
    } else if notifiers.is_empty() {
        warn!("no delivery channels enabled; cycles will fetch but never send");
    }

    let token = CancellationToken::new();
    spawn_signal_handler(token.clone());

    info!(
        state_file = %config.state_file.display(),
        poll_interval_hours = config.poll_interval_hours,
        once = cli.once,
        "event alerts starting"
    );

    if cli.once {
        match run_cycle(&tracker, &source, &notifiers, &config).await {
            Ok(report) => {
                info!(
                    fetched = report.fetched,
                    fresh = report.fresh,
                    delivered_channels = report.delivered_channels,
                    committed = report.committed,
                    "cycle complete"
                );
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!(error = %e, "cycle failed");
                ExitCode::FAILURE
            }
        }
    } else {
        run_loop(&tracker, &source, &notifiers, &config, token).await;
        info!("event alerts stopped");
        ExitCode::SUCCESS
    }
}

/// Builds the enabled channel set. A dry run gets no channels at all, which
/// the orchestrator treats as render-only.
fn build_notifiers(cli: &Cli, config: &AlertsConfig) -> Result<Vec<Channel>, NotifyError> {
    if cli.dry_run {
        return Ok(Vec::new());
    }

    let mut channels = Vec::new();
    if config.enable_email {
        channels.push(Channel::Email(EmailNotifier::from_config(config)?));
    }
    if config.enable_teams {
        match &config.teams_webhook_url {
            Some(url) => channels.push(Channel::Teams(TeamsNotifier::new(url.clone()))),
            None => warn!("teams alerts enabled but TEAMS_WEBHOOK_URL is not set"),
        }
    }
    Ok(channels)
}

/// Cancels the token on SIGINT or SIGTERM.
fn spawn_signal_handler(token: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut term = match signal(SignalKind::terminate()) {
                Ok(term) => term,
                Err(e) => {
                    error!(error = %e, "failed to install SIGTERM handler");
                    return;
                }
            };
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }
        info!("shutdown signal received");
        token.cancel();
    });
}
