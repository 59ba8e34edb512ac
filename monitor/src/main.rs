//! Intiwatch Monitor - bug bounty activity notifier.
//!
//! This binary polls the Intigriti researcher activity feed and forwards new
//! activity to a Slack or Discord webhook.
//!
//! # Commands
//!
//! - `intiwatch-monitor run`: Start the polling daemon
//! - `intiwatch-monitor check-auth`: Log in once and report the result
//!
//! # Environment Variables
//!
//! See `intiwatch_monitor::config` for available configuration options.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use intiwatch_monitor::auth::SessionAuthenticator;
use intiwatch_monitor::config::Config;
use intiwatch_monitor::scheduler::PollingScheduler;

/// Intiwatch Monitor - bug bounty activity notifier.
///
/// Logs into the researcher dashboard, polls for new activity and relays it
/// to a chat webhook.
#[derive(Parser, Debug)]
#[command(name = "intiwatch-monitor")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "\
ENVIRONMENT VARIABLES:
    INTIWATCH_USERNAME       Account e-mail (required)
    INTIWATCH_PASSWORD       Account password (required)
    INTIWATCH_TOTP_SECRET    Base32 TOTP seed, if 2FA is enabled
    INTIWATCH_WEBHOOK_URL    Slack or Discord webhook URL (required)
    INTIWATCH_WEBHOOK_TYPE   slack | discord (default: slack)
    INTIWATCH_WEBHOOK_RATE   Webhook sends per second (default: 2)
    INTIWATCH_TICK_SECS      Polling interval in seconds (default: 60)
    INTIWATCH_SEND_LAST      Activities to replay on the first poll (default: 0)
    INTIWATCH_LOG_FORMAT     Set to 'json' for JSON log lines
    RUST_LOG                 Log filter (default: info)

SIGNALS:
    SIGINT, SIGTERM          Stop after the current poll
    SIGHUP                   Re-read the environment before the next poll

EXAMPLES:
    # Verify credentials and 2FA
    intiwatch-monitor check-auth

    # Poll every 5 minutes, resending the 3 most recent activities once
    intiwatch-monitor run --tick 300 --last 3
")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// CLI subcommands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Start the polling daemon.
    Run(RunArgs),

    /// Log in once and report whether the session is valid.
    CheckAuth,
}

/// Overrides for the `run` command; they win over the environment.
#[derive(clap::Args, Debug, Clone, Copy)]
struct RunArgs {
    /// Resend this many of the most recent activities on the first poll.
    #[arg(short, long)]
    last: Option<usize>,

    /// Polling interval in seconds.
    #[arg(short, long, value_parser = clap::value_parser!(u64).range(1..))]
    tick: Option<u64>,
}

impl RunArgs {
    fn apply(self, mut config: Config) -> Config {
        if let Some(last) = self.last {
            config.send_last = last;
        }
        if let Some(tick) = self.tick {
            config.tick = Duration::from_secs(tick);
        }
        config
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;

    match cli.command {
        Command::Run(args) => runtime.block_on(run_monitor(args)),
        Command::CheckAuth => runtime.block_on(run_check_auth()),
    }
}

/// Runs the polling daemon until SIGINT or SIGTERM.
async fn run_monitor(args: RunArgs) -> Result<()> {
    info!("Starting Intiwatch Monitor");

    let config = args.apply(Config::from_env().context("Failed to load configuration")?);

    info!(
        username = %config.credentials.username,
        provider = %config.webhook_provider,
        tick_secs = config.tick.as_secs(),
        two_factor = config.credentials.totp_secret().is_some(),
        "Configuration loaded"
    );

    let mut scheduler =
        PollingScheduler::new(config.clone()).context("Failed to initialize monitor")?;

    let cancel = CancellationToken::new();
    let (reload_tx, reload_rx) = watch::channel(config);
    let signals = tokio::spawn(handle_signals(cancel.clone(), reload_tx, args));

    scheduler.run(cancel.clone(), reload_rx).await;

    cancel.cancel();
    signals.abort();
    info!("Monitor stopped");
    Ok(())
}

/// Logs in once and reports the outcome.
async fn run_check_auth() -> Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;

    let mut session = SessionAuthenticator::new(config.credentials, config.endpoints)
        .context("Failed to create HTTP client")?;

    match session.authenticate().await {
        Ok(()) => {
            println!("Authenticated as {}", session.credentials().username);
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Authentication failed");
            Err(e).context("Authentication failed")
        }
    }
}

/// Initializes the logging subsystem.
///
/// `INTIWATCH_LOG_FORMAT=json` switches to JSON lines.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("INTIWATCH_LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_level(true)
            .init();
    }
}

/// Cancels on SIGINT/SIGTERM; re-reads the environment on SIGHUP.
async fn handle_signals(cancel: CancellationToken, reload: watch::Sender<Config>, args: RunArgs) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal as unix_signal, SignalKind};

        let mut terminate =
            unix_signal(SignalKind::terminate()).expect("Failed to install SIGTERM handler");
        let mut hangup =
            unix_signal(SignalKind::hangup()).expect("Failed to install SIGHUP handler");

        loop {
            tokio::select! {
                result = signal::ctrl_c() => {
                    result.expect("Failed to install Ctrl+C handler");
                    break;
                }
                _ = terminate.recv() => break,
                _ = hangup.recv() => match Config::from_env() {
                    Ok(config) => {
                        info!("Reload signal received");
                        if reload.send(args.apply(config)).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(error = %e, "Ignoring reload, configuration invalid"),
                },
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = (&reload, args);
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    }

    info!("Shutdown signal received");
    cancel.cancel();
}
