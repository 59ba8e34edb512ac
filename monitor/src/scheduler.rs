//! The polling loop.
//!
//! Each tick runs strictly after the previous one:
//!
//! ```text
//! Idle → Authenticating → CountChecking ─(0)──────────────────────────▶ Idle
//!                                       └─(n)→ Fetching → Dispatching → WatermarkAdvance → Idle
//! ```
//!
//! The watermark is read once at the start of a tick. Cancellation is honoured
//! until counting completes; once dispatching starts the tick runs to the end.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::auth::SessionAuthenticator;
use crate::config::Config;
use crate::error::MonitorError;
use crate::gateway::ActivityGateway;
use crate::notify::{DispatchOutcome, NotificationDispatcher};
use crate::rate_limit::RateLimiter;

/// How a tick ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Cancelled before counting completed.
    Cancelled,
    /// The session could not be established.
    AuthFailed,
    /// The activity count could not be fetched.
    CountFailed,
    /// Nothing new since the watermark.
    NoChanges,
    /// The activity list could not be fetched.
    FetchFailed,
    /// Activities were handed to the dispatcher.
    Dispatched,
}

impl TickOutcome {
    /// Whether the watermark moves forward after a tick ending this way.
    #[must_use]
    pub fn advances_watermark(self) -> bool {
        matches!(self, Self::CountFailed | Self::FetchFailed | Self::Dispatched)
    }
}

/// Summary of one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub outcome: TickOutcome,
    /// Notifications delivered.
    pub dispatched: usize,
    /// Activities deliberately not sent.
    pub skipped: usize,
    /// Activities whose notification failed.
    pub failed: usize,
    /// Watermark after the tick.
    pub watermark: i64,
}

/// Timer-driven owner of the session, the gateway and the dispatcher.
pub struct PollingScheduler {
    gateway: ActivityGateway,
    dispatcher: NotificationDispatcher,
    config: Config,
    /// Extra leading activities to send on the first counted tick.
    replay_last: usize,
}

impl PollingScheduler {
    /// Builds the session, gateway and dispatcher described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError`] if an HTTP client cannot be created.
    pub fn new(config: Config) -> Result<Self, MonitorError> {
        let session =
            SessionAuthenticator::new(config.credentials.clone(), config.endpoints.clone())?;
        let dispatcher = NotificationDispatcher::new(
            config.webhook_url.clone(),
            config.webhook_provider,
            RateLimiter::with_rate(config.webhook_rate),
        )?;

        Ok(Self::from_parts(ActivityGateway::new(session), dispatcher, config))
    }

    /// Assembles a scheduler from prepared components.
    #[must_use]
    pub fn from_parts(
        gateway: ActivityGateway,
        dispatcher: NotificationDispatcher,
        config: Config,
    ) -> Self {
        Self {
            gateway,
            dispatcher,
            replay_last: config.send_last,
            config,
        }
    }

    #[must_use]
    pub fn gateway(&self) -> &ActivityGateway {
        &self.gateway
    }

    /// Runs ticks until `cancel` fires.
    ///
    /// Configuration published on `reload` is applied before the next tick.
    pub async fn run(&mut self, cancel: CancellationToken, mut reload: watch::Receiver<Config>) {
        let mut ticker = ticker(Instant::now(), self.config.tick);
        info!(
            tick_secs = self.config.tick.as_secs(),
            watermark = self.gateway.session().watermark(),
            "Polling started"
        );

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if reload.has_changed().unwrap_or(false) {
                let config = reload.borrow_and_update().clone();
                let old_tick = self.config.tick;
                match self.apply_config(config) {
                    Ok(()) if self.config.tick != old_tick => {
                        ticker = ticker_after(self.config.tick);
                    }
                    Ok(()) => {}
                    Err(e) => error!(error = %e, "Failed to apply reloaded configuration"),
                }
            }

            let report = self.run_tick(&cancel).await;
            if report.outcome == TickOutcome::Cancelled {
                break;
            }
        }

        info!(
            watermark = self.gateway.session().watermark(),
            "Polling stopped"
        );
    }

    /// Runs one tick and reports how it ended.
    pub async fn run_tick(&mut self, cancel: &CancellationToken) -> TickReport {
        let watermark = self.gateway.session().watermark();
        let mut report = TickReport {
            outcome: TickOutcome::NoChanges,
            dispatched: 0,
            skipped: 0,
            failed: 0,
            watermark,
        };

        let counted = tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            result = self.count_phase(watermark) => Some(result),
        };

        let count = match counted {
            None => {
                info!("Tick cancelled before counting completed");
                report.outcome = TickOutcome::Cancelled;
                return report;
            }
            Some(Err(outcome)) => {
                report.outcome = outcome;
                return self.finish(report);
            }
            Some(Ok(0)) => return self.finish(report),
            Some(Ok(count)) => count,
        };

        let batch = match self.gateway.list_activities().await {
            Ok(batch) => batch,
            Err(e) => {
                error!(error = %e, "Failed to fetch activities");
                report.outcome = TickOutcome::FetchFailed;
                return self.finish(report);
            }
        };

        let events = batch.leading(count);
        if events.len() < count {
            warn!(
                expected = count,
                available = events.len(),
                "Activity list shorter than count"
            );
        }

        report.outcome = TickOutcome::Dispatched;
        for event in events {
            match self.dispatcher.dispatch(event, &mut self.gateway).await {
                Ok(DispatchOutcome::Sent) => report.dispatched += 1,
                Ok(DispatchOutcome::Skipped) => report.skipped += 1,
                Err(e) => {
                    warn!(
                        error = %e,
                        discriminator = event.discriminator,
                        program = %event.program_name,
                        "Failed to send notification"
                    );
                    report.failed += 1;
                }
            }
        }

        self.finish(report)
    }

    /// Authenticates and counts new activity, adding any pending replay.
    async fn count_phase(&mut self, watermark: i64) -> Result<usize, TickOutcome> {
        if let Err(e) = self.gateway.session_mut().authenticate().await {
            if e.is_configuration_error() {
                error!(error = %e, "Authentication cannot succeed with current configuration");
            } else {
                error!(error = %e, "Authentication failed");
            }
            return Err(TickOutcome::AuthFailed);
        }

        let count = self.gateway.count_since(watermark).await.map_err(|e| {
            error!(error = %e, "Failed to count new activity");
            TickOutcome::CountFailed
        })?;

        let replay = std::mem::take(&mut self.replay_last);
        if replay > 0 {
            info!(replay, "Replaying most recent activities");
        }
        Ok(count.saturating_add(replay))
    }

    /// Advances the watermark if the outcome calls for it and logs the tick.
    fn finish(&mut self, mut report: TickReport) -> TickReport {
        if report.outcome.advances_watermark() {
            report.watermark = self
                .gateway
                .session_mut()
                .advance_watermark(chrono::Utc::now().timestamp());
        }

        match report.outcome {
            TickOutcome::NoChanges => debug!(watermark = report.watermark, "Tick completed"),
            outcome => info!(
                outcome = ?outcome,
                dispatched = report.dispatched,
                skipped = report.skipped,
                failed = report.failed,
                watermark = report.watermark,
                "Tick completed"
            ),
        }
        report
    }

    /// Applies a reloaded configuration.
    ///
    /// Changed credentials or endpoints start a fresh, unauthenticated session
    /// that keeps the watermark.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError`] if a new HTTP client cannot be created.
    pub fn apply_config(&mut self, config: Config) -> Result<(), MonitorError> {
        if config.credentials != self.config.credentials
            || config.endpoints != self.config.endpoints
        {
            self.gateway
                .session_mut()
                .replace_credentials(config.credentials.clone(), config.endpoints.clone())?;
        }

        if config.webhook_url != self.config.webhook_url
            || config.webhook_provider != self.config.webhook_provider
        {
            self.dispatcher
                .set_target(config.webhook_url.clone(), config.webhook_provider);
        }

        if config.webhook_rate != self.config.webhook_rate {
            self.dispatcher
                .set_limiter(RateLimiter::with_rate(config.webhook_rate));
        }

        info!(
            tick_secs = config.tick.as_secs(),
            provider = %config.webhook_provider,
            "Configuration reloaded"
        );
        self.config = config;
        Ok(())
    }
}

fn ticker(start: Instant, period: Duration) -> Interval {
    let mut ticker = interval_at(start, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

/// Ticker whose first tick is one full period away.
fn ticker_after(period: Duration) -> Interval {
    ticker(Instant::now() + period, period)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watermark_advances_only_after_attempted_work() {
        assert!(TickOutcome::CountFailed.advances_watermark());
        assert!(TickOutcome::FetchFailed.advances_watermark());
        assert!(TickOutcome::Dispatched.advances_watermark());

        assert!(!TickOutcome::Cancelled.advances_watermark());
        assert!(!TickOutcome::AuthFailed.advances_watermark());
        assert!(!TickOutcome::NoChanges.advances_watermark());
    }

    #[tokio::test(start_paused = true)]
    async fn ticker_fires_immediately_then_per_period() {
        let start = Instant::now();
        let mut t = ticker(start, Duration::from_secs(60));

        t.tick().await;
        assert_eq!(Instant::now(), start);
        t.tick().await;
        assert_eq!(Instant::now(), start + Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn reloaded_ticker_waits_one_period() {
        let start = Instant::now();
        let mut t = ticker_after(Duration::from_secs(5));

        t.tick().await;
        assert_eq!(Instant::now(), start + Duration::from_secs(5));
    }
}
