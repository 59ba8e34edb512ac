//! Activity notifications sent to a chat webhook.
//!
//! The dispatcher decides whether an activity is worth sending, enriches
//! program content changes with a diff of the affected field, renders the
//! provider-specific payload and posts it once the rate limiter allows.
//! Nothing is retried; a failed send is reported to the caller and dropped.

pub mod discord;
pub mod slack;

use std::time::Duration;

use reqwest::header::{HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Url};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::WebhookProvider;
use crate::diff::{self, DiffUnavailable};
use crate::gateway::ActivityGateway;
use crate::rate_limit::RateLimiter;
use crate::types::{ActivityEvent, ActivityKind, CloseReason, SubmissionStatus};

/// HTTP request timeout for webhook posts.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Web app base for links in messages.
pub const APP_LINK_BASE: &str = "https://app.intigriti.com";

/// File service base for program logos.
pub const LOGO_BASE: &str = "https://api.intigriti.com/file/api/file";

/// Free-text descriptions longer than this many characters are cut.
pub const MAX_DESCRIPTION_CHARS: usize = 500;

/// Appended to a cut description.
const TRUNCATION_MARKER: &str = " [...]";

/// Errors that prevent one notification from being delivered.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// The payload could not be serialized.
    #[error("failed to format message: {0}")]
    Format(#[from] serde_json::Error),

    /// The webhook request failed before a response arrived.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The webhook answered but did not accept the message.
    #[error("webhook rejected message: {status} - {body}")]
    Rejected { status: u16, body: String },

    /// The webhook client could not be constructed.
    #[error("failed to build webhook client: {0}")]
    ClientBuild(#[source] reqwest::Error),
}

/// What happened to one activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Sent,
    /// Deliberately not sent (the account's own message).
    Skipped,
}

/// Formats activities and posts them to one webhook.
pub struct NotificationDispatcher {
    client: Client,
    webhook_url: String,
    provider: WebhookProvider,
    limiter: RateLimiter,
}

impl NotificationDispatcher {
    /// Creates a dispatcher posting to `webhook_url`, paced by `limiter`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::ClientBuild`] if the HTTP client cannot be created.
    pub fn new(
        webhook_url: impl Into<String>,
        provider: WebhookProvider,
        limiter: RateLimiter,
    ) -> Result<Self, DispatchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(DispatchError::ClientBuild)?;

        Ok(Self {
            client,
            webhook_url: webhook_url.into(),
            provider,
            limiter,
        })
    }

    /// Points the dispatcher at another webhook.
    pub fn set_target(&mut self, webhook_url: impl Into<String>, provider: WebhookProvider) {
        self.webhook_url = webhook_url.into();
        self.provider = provider;
    }

    /// Replaces the send pacing.
    pub fn set_limiter(&mut self, limiter: RateLimiter) {
        self.limiter = limiter;
    }

    /// Formats and sends one activity.
    ///
    /// Content-change activities fetch the program through `gateway` to embed
    /// a diff; if that fetch fails the message carries a placeholder instead.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError`] if formatting or sending fails.
    pub async fn dispatch(
        &self,
        event: &ActivityEvent,
        gateway: &mut ActivityGateway,
    ) -> Result<DispatchOutcome, DispatchError> {
        if event.is_self_originated() {
            debug!(submission = %event.submission_code, "Skipping own message");
            return Ok(DispatchOutcome::Skipped);
        }

        let kind = event.kind();
        let diff = content_diff(&kind, event, gateway).await;

        let body = match self.provider {
            WebhookProvider::Slack => slack::render(event, &kind, diff.as_deref())?,
            WebhookProvider::Discord => discord::render(event, &kind, diff.as_deref())?,
        };

        self.send(body).await?;
        info!(
            discriminator = event.discriminator,
            program = %event.program_name,
            provider = %self.provider,
            "Notification sent"
        );
        Ok(DispatchOutcome::Sent)
    }

    /// Posts a rendered JSON payload once the rate limiter allows it.
    async fn send(&self, body: String) -> Result<(), DispatchError> {
        self.limiter.acquire().await;

        let response = self
            .client
            .post(&self.webhook_url)
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .body(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        let delivered = match self.provider {
            WebhookProvider::Slack => slack::is_delivered(status, &text),
            WebhookProvider::Discord => discord::is_delivered(status),
        };
        if !delivered {
            return Err(DispatchError::Rejected {
                status: status.as_u16(),
                body: text,
            });
        }
        Ok(())
    }
}

/// Diff embedded in content-change notifications, `None` for other kinds.
async fn content_diff(
    kind: &ActivityKind,
    event: &ActivityEvent,
    gateway: &mut ActivityGateway,
) -> Option<String> {
    if !matches!(
        kind,
        ActivityKind::ContentUpdated(_)
            | ActivityKind::DomainsUpdated
            | ActivityKind::RulesOfEngagementUpdated
    ) {
        return None;
    }

    let program = match gateway
        .program_snapshot(&event.company_handle, &event.program_handle)
        .await
    {
        Ok(program) => program,
        Err(e) => {
            warn!(
                error = %e,
                company = %event.company_handle,
                program = %event.program_handle,
                "Failed to fetch program for diff"
            );
            return Some(DiffUnavailable::SnapshotUnavailable.placeholder());
        }
    };

    match kind {
        ActivityKind::ContentUpdated(field) => Some(diff::text_field_diff(&program, *field, event)),
        ActivityKind::DomainsUpdated => Some(diff::domains_diff(&program, event)),
        ActivityKind::RulesOfEngagementUpdated => Some(diff::rules_diff(&program, event)),
        _ => None,
    }
}

/// `base` with percent-encoded `segments` appended.
fn link(base: &str, segments: &[&str]) -> String {
    match Url::parse(base) {
        Ok(mut url) => {
            if let Ok(mut path) = url.path_segments_mut() {
                path.pop_if_empty().extend(segments);
            }
            url.into()
        }
        Err(_) => format!("{base}/{}", segments.join("/")),
    }
}

/// Researcher view of the submission an activity belongs to.
#[must_use]
pub fn submission_url(event: &ActivityEvent) -> String {
    link(
        APP_LINK_BASE,
        &["researcher", "submissions", event.program_id.as_str(), event.submission_code.as_str()],
    )
}

/// Researcher view of the program an activity belongs to.
#[must_use]
pub fn program_url(event: &ActivityEvent) -> String {
    link(
        APP_LINK_BASE,
        &[
            "researcher",
            "programs",
            event.company_handle.as_str(),
            event.program_handle.as_str(),
            "detail",
        ],
    )
}

#[must_use]
pub fn logo_url(event: &ActivityEvent) -> String {
    link(LOGO_BASE, &[event.program_logo_id.as_str()])
}

/// Cuts `text` to [`MAX_DESCRIPTION_CHARS`] characters, marking the cut.
#[must_use]
pub fn truncate_description(text: &str) -> String {
    match text.char_indices().nth(MAX_DESCRIPTION_CHARS) {
        Some((end, _)) => format!("{}{TRUNCATION_MARKER}", &text[..end]),
        None => text.to_string(),
    }
}

/// Status label; a closed submission also names its close reason.
#[must_use]
pub fn status_label(status: SubmissionStatus, close_reason: CloseReason) -> String {
    match status {
        SubmissionStatus::Closed => format!("{status} as {close_reason}"),
        other => other.to_string(),
    }
}
