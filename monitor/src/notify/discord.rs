//! Discord webhook payloads.
//!
//! One embed per activity: the submission or program as a linked title, the
//! message as description and the program logo as thumbnail.

use reqwest::StatusCode;
use serde::Serialize;

use super::{logo_url, program_url, status_label, submission_url, truncate_description};
use crate::diff::DiffUnavailable;
use crate::types::{ActivityEvent, ActivityKind};

#[derive(Debug, Serialize)]
pub struct DiscordMessage {
    pub embeds: Vec<DiscordEmbed>,
}

#[derive(Debug, Serialize)]
pub struct DiscordEmbed {
    pub title: String,
    pub url: String,
    pub description: String,
    pub thumbnail: DiscordThumbnail,
}

#[derive(Debug, Serialize)]
pub struct DiscordThumbnail {
    pub url: String,
}

/// Builds the payload for one activity.
#[must_use]
pub fn message(event: &ActivityEvent, kind: &ActivityKind, diff: Option<&str>) -> DiscordMessage {
    let (title, url) = if kind.is_submission_event() {
        (
            format!("[{}] {}", event.program_name, event.submission_title),
            submission_url(event),
        )
    } else {
        (event.program_name.clone(), program_url(event))
    };

    DiscordMessage {
        embeds: vec![DiscordEmbed {
            title,
            url,
            description: description(kind, diff),
            thumbnail: DiscordThumbnail {
                url: logo_url(event),
            },
        }],
    }
}

/// Serializes the payload for one activity.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn render(
    event: &ActivityEvent,
    kind: &ActivityKind,
    diff: Option<&str>,
) -> Result<String, serde_json::Error> {
    serde_json::to_string(&message(event, kind, diff))
}

/// Discord reports success with any 2xx status (usually 204).
#[must_use]
pub fn is_delivered(status: StatusCode) -> bool {
    status.is_success()
}

/// Markdown description for one activity.
#[must_use]
pub fn description(kind: &ActivityKind, diff: Option<&str>) -> String {
    let diff = diff.map_or_else(
        || DiffUnavailable::SnapshotUnavailable.placeholder(),
        str::to_string,
    );

    match kind {
        ActivityKind::Message { author, role } => {
            format!("New **message** from *{author}* ({role})")
        }
        ActivityKind::SubmissionStatusChanged {
            status,
            close_reason,
        } => format!(
            "The **status** changed to `{}`",
            status_label(*status, *close_reason)
        ),
        ActivityKind::SeverityChanged(severity) => {
            format!("The **severity** changed to `{severity}`")
        }
        ActivityKind::Payout(payout) => format!(
            "New payout **{} {:.0}** :partying_face:",
            payout.currency, payout.value
        ),
        ActivityKind::EndpointChanged { endpoint } if !endpoint.is_empty() => {
            format!("The **endpoint / vulnerable component** changed to `{endpoint}`")
        }
        ActivityKind::EndpointChanged { .. } => {
            "The **endpoint / vulnerable component** changed".to_string()
        }
        ActivityKind::VulnerabilityTypeChanged { by } => {
            format!("**@{by}** changed vulnerability **type**")
        }
        ActivityKind::FeedbackRequested { by } => format!("**@{by}** requires additional feedback"),
        ActivityKind::FeedbackProvided { by } => format!("**@{by}** provided additional feedback"),
        ActivityKind::FeedbackRequestStopped { by } => {
            format!("**@{by}** stopped requesting feedback")
        }
        ActivityKind::ProgramStatusChanged(status) => {
            format!("Program changed **status** to `{status}`")
        }
        ActivityKind::ProgramDescriptionChanged { description } => format!(
            "Program changed description: \n```{}```",
            truncate_description(description)
        ),
        ActivityKind::BountiesUpdated => "Program updated **bounties**".to_string(),
        ActivityKind::ContentUpdated(field) => {
            format!("Program updated **{}**\n```diff\n{diff}\n```", field.label())
        }
        ActivityKind::DomainsUpdated => format!("Program updated **domains**\n{diff}"),
        ActivityKind::RulesOfEngagementUpdated => {
            format!("Program updated **rules of engagement**\n```diff\n{diff}\n```")
        }
        ActivityKind::UpdatePublished { title, description } => format!(
            "Program published an update: **{title}**\n```{}```",
            truncate_description(description)
        ),
        ActivityKind::Unknown(code) => format!("Unknown message type: {code}"),
    }
}
