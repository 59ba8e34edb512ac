//! Slack incoming-webhook payloads.
//!
//! One `section` block with the message as mrkdwn and the program logo as an
//! image accessory. Slack answers a delivered message with the body `ok`.

use reqwest::StatusCode;
use serde::Serialize;

use super::{logo_url, program_url, status_label, submission_url, truncate_description};
use crate::diff::DiffUnavailable;
use crate::types::{ActivityEvent, ActivityKind};

#[derive(Debug, Serialize)]
pub struct SlackMessage {
    pub text: String,
    pub mrkdwn: bool,
    pub blocks: Vec<SlackBlock>,
}

#[derive(Debug, Serialize)]
pub struct SlackBlock {
    #[serde(rename = "type")]
    pub block_type: &'static str,
    pub text: SlackText,
    pub accessory: SlackImage,
}

#[derive(Debug, Serialize)]
pub struct SlackText {
    #[serde(rename = "type")]
    pub text_type: &'static str,
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct SlackImage {
    #[serde(rename = "type")]
    pub image_type: &'static str,
    pub image_url: String,
    pub alt_text: String,
}

/// Builds the payload for one activity.
#[must_use]
pub fn message(event: &ActivityEvent, kind: &ActivityKind, diff: Option<&str>) -> SlackMessage {
    let text = message_text(event, kind, diff);

    SlackMessage {
        text: text.clone(),
        mrkdwn: true,
        blocks: vec![SlackBlock {
            block_type: "section",
            text: SlackText {
                text_type: "mrkdwn",
                text,
            },
            accessory: SlackImage {
                image_type: "image",
                image_url: logo_url(event),
                alt_text: event.program_name.clone(),
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

/// Slack reports success with a 2xx status and the literal body `ok`.
#[must_use]
pub fn is_delivered(status: StatusCode, body: &str) -> bool {
    status.is_success() && body.trim() == "ok"
}

/// Mrkdwn text for one activity.
#[must_use]
pub fn message_text(event: &ActivityEvent, kind: &ActivityKind, diff: Option<&str>) -> String {
    let submission = format!(
        "*{}* <{}|{}>",
        event.program_name,
        submission_url(event),
        event.submission_title
    );
    let program = format!("<{}|{}>", program_url(event), event.program_name);
    let diff = diff.map_or_else(
        || DiffUnavailable::SnapshotUnavailable.placeholder(),
        str::to_string,
    );

    match kind {
        ActivityKind::Message { author, role } => {
            format!("{submission}\nNew *message* from *{author}* ({role})")
        }
        ActivityKind::SubmissionStatusChanged {
            status,
            close_reason,
        } => format!(
            "{submission}\nThe *status* changed to `{}`",
            status_label(*status, *close_reason)
        ),
        ActivityKind::SeverityChanged(severity) => {
            format!("{submission}\nThe *severity* changed to `{severity}`")
        }
        ActivityKind::Payout(payout) => format!(
            "{submission}\nNew payout *{} {:.0}* :partying_face:",
            payout.currency, payout.value
        ),
        ActivityKind::EndpointChanged { endpoint } if !endpoint.is_empty() => {
            format!("{submission}\nThe *endpoint / vulnerable component* changed to `{endpoint}`")
        }
        ActivityKind::EndpointChanged { .. } => {
            format!("{submission}\nThe *endpoint / vulnerable component* changed")
        }
        ActivityKind::VulnerabilityTypeChanged { by } => {
            format!("{submission}\n*{by}* changed *vulnerability type*")
        }
        ActivityKind::FeedbackRequested { by } => {
            format!("{submission}\n*{by}* requires additional feedback")
        }
        ActivityKind::FeedbackProvided { by } => {
            format!("{submission}\n*{by}* provided additional feedback")
        }
        ActivityKind::FeedbackRequestStopped { by } => {
            format!("{submission}\n*{by}* stopped requesting feedback")
        }
        ActivityKind::ProgramStatusChanged(status) => {
            format!("{program} changed *program status* to `{status}`")
        }
        ActivityKind::ProgramDescriptionChanged { description } => format!(
            "{program} changed description: \n```{}```",
            truncate_description(description)
        ),
        ActivityKind::BountiesUpdated => format!("{program} updated *bounties*"),
        ActivityKind::ContentUpdated(field) => {
            format!("{program} updated *{}*\n```\n{diff}\n```", field.label())
        }
        ActivityKind::DomainsUpdated => format!("{program} updated *domains*\n{diff}\n"),
        ActivityKind::RulesOfEngagementUpdated => {
            format!("{program} updated *rules of engagement*\n```\n{diff}\n```")
        }
        ActivityKind::UpdatePublished { title, description } => format!(
            "{program} published a program update: *{title}*\n```{}```",
            truncate_description(description)
        ),
        ActivityKind::Unknown(code) => format!("Unknown message type: {code}"),
    }
}
