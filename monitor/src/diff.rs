//! "What changed" reports for mutable program fields.
//!
//! Programs carry the full version history of their scope, FAQ, severity
//! assessment, rules and domain list. A change activity is matched to the
//! version created at the same second, and that version is compared with the
//! one before it. Text fields render as a unified diff; domain lists render as
//! a per-endpoint added/removed/updated report.
//!
//! Reports longer than [`MAX_DIFF_CHARS`] are replaced by a placeholder so
//! they fit into a chat message.

use std::fmt::Write as _;

use chrono::DateTime;
use similar::TextDiff;
use thiserror::Error;
use tracing::warn;

use crate::types::{ActivityEvent, DomainEndpoint, Program, ProgramField, Version};

/// Longest report, in characters, that is sent as-is.
pub const MAX_DIFF_CHARS: usize = 1800;

/// Rendered when the two versions are identical.
pub const NO_CHANGES: &str = "No changes";

/// Reasons a report is replaced by a placeholder.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DiffUnavailable {
    /// The field has no versions at all.
    #[error("No content history")]
    NoHistory,

    /// The rendered report exceeds [`MAX_DIFF_CHARS`].
    #[error("Message too long")]
    TooLong { chars: usize },

    /// The program could not be fetched.
    #[error("Diff unavailable")]
    SnapshotUnavailable,
}

impl DiffUnavailable {
    /// Text sent in place of the report.
    #[must_use]
    pub fn placeholder(&self) -> String {
        self.to_string()
    }
}

/// How the current version of a field was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionMatch {
    /// The version at this index was created at the activity's timestamp.
    Exact(usize),
    /// No version matches; the first version is used and has no predecessor.
    FirstVersionFallback,
}

impl VersionMatch {
    #[must_use]
    pub fn index(self) -> usize {
        match self {
            Self::Exact(index) => index,
            Self::FirstVersionFallback => 0,
        }
    }
}

/// Finds the version created at `created_at_secs`, first match from the start.
///
/// Returns `None` for an empty history.
#[must_use]
pub fn locate_version<T>(versions: &[Version<T>], created_at_secs: i64) -> Option<VersionMatch> {
    if versions.is_empty() {
        return None;
    }

    let found = versions
        .iter()
        .position(|v| v.created_at == created_at_secs)
        .map_or(VersionMatch::FirstVersionFallback, VersionMatch::Exact);

    if found == VersionMatch::FirstVersionFallback {
        warn!(
            activity_created_at = created_at_secs,
            versions = versions.len(),
            "No version matches activity timestamp, comparing first version against empty content"
        );
    }
    Some(found)
}

/// Current version and its predecessor, if any.
fn version_pair<T>(
    versions: &[Version<T>],
    created_at_secs: i64,
) -> Result<(Option<&Version<T>>, &Version<T>), DiffUnavailable> {
    let index = locate_version(versions, created_at_secs)
        .ok_or(DiffUnavailable::NoHistory)?
        .index();
    let previous = index.checked_sub(1).map(|i| &versions[i]);
    Ok((previous, &versions[index]))
}

/// Unified diff of a text field at the version the activity refers to.
#[must_use]
pub fn text_field_diff(program: &Program, field: ProgramField, event: &ActivityEvent) -> String {
    let versions = program.text_versions(field);
    render(version_pair(versions, event.created_at_secs()).and_then(|(previous, current)| {
        text_report(
            previous.map(|v| (v.created_at, v.content.content.as_str())),
            (current.created_at, current.content.content.as_str()),
        )
    }))
}

/// Unified diff of the rules-of-engagement description.
#[must_use]
pub fn rules_diff(program: &Program, event: &ActivityEvent) -> String {
    let versions = &program.rules_of_engagements;
    render(version_pair(versions, event.created_at_secs()).and_then(|(previous, current)| {
        text_report(
            previous.map(|v| (v.created_at, v.content.content.description.as_str())),
            (current.created_at, current.content.content.description.as_str()),
        )
    }))
}

/// Added, removed and updated endpoints of the domain list.
#[must_use]
pub fn domains_diff(program: &Program, event: &ActivityEvent) -> String {
    let versions = &program.domains;
    render(version_pair(versions, event.created_at_secs()).and_then(|(previous, current)| {
        let (old_time, old) =
            previous.map_or((None, &[][..]), |v| (Some(v.created_at), &v.content[..]));
        let report = domains_report(old, &current.content, old_time, current.created_at);
        if report.is_empty() {
            return Ok(NO_CHANGES.to_string());
        }
        cap(report)
    }))
}

fn render(result: Result<String, DiffUnavailable>) -> String {
    result.unwrap_or_else(|reason| reason.placeholder())
}

fn cap(report: String) -> Result<String, DiffUnavailable> {
    let chars = report.chars().count();
    if chars > MAX_DIFF_CHARS {
        return Err(DiffUnavailable::TooLong { chars });
    }
    Ok(report)
}

fn text_report(
    previous: Option<(i64, &str)>,
    current: (i64, &str),
) -> Result<String, DiffUnavailable> {
    let (old_time, old) = previous.map_or((None, ""), |(t, c)| (Some(t), c));
    let (new_time, new) = current;

    if old == new {
        return Ok(NO_CHANGES.to_string());
    }
    cap(unified(old, new, &timestamp_header(old_time), &timestamp_header(Some(new_time))))
}

fn unified(old: &str, new: &str, old_header: &str, new_header: &str) -> String {
    TextDiff::from_lines(old, new)
        .unified_diff()
        .header(old_header, new_header)
        .to_string()
}

fn timestamp_header(secs: Option<i64>) -> String {
    match secs {
        None => "(none)".to_string(),
        Some(secs) => DateTime::from_timestamp(secs, 0)
            .map_or_else(|| secs.to_string(), |t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string()),
    }
}

/// Set-diff of two domain lists keyed by endpoint id.
///
/// Removals are listed first (in previous order), then additions and updates
/// (in current order). Returns an empty string when nothing differs.
#[must_use]
pub fn domains_report(
    previous: &[DomainEndpoint],
    current: &[DomainEndpoint],
    previous_time: Option<i64>,
    current_time: i64,
) -> String {
    let mut out = String::new();

    for old in previous {
        if !current.iter().any(|d| d.id == old.id) {
            let _ = write!(out, "\n`{}` ({}) was removed!\n", old.endpoint, old.endpoint_type());
        }
    }

    for new in current {
        let Some(old) = previous.iter().find(|d| d.id == new.id) else {
            let _ = write!(
                out,
                "\n`{}` ({}) was added with-in {}!\n",
                new.endpoint,
                new.endpoint_type(),
                new.tier()
            );
            continue;
        };

        if old == new {
            continue;
        }

        let _ = write!(out, "\n`{}` ({}) was updated:\n", new.endpoint, new.endpoint_type());
        if old.endpoint != new.endpoint {
            let _ = writeln!(out, " - Endpoint: `{}` -> `{}`", old.endpoint, new.endpoint);
        }
        if old.type_code != new.type_code {
            let _ = writeln!(
                out,
                " - Type: `{}` -> `{}`",
                old.endpoint_type(),
                new.endpoint_type()
            );
        }
        if old.bounty_tier_id != new.bounty_tier_id {
            let _ = writeln!(out, " - Tier: `{}` -> `{}`", old.tier(), new.tier());
        }
        if old.description != new.description {
            let diff = unified(
                &format!("{}\n", old.description),
                &format!("{}\n", new.description),
                &timestamp_header(previous_time),
                &timestamp_header(Some(current_time)),
            );
            let _ = write!(out, " - Description:\n```diff\n{diff}\n```\n");
        }
    }

    out
}
