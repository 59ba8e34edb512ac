//! Activity and program types returned by the platform API.
//!
//! Wire types deserialize from the platform's camelCase JSON. Activity events
//! carry a raw integer discriminator; [`ActivityEvent::kind`] turns it into the
//! tagged [`ActivityKind`] so formatting never indexes tables by server codes.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Role reported for activity authored by the monitored account itself.
pub const SELF_ROLE: &str = "RESEARCHER";

/// Reads an explicit JSON `null` as the field's default value.
///
/// `#[serde(default)]` covers absent keys only; the feed sends `null` for
/// fields that do not apply to an activity kind.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// New state of a submission after a status change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubmissionState {
    #[serde(deserialize_with = "null_as_default")]
    pub status: i32,
    #[serde(deserialize_with = "null_as_default")]
    pub close_reason: i32,
    pub duplicate_submission: Option<String>,
}

/// Payout amount attached to a payout activity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Payout {
    #[serde(deserialize_with = "null_as_default")]
    pub value: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub currency: String,
}

/// User that originated an activity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ActivityUser {
    #[serde(deserialize_with = "null_as_default")]
    pub role: String,
    #[serde(deserialize_with = "null_as_default")]
    pub user_name: String,
}

/// One entry of the account activity feed.
///
/// Which payload fields are meaningful depends on `discriminator`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ActivityEvent {
    #[serde(deserialize_with = "null_as_default")]
    pub discriminator: i32,
    #[serde(deserialize_with = "null_as_default")]
    pub new_status_id: i32,
    #[serde(deserialize_with = "null_as_default")]
    pub new_state: SubmissionState,
    #[serde(deserialize_with = "null_as_default")]
    pub new_severity_id: i32,
    #[serde(deserialize_with = "null_as_default")]
    pub new_payout_amount: Payout,
    #[serde(
        rename = "newEndpointVulnerableComponent",
        deserialize_with = "null_as_default"
    )]
    pub new_endpoint: String,
    #[serde(deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(deserialize_with = "null_as_default")]
    pub user: ActivityUser,
    #[serde(deserialize_with = "null_as_default")]
    pub username: String,
    #[serde(deserialize_with = "null_as_default")]
    pub submission_code: String,
    #[serde(deserialize_with = "null_as_default")]
    pub submission_title: String,
    #[serde(deserialize_with = "null_as_default")]
    pub program_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub program_logo_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub program_name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub program_handle: String,
    #[serde(deserialize_with = "null_as_default")]
    pub company_handle: String,
    /// Creation time in milliseconds since the Unix epoch.
    #[serde(deserialize_with = "null_as_default")]
    pub created_at: i64,
}

impl ActivityEvent {
    /// Creation time truncated to whole seconds.
    #[must_use]
    pub fn created_at_secs(&self) -> i64 {
        self.created_at.div_euclid(1000)
    }

    /// Decodes the discriminator and the payload fields it selects.
    #[must_use]
    pub fn kind(&self) -> ActivityKind {
        match self.discriminator {
            1 => ActivityKind::Message {
                author: self.user.user_name.clone(),
                role: self.user.role.clone(),
            },
            2 => ActivityKind::SubmissionStatusChanged {
                status: SubmissionStatus::from_code(self.new_state.status),
                close_reason: CloseReason::from_code(self.new_state.close_reason),
            },
            3 => ActivityKind::SeverityChanged(Severity::from_code(self.new_severity_id)),
            5 => ActivityKind::Payout(self.new_payout_amount.clone()),
            7 => ActivityKind::EndpointChanged {
                endpoint: self.new_endpoint.clone(),
            },
            8 => ActivityKind::VulnerabilityTypeChanged {
                by: self.username.clone(),
            },
            9 => ActivityKind::FeedbackRequested {
                by: self.username.clone(),
            },
            10 => ActivityKind::FeedbackProvided {
                by: self.username.clone(),
            },
            11 => ActivityKind::FeedbackRequestStopped {
                by: self.username.clone(),
            },
            20 => ActivityKind::ProgramStatusChanged(ProgramStatus::from_code(self.new_status_id)),
            22 => ActivityKind::ProgramDescriptionChanged {
                description: self.description.clone(),
            },
            23 => ActivityKind::BountiesUpdated,
            24 => ActivityKind::ContentUpdated(ProgramField::InScope),
            25 => ActivityKind::ContentUpdated(ProgramField::OutOfScope),
            26 => ActivityKind::ContentUpdated(ProgramField::Faq),
            27 => ActivityKind::DomainsUpdated,
            28 => ActivityKind::RulesOfEngagementUpdated,
            29 => ActivityKind::ContentUpdated(ProgramField::SeverityAssessment),
            47 => ActivityKind::UpdatePublished {
                title: self.title.clone(),
                description: self.description.clone(),
            },
            code => ActivityKind::Unknown(code),
        }
    }

    /// Returns `true` for a message written by the monitored account itself.
    #[must_use]
    pub fn is_self_originated(&self) -> bool {
        matches!(self.kind(), ActivityKind::Message { ref role, .. } if role == SELF_ROLE)
    }
}

/// Decoded activity kind, keyed by the discriminator.
#[derive(Debug, Clone, PartialEq)]
pub enum ActivityKind {
    Message { author: String, role: String },
    SubmissionStatusChanged { status: SubmissionStatus, close_reason: CloseReason },
    SeverityChanged(Severity),
    Payout(Payout),
    EndpointChanged { endpoint: String },
    VulnerabilityTypeChanged { by: String },
    FeedbackRequested { by: String },
    FeedbackProvided { by: String },
    FeedbackRequestStopped { by: String },
    ProgramStatusChanged(ProgramStatus),
    ProgramDescriptionChanged { description: String },
    BountiesUpdated,
    /// Scope, out-of-scope, FAQ or severity assessment text changed.
    ContentUpdated(ProgramField),
    DomainsUpdated,
    RulesOfEngagementUpdated,
    UpdatePublished { title: String, description: String },
    Unknown(i32),
}

impl ActivityKind {
    /// Returns `true` if the kind concerns a submission rather than a program.
    #[must_use]
    pub fn is_submission_event(&self) -> bool {
        matches!(
            self,
            Self::Message { .. }
                | Self::SubmissionStatusChanged { .. }
                | Self::SeverityChanged(_)
                | Self::Payout(_)
                | Self::EndpointChanged { .. }
                | Self::VulnerabilityTypeChanged { .. }
                | Self::FeedbackRequested { .. }
                | Self::FeedbackProvided { .. }
                | Self::FeedbackRequestStopped { .. }
        )
    }
}

/// Most recent page of the activity feed, newest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivityBatch {
    #[serde(deserialize_with = "null_as_default")]
    pub completed: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub activities: Vec<ActivityEvent>,
}

impl ActivityBatch {
    /// Returns at most the first `count` activities.
    #[must_use]
    pub fn leading(&self, count: usize) -> &[ActivityEvent] {
        &self.activities[..count.min(self.activities.len())]
    }
}

/// Text-valued program field with version history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgramField {
    InScope,
    OutOfScope,
    Faq,
    SeverityAssessment,
}

impl ProgramField {
    /// Human-readable field name used in notifications.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::InScope => "scope",
            Self::OutOfScope => "out of scope",
            Self::Faq => "FAQ",
            Self::SeverityAssessment => "severity assessment",
        }
    }
}

/// One timestamped version of a program field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    rename_all = "camelCase",
    bound(deserialize = "T: Deserialize<'de> + Default")
)]
pub struct Version<T> {
    /// Creation time in seconds since the Unix epoch.
    #[serde(default, deserialize_with = "null_as_default")]
    pub created_at: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: T,
}

/// Versions of one program field, ordered by creation time.
pub type VersionedContent<T> = Vec<Version<T>>;

/// Body of a text field version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextContent {
    #[serde(deserialize_with = "null_as_default")]
    pub content: String,
}

/// Body of a rules-of-engagement version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesContent {
    #[serde(deserialize_with = "null_as_default")]
    pub content: RulesBody,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesBody {
    #[serde(deserialize_with = "null_as_default")]
    pub description: String,
}

/// One in-scope endpoint of a program. Identity is `id`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DomainEndpoint {
    #[serde(deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(rename = "type", deserialize_with = "null_as_default")]
    pub type_code: i32,
    #[serde(deserialize_with = "null_as_default")]
    pub endpoint: String,
    #[serde(deserialize_with = "null_as_default")]
    pub bounty_tier_id: i32,
    #[serde(deserialize_with = "null_as_default")]
    pub description: String,
}

impl DomainEndpoint {
    #[must_use]
    pub fn endpoint_type(&self) -> EndpointType {
        EndpointType::from_code(self.type_code)
    }

    #[must_use]
    pub fn tier(&self) -> BountyTier {
        BountyTier::from_code(self.bounty_tier_id)
    }
}

/// Current state of a program including its versioned content.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Program {
    #[serde(deserialize_with = "null_as_default")]
    pub program_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub status: i32,
    #[serde(deserialize_with = "null_as_default")]
    pub company_handle: String,
    #[serde(deserialize_with = "null_as_default")]
    pub company_name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub handle: String,
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub in_scopes: VersionedContent<TextContent>,
    #[serde(deserialize_with = "null_as_default")]
    pub out_of_scopes: VersionedContent<TextContent>,
    #[serde(deserialize_with = "null_as_default")]
    pub faqs: VersionedContent<TextContent>,
    #[serde(deserialize_with = "null_as_default")]
    pub severity_assessments: VersionedContent<TextContent>,
    #[serde(deserialize_with = "null_as_default")]
    pub rules_of_engagements: VersionedContent<RulesContent>,
    #[serde(deserialize_with = "null_as_default")]
    pub domains: VersionedContent<Vec<DomainEndpoint>>,
}

impl Program {
    /// Returns the version history of a text field.
    #[must_use]
    pub fn text_versions(&self, field: ProgramField) -> &VersionedContent<TextContent> {
        match field {
            ProgramField::InScope => &self.in_scopes,
            ProgramField::OutOfScope => &self.out_of_scopes,
            ProgramField::Faq => &self.faqs,
            ProgramField::SeverityAssessment => &self.severity_assessments,
        }
    }
}

/// Submission workflow status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionStatus {
    Triage,
    Pending,
    Accepted,
    Closed,
    Archived,
    Unknown(i32),
}

impl SubmissionStatus {
    #[must_use]
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => Self::Triage,
            2 => Self::Pending,
            3 => Self::Accepted,
            4 => Self::Closed,
            5 => Self::Archived,
            other => Self::Unknown(other),
        }
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Triage => f.write_str("Triage"),
            Self::Pending => f.write_str("Pending"),
            Self::Accepted => f.write_str("Accepted"),
            Self::Closed => f.write_str("Closed"),
            Self::Archived => f.write_str("Archived"),
            Self::Unknown(code) => write!(f, "Unknown: {code}"),
        }
    }
}

/// Reason given when a submission is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    Resolved,
    Duplicate,
    AcceptedRisk,
    Informative,
    OutOfScope,
    Spam,
    NotApplicable,
    Unknown(i32),
}

impl CloseReason {
    #[must_use]
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => Self::Resolved,
            2 => Self::Duplicate,
            3 => Self::AcceptedRisk,
            4 => Self::Informative,
            5 => Self::OutOfScope,
            6 => Self::Spam,
            7 => Self::NotApplicable,
            other => Self::Unknown(other),
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resolved => f.write_str("Resolved"),
            Self::Duplicate => f.write_str("Duplicate"),
            Self::AcceptedRisk => f.write_str("Accepted Risk"),
            Self::Informative => f.write_str("Informative"),
            Self::OutOfScope => f.write_str("Out Of Scope"),
            Self::Spam => f.write_str("Spam"),
            Self::NotApplicable => f.write_str("Not Applicable"),
            Self::Unknown(code) => write!(f, "Unknown: {code}"),
        }
    }
}

/// Submission severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Undecided,
    Low,
    Medium,
    High,
    Critical,
    Exceptional,
    Unknown(i32),
}

impl Severity {
    #[must_use]
    pub fn from_code(code: i32) -> Self {
        match code {
            1 | 7 => Self::Undecided,
            2 => Self::Low,
            3 => Self::Medium,
            4 => Self::High,
            5 => Self::Critical,
            6 => Self::Exceptional,
            other => Self::Unknown(other),
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undecided => f.write_str("Undecided"),
            Self::Low => f.write_str("Low"),
            Self::Medium => f.write_str("Medium"),
            Self::High => f.write_str("High"),
            Self::Critical => f.write_str("Critical"),
            Self::Exceptional => f.write_str("Exceptional"),
            Self::Unknown(code) => write!(f, "Unknown: {code}"),
        }
    }
}

/// Program lifecycle status.
///
/// The platform reports both legacy (3-7) and current (1001-1005) codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramStatus {
    Draft,
    Enrolling,
    Open,
    Suspended,
    Closing,
    Closed,
    Deleted,
    Unknown(i32),
}

impl ProgramStatus {
    #[must_use]
    pub fn from_code(code: i32) -> Self {
        match code {
            1001 => Self::Draft,
            1002 => Self::Enrolling,
            3 | 1003 => Self::Open,
            4 => Self::Suspended,
            5 | 1004 => Self::Closing,
            6 | 1005 => Self::Closed,
            7 => Self::Deleted,
            other => Self::Unknown(other),
        }
    }
}

impl fmt::Display for ProgramStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Draft => f.write_str("Draft"),
            Self::Enrolling => f.write_str("Enrolling"),
            Self::Open => f.write_str("Open"),
            Self::Suspended => f.write_str("Suspended"),
            Self::Closing => f.write_str("Closing"),
            Self::Closed => f.write_str("Closed"),
            Self::Deleted => f.write_str("Deleted"),
            Self::Unknown(code) => write!(f, "Unknown: {code}"),
        }
    }
}

/// Kind of in-scope asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointType {
    Url,
    Android,
    Ios,
    IpRange,
    Device,
    Other,
    Unknown(i32),
}

impl EndpointType {
    #[must_use]
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => Self::Url,
            2 => Self::Android,
            3 => Self::Ios,
            4 => Self::IpRange,
            5 => Self::Device,
            6 => Self::Other,
            other => Self::Unknown(other),
        }
    }
}

impl fmt::Display for EndpointType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Url => f.write_str("URL"),
            Self::Android => f.write_str("Android"),
            Self::Ios => f.write_str("iOS"),
            Self::IpRange => f.write_str("IpRange"),
            Self::Device => f.write_str("Device"),
            Self::Other => f.write_str("Other"),
            Self::Unknown(code) => write!(f, "Unknown: {code}"),
        }
    }
}

/// Bounty tier of an in-scope asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BountyTier {
    NoBounty,
    Tier3,
    Tier2,
    Tier1,
    Unknown(i32),
}

impl BountyTier {
    #[must_use]
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => Self::NoBounty,
            2 => Self::Tier3,
            3 => Self::Tier2,
            4 => Self::Tier1,
            other => Self::Unknown(other),
        }
    }
}

impl fmt::Display for BountyTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoBounty => f.write_str("No Bounty Tier"),
            Self::Tier3 => f.write_str("Tier 3"),
            Self::Tier2 => f.write_str("Tier 2"),
            Self::Tier1 => f.write_str("Tier 1"),
            Self::Unknown(code) => write!(f, "Unknown: {code}"),
        }
    }
}
