use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::evaluation::PolicyViolation;
use super::policy::PolicyRef;
use super::risk::{RiskAssessment, RiskLevel};

/// Timeline attribution for transitions nobody performed by hand.
pub const SYSTEM_ACTOR: &str = "System";
/// Timeline attribution for commits approved by a policy's auto threshold.
pub const AUTO_APPROVE_ACTOR: &str = "Policy Auto-Approve";

/// Opaque trip identifier, generated once when the trip is committed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TripId(pub String);

impl TripId {
    pub fn generate() -> Self {
        Self(format!("trip-{}", Uuid::new_v4().simple()))
    }
}

impl fmt::Display for TripId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Cabin classes ordered from least to most expensive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FareClass {
    Economy,
    PremiumEconomy,
    Business,
    First,
}

impl FareClass {
    pub const fn label(self) -> &'static str {
        match self {
            FareClass::Economy => "economy",
            FareClass::PremiumEconomy => "premium economy",
            FareClass::Business => "business",
            FareClass::First => "first",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportMode {
    Rail,
    RentalCar,
    Taxi,
    RideShare,
    PublicTransit,
}

impl TransportMode {
    pub const fn label(self) -> &'static str {
        match self {
            TransportMode::Rail => "rail",
            TransportMode::RentalCar => "rental car",
            TransportMode::Taxi => "taxi",
            TransportMode::RideShare => "ride share",
            TransportMode::PublicTransit => "public transit",
        }
    }
}

/// Optional booking details a requester may declare up front. Policy rules that need a
/// field which is absent are skipped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TravelDetails {
    pub fare_class: Option<FareClass>,
    pub airline: Option<String>,
    pub direct_flight: Option<bool>,
    pub hotel: Option<String>,
    pub accommodation_type: Option<String>,
    pub ground_transport: Option<TransportMode>,
    pub insured: Option<bool>,
}

/// Unpersisted trip candidate submitted for evaluation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TripDraft {
    pub requester: String,
    pub requester_email: Option<String>,
    pub department: String,
    pub destination: String,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub purpose: String,
    pub cost_estimate: Option<f64>,
    pub travel: TravelDetails,
}

impl TripDraft {
    /// Check the fields a trip cannot be committed without, returning the start date.
    pub fn validate(&self) -> Result<NaiveDate, ValidationError> {
        if self.requester.trim().is_empty() {
            return Err(ValidationError::MissingRequester);
        }
        if self.destination.trim().is_empty() {
            return Err(ValidationError::MissingDestination);
        }
        let start = self.start.ok_or(ValidationError::MissingStartDate)?;
        if let Some(end) = self.end {
            if end < start {
                return Err(ValidationError::EndBeforeStart { start, end });
            }
        }
        if let Some(cost) = self.cost_estimate {
            if !cost.is_finite() || cost < 0.0 {
                return Err(ValidationError::InvalidCostEstimate(cost));
            }
        }
        if let Some(email) = self.requester_email.as_deref() {
            if !email.trim().is_empty() && !email.contains('@') {
                return Err(ValidationError::InvalidRequesterEmail(email.to_string()));
            }
        }
        Ok(start)
    }

    /// Requester email when one was supplied and is not blank.
    pub fn contact_email(&self) -> Option<&str> {
        self.requester_email
            .as_deref()
            .map(str::trim)
            .filter(|email| !email.is_empty())
    }
}

/// Draft problems surfaced before any side effect occurs.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("requester is required")]
    MissingRequester,
    #[error("destination is required")]
    MissingDestination,
    #[error("start date is required")]
    MissingStartDate,
    #[error("end date {end} is before start date {start}")]
    EndBeforeStart { start: NaiveDate, end: NaiveDate },
    #[error("cost estimate must be a non-negative amount (found {0})")]
    InvalidCostEstimate(f64),
    #[error("requester email '{0}' is not a valid address")]
    InvalidRequesterEmail(String),
    #[error("a rejection reason is required")]
    MissingRejectionReason,
    #[error("comment text is required")]
    EmptyComment,
    #[error("attachment filename is required")]
    MissingFilename,
}

/// Lifecycle status of a committed trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripStatus {
    Pending,
    Approved,
    Rejected,
    Active,
    Completed,
}

impl TripStatus {
    #[cfg(test)]
    pub(crate) const ALL: [TripStatus; 5] = [
        TripStatus::Pending,
        TripStatus::Approved,
        TripStatus::Rejected,
        TripStatus::Active,
        TripStatus::Completed,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            TripStatus::Pending => "pending",
            TripStatus::Approved => "approved",
            TripStatus::Rejected => "rejected",
            TripStatus::Active => "active",
            TripStatus::Completed => "completed",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, TripStatus::Rejected | TripStatus::Completed)
    }
}

impl fmt::Display for TripStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Status event recorded on a trip timeline. `Requested` is the entry a trip is
/// committed with; the others mirror the status they move the trip into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelineStatus {
    Requested,
    Approved,
    Rejected,
    Active,
    Completed,
}

impl TimelineStatus {
    pub const fn resulting_status(self) -> TripStatus {
        match self {
            TimelineStatus::Requested => TripStatus::Pending,
            TimelineStatus::Approved => TripStatus::Approved,
            TimelineStatus::Rejected => TripStatus::Rejected,
            TimelineStatus::Active => TripStatus::Active,
            TimelineStatus::Completed => TripStatus::Completed,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            TimelineStatus::Requested => "requested",
            other => other.resulting_status().label(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub at: DateTime<Utc>,
    pub status: TimelineStatus,
    pub actor: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub author: String,
    pub at: DateTime<Utc>,
    pub text: String,
}

/// File metadata supplied by the caller; contents never reach the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMeta {
    pub filename: String,
    pub size_bytes: u64,
    pub content_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: String,
    pub size_bytes: u64,
    pub content_type: String,
    pub attached_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    Employee,
    Manager,
    Finance,
}

impl ActorRole {
    pub const fn label(self) -> &'static str {
        match self {
            ActorRole::Employee => "employee",
            ActorRole::Manager => "manager",
            ActorRole::Finance => "finance",
        }
    }

    /// Whether the role may approve or reject trip requests.
    pub const fn can_decide(self) -> bool {
        matches!(self, ActorRole::Manager | ActorRole::Finance)
    }
}

impl fmt::Display for ActorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Caller identity passed explicitly into every guarded operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub name: String,
    pub role: ActorRole,
}

impl Actor {
    pub fn new(name: impl Into<String>, role: ActorRole) -> Self {
        Self {
            name: name.into(),
            role,
        }
    }
}

/// A committed travel request. Identity and the evaluation recorded at commit time are
/// read-only; status, timeline, comments, and attachments change only through the
/// lifecycle transitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    pub(crate) id: TripId,
    pub requester: String,
    pub requester_email: Option<String>,
    pub department: String,
    pub destination: String,
    pub start: NaiveDate,
    pub end: Option<NaiveDate>,
    pub purpose: String,
    pub cost_estimate: Option<f64>,
    pub travel: TravelDetails,
    pub(crate) risk: RiskAssessment,
    pub(crate) policy: Option<PolicyRef>,
    pub(crate) policy_violations: Vec<PolicyViolation>,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) status: TripStatus,
    pub(crate) attachments: Vec<Attachment>,
    pub(crate) timeline: Vec<TimelineEntry>,
    pub(crate) comments: Vec<Comment>,
}

impl Trip {
    pub fn id(&self) -> &TripId {
        &self.id
    }

    pub fn status(&self) -> TripStatus {
        self.status
    }

    /// Assessment recorded when the trip was committed.
    pub fn risk(&self) -> &RiskAssessment {
        &self.risk
    }

    pub fn risk_level(&self) -> RiskLevel {
        self.risk.level
    }

    /// Policy version the trip was evaluated against.
    pub fn policy(&self) -> Option<&PolicyRef> {
        self.policy.as_ref()
    }

    pub fn policy_violations(&self) -> &[PolicyViolation] {
        &self.policy_violations
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Newest-first status history.
    pub fn timeline(&self) -> &[TimelineEntry] {
        &self.timeline
    }

    /// Newest-first comments.
    pub fn comments(&self) -> &[Comment] {
        &self.comments
    }

    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    pub fn contact_email(&self) -> Option<&str> {
        self.requester_email
            .as_deref()
            .map(str::trim)
            .filter(|email| !email.is_empty())
    }

    /// Human readable date span used in notifications.
    pub fn date_span(&self) -> String {
        match self.end {
            Some(end) => format!("{} → {}", self.start, end),
            None => format!("{} → open", self.start),
        }
    }

    /// Timeline entries and comments merged into one newest-first record.
    pub fn audit_trail(&self) -> Vec<AuditEntry> {
        let mut entries: Vec<AuditEntry> = self
            .timeline
            .iter()
            .map(|entry| AuditEntry {
                at: entry.at,
                actor: entry.actor.clone(),
                kind: AuditKind::Status,
                detail: entry.status.label().to_string(),
            })
            .chain(self.comments.iter().map(|comment| AuditEntry {
                at: comment.at,
                actor: comment.author.clone(),
                kind: AuditKind::Comment,
                detail: comment.text.clone(),
            }))
            .collect();
        // stable sort keeps the insertion order of same-instant events
        entries.sort_by(|left, right| right.at.cmp(&left.at));
        entries
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    Status,
    Comment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub at: DateTime<Utc>,
    pub actor: String,
    pub kind: AuditKind,
    pub detail: String,
}

/// Listing filter. Text fields are case-insensitive substring matches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TripFilter {
    pub status: Option<TripStatus>,
    pub department: Option<String>,
    pub destination: Option<String>,
    pub requester: Option<String>,
}

impl TripFilter {
    pub fn matches(&self, trip: &Trip) -> bool {
        if let Some(status) = self.status {
            if trip.status != status {
                return false;
            }
        }
        contains_folded(&trip.department, self.department.as_deref())
            && contains_folded(&trip.destination, self.destination.as_deref())
            && contains_folded(&trip.requester, self.requester.as_deref())
    }
}

fn contains_folded(haystack: &str, needle: Option<&str>) -> bool {
    match needle.map(str::trim) {
        None | Some("") => true,
        Some(needle) => haystack
            .to_lowercase()
            .contains(&needle.to_lowercase()),
    }
}
