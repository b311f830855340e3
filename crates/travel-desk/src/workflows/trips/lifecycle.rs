//! Trip state machine.
//!
//! ```text
//! pending ──approve──▶ approved ──activate──▶ active ──complete──▶ completed
//!    │                    │
//!    └──reject──▶ rejected ◀──reject (withdraw)
//! ```
//!
//! `rejected` and `completed` are terminal. Comments are accepted in every state;
//! attachments only while the trip is still live.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    Attachment, Comment, FileMeta, TimelineEntry, TimelineStatus, Trip, TripDraft, TripId,
    TripStatus,
};
use super::evaluation::PolicyViolation;
use super::policy::PolicyRef;
use super::risk::RiskAssessment;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleAction {
    Approve,
    Reject,
    Activate,
    Complete,
    AttachFile,
    AddComment,
}

impl LifecycleAction {
    pub const fn label(self) -> &'static str {
        match self {
            LifecycleAction::Approve => "approve",
            LifecycleAction::Reject => "reject",
            LifecycleAction::Activate => "activate",
            LifecycleAction::Complete => "complete",
            LifecycleAction::AttachFile => "attach a file to",
            LifecycleAction::AddComment => "comment on",
        }
    }

    /// Timeline event recorded when the action changes status.
    const fn timeline_status(self) -> Option<TimelineStatus> {
        match self {
            LifecycleAction::Approve => Some(TimelineStatus::Approved),
            LifecycleAction::Reject => Some(TimelineStatus::Rejected),
            LifecycleAction::Activate => Some(TimelineStatus::Active),
            LifecycleAction::Complete => Some(TimelineStatus::Completed),
            LifecycleAction::AttachFile | LifecycleAction::AddComment => None,
        }
    }
}

impl fmt::Display for LifecycleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Guard table for every lifecycle action.
pub const fn permits(status: TripStatus, action: LifecycleAction) -> bool {
    match action {
        LifecycleAction::Approve => matches!(status, TripStatus::Pending),
        LifecycleAction::Reject => matches!(status, TripStatus::Pending | TripStatus::Approved),
        LifecycleAction::Activate => matches!(status, TripStatus::Approved),
        LifecycleAction::Complete => matches!(status, TripStatus::Active),
        LifecycleAction::AttachFile => !status.is_terminal(),
        LifecycleAction::AddComment => true,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cannot {action} a trip that is {status}")]
pub struct TransitionRejected {
    pub status: TripStatus,
    pub action: LifecycleAction,
}

/// Evaluation results frozen onto a trip when it is committed.
#[derive(Debug, Clone)]
pub(crate) struct CommitRecord {
    pub risk: RiskAssessment,
    pub policy: Option<PolicyRef>,
    pub violations: Vec<PolicyViolation>,
}

impl Trip {
    /// Build a freshly committed trip with its `requested` timeline entry.
    pub(crate) fn commit(
        draft: TripDraft,
        start: NaiveDate,
        record: CommitRecord,
        at: DateTime<Utc>,
    ) -> Self {
        let requester = draft.requester.trim().to_string();
        let requested = TimelineEntry {
            at,
            status: TimelineStatus::Requested,
            actor: requester.clone(),
        };
        Self {
            id: TripId::generate(),
            requester,
            requester_email: draft
                .contact_email()
                .map(str::to_string),
            department: draft.department,
            destination: draft.destination.trim().to_string(),
            start,
            end: draft.end,
            purpose: draft.purpose,
            cost_estimate: draft.cost_estimate,
            travel: draft.travel,
            risk: record.risk,
            policy: record.policy,
            policy_violations: record.violations,
            created_at: at,
            status: TripStatus::Pending,
            attachments: Vec::new(),
            timeline: vec![requested],
            comments: Vec::new(),
        }
    }

    /// Apply a status-changing action, returning the status the trip left.
    pub(crate) fn transition(
        &mut self,
        action: LifecycleAction,
        actor: &str,
        at: DateTime<Utc>,
    ) -> Result<TripStatus, TransitionRejected> {
        let rejected = TransitionRejected {
            status: self.status,
            action,
        };
        let event = action.timeline_status().ok_or(rejected)?;
        if !permits(self.status, action) {
            return Err(rejected);
        }

        let previous = self.status;
        self.timeline.insert(
            0,
            TimelineEntry {
                at,
                status: event,
                actor: actor.to_string(),
            },
        );
        self.status = event.resulting_status();
        Ok(previous)
    }

    pub(crate) fn attach(&mut self, file: FileMeta, at: DateTime<Utc>) -> Result<(), TransitionRejected> {
        if !permits(self.status, LifecycleAction::AttachFile) {
            return Err(TransitionRejected {
                status: self.status,
                action: LifecycleAction::AttachFile,
            });
        }
        self.attachments.push(Attachment {
            filename: file.filename,
            size_bytes: file.size_bytes,
            content_type: file.content_type,
            attached_at: at,
        });
        Ok(())
    }

    pub(crate) fn add_comment(&mut self, author: &str, text: &str, at: DateTime<Utc>) {
        self.comments.insert(
            0,
            Comment {
                author: author.to_string(),
                at,
                text: text.to_string(),
            },
        );
    }

    /// True when the newest timeline entry agrees with the current status.
    pub fn is_consistent(&self) -> bool {
        self.timeline
            .first()
            .is_some_and(|latest| latest.status.resulting_status() == self.status)
    }
}
