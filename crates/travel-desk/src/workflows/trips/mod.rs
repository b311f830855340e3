//! Trip requests from draft to completion.
//!
//! A draft is risk-scored and checked against its travel policy. Clean drafts are
//! committed straight away; flagged drafts come back as a [`PendingDecision`] that the
//! requester confirms, escalates, or cancels. Committed trips then move through the
//! approval state machine in [`lifecycle`].

pub mod domain;
pub mod evaluation;
pub mod lifecycle;
pub mod notifications;
pub mod pending;
pub mod policy;
pub mod repository;
pub mod risk;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use domain::{
    Actor, ActorRole, Attachment, AuditEntry, AuditKind, Comment, FareClass, FileMeta,
    TimelineEntry, TimelineStatus, TransportMode, TravelDetails, Trip, TripDraft, TripFilter,
    TripId, TripStatus, ValidationError, AUTO_APPROVE_ACTOR, SYSTEM_ACTOR,
};
pub use evaluation::{PolicyEvaluator, PolicyRule, PolicyViolation, RuleCheck, RuleContext};
pub use lifecycle::{permits, LifecycleAction, TransitionRejected};
pub use notifications::{
    NotificationError, NotificationEvent, NotificationOutbox, NotificationSink, OutboxDispatcher,
};
pub use pending::{DecisionId, PendingAction, PendingDecision};
pub use policy::{
    AccommodationRules, BookingRules, Policy, PolicyId, PolicyRef, RiskApproval, TransportRules,
};
pub use repository::{PolicyStore, RepositoryError, TripRepository};
pub use risk::{RiskAssessment, RiskLevel};
pub use router::trip_router;
pub use service::{
    Clock, LifecycleConfig, NotFoundError, RequestOutcome, SystemClock, TripLifecycleService,
    TripServiceError,
};
