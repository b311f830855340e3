use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::domain::{
    Actor, ActorRole, AuditEntry, FileMeta, Trip, TripDraft, TripFilter, TripId, TripStatus,
    ValidationError, AUTO_APPROVE_ACTOR, SYSTEM_ACTOR,
};
use super::evaluation::PolicyEvaluator;
use super::lifecycle::{CommitRecord, LifecycleAction, TransitionRejected};
use super::notifications::{
    approval_notice, escalation_notice, rejection_notice, NotificationEvent, NotificationSink,
};
use super::pending::{DecisionId, PendingAction, PendingDecision, PendingDecisions};
use super::policy::{Policy, PolicyId};
use super::repository::{PolicyStore, RepositoryError, TripRepository};
use super::risk;

const WITHDRAWN_REASON: &str = "Withdrawn by approver";

/// Time source so evaluations anchored on "today" stay reproducible.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Engine settings.
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Fallback escalation recipients when a policy names none.
    pub manager_recipients: Vec<String>,
    /// `None` keeps pending decisions valid until resolved.
    pub pending_decision_ttl: Option<Duration>,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            manager_recipients: vec!["travel-managers@example.com".to_string()],
            pending_decision_ttl: Some(Duration::minutes(60)),
        }
    }
}

/// Result of a trip request: either committed, or held for human confirmation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RequestOutcome {
    Committed { trip: Trip },
    PendingDecision { decision: PendingDecision },
}

/// Per-trip mutual exclusion so a transition is atomic with respect to its own trip.
#[derive(Default)]
struct TripLocks {
    entries: Mutex<HashMap<TripId, Arc<Mutex<()>>>>,
}

impl TripLocks {
    fn for_trip(&self, id: &TripId) -> Arc<Mutex<()>> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.entry(id.clone()).or_default().clone()
    }

    fn release(&self, id: &TripId) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
    }
}

/// Service composing the risk analyzer, policy evaluator, trip repository, and
/// notification sink into the trip lifecycle.
pub struct TripLifecycleService<R, P, N> {
    repository: Arc<R>,
    policies: Arc<P>,
    notifier: Arc<N>,
    evaluator: PolicyEvaluator,
    clock: Arc<dyn Clock>,
    config: LifecycleConfig,
    locks: TripLocks,
    decisions: PendingDecisions,
}

impl<R, P, N> TripLifecycleService<R, P, N>
where
    R: TripRepository + 'static,
    P: PolicyStore + 'static,
    N: NotificationSink + 'static,
{
    pub fn new(
        repository: Arc<R>,
        policies: Arc<P>,
        notifier: Arc<N>,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            repository,
            policies,
            notifier,
            evaluator: PolicyEvaluator::standard(),
            clock: Arc::new(SystemClock),
            config,
            locks: TripLocks::default(),
            decisions: PendingDecisions::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_evaluator(mut self, evaluator: PolicyEvaluator) -> Self {
        self.evaluator = evaluator;
        self
    }

    /// Evaluate a draft and either commit it or hand back a decision for confirmation.
    pub fn request_trip(
        &self,
        draft: TripDraft,
        policy_id: Option<&PolicyId>,
    ) -> Result<RequestOutcome, TripServiceError> {
        let start = draft.validate()?;
        let policy = match policy_id {
            Some(id) => Some(
                self.policies
                    .get(id)?
                    .ok_or_else(|| NotFoundError::Policy(id.clone()))?,
            ),
            None => None,
        };

        let now = self.clock.now();
        let risk = risk::analyze(&draft.destination, Some(start));
        let violations = self
            .evaluator
            .evaluate(&draft, policy.as_ref(), now.date_naive());

        if risk.level.needs_confirmation() || !violations.is_empty() {
            let decision = PendingDecision::new(
                draft,
                policy.as_ref().map(Policy::reference),
                risk,
                violations,
                self.escalation_recipients(policy.as_ref()),
                now,
                self.config.pending_decision_ttl,
            );
            info!(
                decision_id = %decision.id,
                risk = %decision.risk.level,
                violations = decision.violations.len(),
                "trip request held for confirmation"
            );
            self.decisions
                .hold(decision.clone(), now, self.config.pending_decision_ttl);
            return Ok(RequestOutcome::PendingDecision { decision });
        }

        let auto_approve = policy
            .as_ref()
            .is_some_and(|policy| policy.auto_approves(draft.cost_estimate));
        let record = CommitRecord {
            risk,
            policy: policy.as_ref().map(Policy::reference),
            violations,
        };
        let mut trip = Trip::commit(draft, start, record, now);
        if auto_approve {
            trip.transition(LifecycleAction::Approve, AUTO_APPROVE_ACTOR, now)
                .map_err(|rejected| TripServiceError::rejected(&trip.id, rejected))?;
        }

        self.repository.save(&trip)?;
        info!(
            trip_id = %trip.id,
            status = %trip.status(),
            actor = %trip.requester,
            "trip committed"
        );

        if auto_approve {
            if let Some(to) = trip.contact_email() {
                self.notify(approval_notice(&trip, to, None, now));
            }
        }

        Ok(RequestOutcome::Committed { trip })
    }

    /// Resolve a held request by id. Each decision resolves once; `Cancel` discards
    /// it and returns `None`, even when the id is no longer held.
    pub fn resolve_pending(
        &self,
        decision_id: &DecisionId,
        action: PendingAction,
        note: Option<&str>,
    ) -> Result<Option<Trip>, TripServiceError> {
        let held = self.decisions.take(decision_id);
        if action == PendingAction::Cancel {
            info!(decision_id = %decision_id, held = held.is_some(), "pending decision cancelled");
            return Ok(None);
        }
        let decision = held.ok_or_else(|| NotFoundError::Decision(decision_id.clone()))?;

        let now = self.clock.now();
        if decision.is_expired(now) {
            let expired_at = decision.expires_at.unwrap_or(decision.created_at);
            info!(decision_id = %decision.id, %expired_at, "pending decision expired");
            return Err(TripServiceError::DecisionExpired {
                decision_id: decision.id,
                expired_at,
            });
        }

        let start = decision.draft.validate()?;
        let record = CommitRecord {
            risk: decision.risk.clone(),
            policy: decision.policy.clone(),
            violations: decision.violations.clone(),
        };
        let mut trip = Trip::commit(decision.draft.clone(), start, record, now);
        let note = note.map(str::trim).filter(|note| !note.is_empty());
        if let Some(note) = note {
            let author = trip.requester.clone();
            trip.add_comment(&author, note, now);
        }

        if let Err(err) = self.repository.save(&trip) {
            self.decisions.restore(decision);
            return Err(err.into());
        }
        info!(
            trip_id = %trip.id,
            decision_id = %decision.id,
            action = ?action,
            "pending decision committed"
        );

        if action == PendingAction::RequestApproval {
            for recipient in &decision.escalation_recipients {
                self.notify(escalation_notice(&trip, &decision, recipient, note, now));
            }
        }

        Ok(Some(trip))
    }

    #[cfg(test)]
    pub(crate) fn held_decisions(&self) -> usize {
        self.decisions.len()
    }

    pub fn approve(
        &self,
        trip_id: &TripId,
        actor: &Actor,
        comment: Option<&str>,
    ) -> Result<Trip, TripServiceError> {
        ensure_can_decide(actor, LifecycleAction::Approve)?;
        let comment = comment.map(str::trim).filter(|text| !text.is_empty());

        let (trip, now) = self.mutate(trip_id, LifecycleAction::Approve, &actor.name, |trip, now| {
            trip.transition(LifecycleAction::Approve, &actor.name, now)
                .map_err(|rejected| TripServiceError::rejected(trip_id, rejected))?;
            if let Some(comment) = comment {
                trip.add_comment(&actor.name, comment, now);
            }
            Ok(now)
        })?;

        if let Some(to) = trip.contact_email() {
            self.notify(approval_notice(&trip, to, comment, now));
        }
        Ok(trip)
    }

    /// Reject a pending trip or withdraw an approved one.
    pub fn reject(
        &self,
        trip_id: &TripId,
        actor: &Actor,
        reason: &str,
    ) -> Result<Trip, TripServiceError> {
        ensure_can_decide(actor, LifecycleAction::Reject)?;

        let (trip, (reason, now)) =
            self.mutate(trip_id, LifecycleAction::Reject, &actor.name, |trip, now| {
                let reason = match reason.trim() {
                    "" if trip.status() == TripStatus::Approved => WITHDRAWN_REASON.to_string(),
                    "" if trip.status() == TripStatus::Pending => {
                        return Err(ValidationError::MissingRejectionReason.into())
                    }
                    reason => reason.to_string(),
                };
                trip.transition(LifecycleAction::Reject, &actor.name, now)
                    .map_err(|rejected| TripServiceError::rejected(trip_id, rejected))?;
                trip.add_comment(&actor.name, &reason, now);
                Ok((reason, now))
            })?;

        if let Some(to) = trip.contact_email() {
            self.notify(rejection_notice(&trip, to, &reason, now));
        }
        Ok(trip)
    }

    pub fn activate(&self, trip_id: &TripId) -> Result<Trip, TripServiceError> {
        self.system_transition(trip_id, LifecycleAction::Activate)
    }

    pub fn complete(&self, trip_id: &TripId) -> Result<Trip, TripServiceError> {
        self.system_transition(trip_id, LifecycleAction::Complete)
    }

    pub fn attach_file(&self, trip_id: &TripId, file: FileMeta) -> Result<Trip, TripServiceError> {
        if file.filename.trim().is_empty() {
            return Err(ValidationError::MissingFilename.into());
        }

        let (trip, ()) = self.mutate(trip_id, LifecycleAction::AttachFile, SYSTEM_ACTOR, |trip, now| {
            trip.attach(file, now)
                .map_err(|rejected| TripServiceError::rejected(trip_id, rejected))
        })?;
        Ok(trip)
    }

    pub fn add_comment(
        &self,
        trip_id: &TripId,
        actor: &Actor,
        text: &str,
    ) -> Result<Trip, TripServiceError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ValidationError::EmptyComment.into());
        }

        let (trip, ()) = self.mutate(trip_id, LifecycleAction::AddComment, &actor.name, |trip, now| {
            trip.add_comment(&actor.name, text, now);
            Ok(())
        })?;
        Ok(trip)
    }

    /// Remove a trip regardless of status.
    pub fn delete(&self, trip_id: &TripId) -> Result<(), TripServiceError> {
        let lock = self.locks.for_trip(trip_id);
        {
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            if self.repository.load(trip_id)?.is_none() {
                return Err(NotFoundError::Trip(trip_id.clone()).into());
            }
            self.repository.delete(trip_id)?;
        }
        self.locks.release(trip_id);
        info!(trip_id = %trip_id, "trip deleted");
        Ok(())
    }

    pub fn get_trip(&self, trip_id: &TripId) -> Result<Trip, TripServiceError> {
        let trip = self
            .repository
            .load(trip_id)?
            .ok_or_else(|| NotFoundError::Trip(trip_id.clone()))?;
        Ok(trip)
    }

    /// Newest-first list of trips matching the filter.
    pub fn list_trips(&self, filter: &TripFilter) -> Result<Vec<Trip>, TripServiceError> {
        let mut trips: Vec<Trip> = self
            .repository
            .list(filter)?
            .into_iter()
            .filter(|trip| filter.matches(trip))
            .collect();
        trips.sort_by(|left, right| right.created_at.cmp(&left.created_at));
        Ok(trips)
    }

    pub fn audit_trail(&self, trip_id: &TripId) -> Result<Vec<AuditEntry>, TripServiceError> {
        Ok(self.get_trip(trip_id)?.audit_trail())
    }

    fn system_transition(
        &self,
        trip_id: &TripId,
        action: LifecycleAction,
    ) -> Result<Trip, TripServiceError> {
        let (trip, _) = self.mutate(trip_id, action, SYSTEM_ACTOR, |trip, now| {
            trip.transition(action, SYSTEM_ACTOR, now)
                .map_err(|rejected| TripServiceError::rejected(trip_id, rejected))
        })?;
        Ok(trip)
    }

    /// Load, change, and persist one trip while holding its lock. A failing `apply`
    /// leaves the stored trip untouched.
    fn mutate<T>(
        &self,
        trip_id: &TripId,
        action: LifecycleAction,
        actor: &str,
        apply: impl FnOnce(&mut Trip, DateTime<Utc>) -> Result<T, TripServiceError>,
    ) -> Result<(Trip, T), TripServiceError> {
        let lock = self.locks.for_trip(trip_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut trip = self
            .repository
            .load(trip_id)?
            .ok_or_else(|| NotFoundError::Trip(trip_id.clone()))?;
        let from = trip.status();
        let now = self.clock.now();

        let output = match apply(&mut trip, now) {
            Ok(output) => output,
            Err(err) => {
                debug!(trip_id = %trip_id, action = %action, error = %err, "trip update refused");
                return Err(err);
            }
        };

        self.repository.save(&trip)?;
        info!(
            trip_id = %trip_id,
            action = %action,
            from = %from,
            to = %trip.status(),
            actor,
            "trip updated"
        );
        Ok((trip, output))
    }

    fn escalation_recipients(&self, policy: Option<&Policy>) -> Vec<String> {
        match policy {
            Some(policy) if !policy.notification_emails.is_empty() => {
                policy.notification_emails.clone()
            }
            _ => self.config.manager_recipients.clone(),
        }
    }

    fn notify(&self, event: NotificationEvent) {
        let id = event.id.clone();
        let trip_id = event.trip_id.clone();
        if let Err(err) = self.notifier.send(event) {
            warn!(notification_id = %id, trip_id = %trip_id, error = %err, "notification not sent");
        }
    }
}

fn ensure_can_decide(actor: &Actor, action: LifecycleAction) -> Result<(), TripServiceError> {
    if actor.role.can_decide() {
        return Ok(());
    }
    debug!(actor = %actor.name, role = %actor.role, action = %action, "permission denied");
    Err(TripServiceError::PermissionDenied {
        actor: actor.name.clone(),
        role: actor.role,
        action,
    })
}

#[derive(Debug, thiserror::Error)]
pub enum NotFoundError {
    #[error("trip {0} not found")]
    Trip(TripId),
    #[error("policy {0} not found")]
    Policy(PolicyId),
    #[error("pending decision {0} not found")]
    Decision(DecisionId),
}

/// Error raised by the trip lifecycle service.
#[derive(Debug, thiserror::Error)]
pub enum TripServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("cannot {action} trip {trip_id} while it is {status}")]
    InvalidTransition {
        trip_id: TripId,
        status: TripStatus,
        action: LifecycleAction,
    },
    #[error(transparent)]
    NotFound(#[from] NotFoundError),
    #[error("{actor} ({role}) is not permitted to {action} trip requests")]
    PermissionDenied {
        actor: String,
        role: ActorRole,
        action: LifecycleAction,
    },
    #[error("pending decision {decision_id} expired at {expired_at}")]
    DecisionExpired {
        decision_id: DecisionId,
        expired_at: DateTime<Utc>,
    },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl TripServiceError {
    fn rejected(trip_id: &TripId, rejected: TransitionRejected) -> Self {
        Self::InvalidTransition {
            trip_id: trip_id.clone(),
            status: rejected.status,
            action: rejected.action,
        }
    }
}
