use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::domain::TripDraft;
use super::evaluation::PolicyViolation;
use super::policy::PolicyRef;
use super::risk::RiskAssessment;

/// Identifier handed to the caller when a request is held.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DecisionId(pub String);

impl DecisionId {
    pub fn generate() -> Self {
        Self(format!("decision-{}", Uuid::new_v4().simple()))
    }
}

impl fmt::Display for DecisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Evaluation result held until a person confirms, escalates, or cancels it. The
/// service keeps the authoritative copy; callers resolve it by id. Nothing is
/// persisted while a decision is outstanding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingDecision {
    pub id: DecisionId,
    pub draft: TripDraft,
    pub policy: Option<PolicyRef>,
    pub risk: RiskAssessment,
    pub violations: Vec<PolicyViolation>,
    /// Escalation recipients resolved at evaluation time.
    pub escalation_recipients: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl PendingDecision {
    pub(crate) fn new(
        draft: TripDraft,
        policy: Option<PolicyRef>,
        risk: RiskAssessment,
        violations: Vec<PolicyViolation>,
        escalation_recipients: Vec<String>,
        created_at: DateTime<Utc>,
        ttl: Option<Duration>,
    ) -> Self {
        Self {
            id: DecisionId::generate(),
            draft,
            policy,
            risk,
            violations,
            escalation_recipients,
            created_at,
            expires_at: ttl.map(|ttl| created_at + ttl),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }

    /// Reasons the request was held, risk findings first.
    pub fn hold_reasons(&self) -> Vec<String> {
        let mut reasons = Vec::new();
        if self.risk.level.needs_confirmation() {
            reasons.extend(
                self.risk
                    .reasons
                    .iter()
                    .map(|reason| format!("Risk ({}): {reason}", self.risk.level)),
            );
        }
        reasons.extend(
            self.violations
                .iter()
                .map(|violation| format!("Policy: {}", violation.description)),
        );
        reasons
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingAction {
    /// Commit as pending, overriding the flagged risk or violations.
    Confirm,
    /// Commit as pending and escalate the findings to the manager list.
    RequestApproval,
    /// Discard the draft without side effects.
    Cancel,
}

/// Decisions issued by the service and not yet resolved. Taking a decision removes
/// it, so each one commits at most once.
#[derive(Debug, Default)]
pub(crate) struct PendingDecisions {
    entries: Mutex<HashMap<DecisionId, PendingDecision>>,
}

impl PendingDecisions {
    /// Store a new decision, dropping entries that expired at least `retention` ago.
    /// Recently expired entries stay so a late resolution still reports the expiry.
    pub(crate) fn hold(
        &self,
        decision: PendingDecision,
        now: DateTime<Utc>,
        retention: Option<Duration>,
    ) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(retention) = retention {
            let cutoff = now - retention;
            entries.retain(|_, held| !held.is_expired(cutoff));
        }
        entries.insert(decision.id.clone(), decision);
    }

    pub(crate) fn take(&self, id: &DecisionId) -> Option<PendingDecision> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
    }

    /// Put back a decision whose commit failed before anything was stored.
    pub(crate) fn restore(&self, decision: PendingDecision) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(decision.id.clone(), decision);
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
