mod rules;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::domain::TripDraft;
use super::policy::Policy;

/// One failed policy rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyViolation {
    pub rule: String,
    pub description: String,
}

impl PolicyViolation {
    pub fn new(rule: &str, description: impl Into<String>) -> Self {
        Self {
            rule: rule.to_string(),
            description: description.into(),
        }
    }
}

/// Inputs every rule sees. `today` anchors lead-time calculations.
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    pub draft: &'a TripDraft,
    pub policy: &'a Policy,
    pub today: NaiveDate,
}

/// Independent predicate returning a violation when the draft breaks the rule.
pub type RuleCheck = fn(&RuleContext<'_>) -> Option<PolicyViolation>;

#[derive(Debug, Clone, Copy)]
pub struct PolicyRule {
    pub name: &'static str,
    pub check: RuleCheck,
}

/// Stateless evaluator applying a registered list of rules to a draft.
#[derive(Debug, Clone)]
pub struct PolicyEvaluator {
    rules: Vec<PolicyRule>,
}

impl Default for PolicyEvaluator {
    fn default() -> Self {
        Self::standard()
    }
}

impl PolicyEvaluator {
    /// Evaluator with the built-in booking, accommodation, transport, and destination rules.
    pub fn standard() -> Self {
        Self {
            rules: rules::standard_rules(),
        }
    }

    #[cfg(test)]
    pub(crate) fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Register an additional rule; violations are emitted in registration order.
    pub fn with_rule(mut self, name: &'static str, check: RuleCheck) -> Self {
        self.rules.push(PolicyRule { name, check });
        self
    }

    #[cfg(test)]
    pub(crate) fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|rule| rule.name).collect()
    }

    /// Evaluate a draft. Without a policy the draft is always compliant.
    pub fn evaluate(
        &self,
        draft: &TripDraft,
        policy: Option<&Policy>,
        today: NaiveDate,
    ) -> Vec<PolicyViolation> {
        let Some(policy) = policy else {
            return Vec::new();
        };

        let context = RuleContext {
            draft,
            policy,
            today,
        };
        self.rules
            .iter()
            .filter_map(|rule| (rule.check)(&context))
            .collect()
    }
}
