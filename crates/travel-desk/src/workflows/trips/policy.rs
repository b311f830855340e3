use serde::{Deserialize, Serialize};

use super::domain::{FareClass, TransportMode};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PolicyId(pub String);

impl std::fmt::Display for PolicyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Pins the exact policy version a trip was evaluated against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PolicyRef {
    pub id: PolicyId,
    pub version: u32,
}

/// Assignable travel ruleset. Published versions are immutable; edits are stored as a
/// new version by the policy store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub id: PolicyId,
    #[serde(default = "first_version")]
    pub version: u32,
    pub name: String,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub assigned_groups: Vec<String>,
    #[serde(default)]
    pub cost_centers: Vec<String>,
    #[serde(default)]
    pub booking: BookingRules,
    #[serde(default)]
    pub accommodation: AccommodationRules,
    #[serde(default)]
    pub transport: TransportRules,
    #[serde(default)]
    pub insurance_required: bool,
    #[serde(default)]
    pub budget_limit: Option<f64>,
    /// Destination keywords this policy refuses regardless of the offline risk analysis.
    #[serde(default)]
    pub restricted_destinations: Vec<String>,
    #[serde(default)]
    pub risk_approval: RiskApproval,
    /// Escalation recipients; the engine's manager list is used when empty.
    #[serde(default)]
    pub notification_emails: Vec<String>,
}

fn first_version() -> u32 {
    1
}

impl Policy {
    pub fn reference(&self) -> PolicyRef {
        PolicyRef {
            id: self.id.clone(),
            version: self.version,
        }
    }

    /// Whether a compliant, low-risk request at `cost` may skip human review.
    pub fn auto_approves(&self, cost: Option<f64>) -> bool {
        match (self.risk_approval, cost) {
            (RiskApproval::Auto { threshold }, Some(cost)) => cost <= threshold,
            _ => false,
        }
    }

    /// Baseline policy matching the defaults shipped with the original travel desk.
    pub fn standard() -> Self {
        Self {
            id: PolicyId("default".to_string()),
            version: 1,
            name: "Default Policy".to_string(),
            department: None,
            region: None,
            assigned_groups: Vec::new(),
            cost_centers: Vec::new(),
            booking: BookingRules::default(),
            accommodation: AccommodationRules {
                nightly_limit: Some(150.0),
                ..AccommodationRules::default()
            },
            transport: TransportRules::default(),
            insurance_required: true,
            budget_limit: None,
            restricted_destinations: Vec::new(),
            risk_approval: RiskApproval::Manual,
            notification_emails: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BookingRules {
    pub airfare_class: FareClass,
    pub advance_booking_days: u32,
    pub prefer_direct: bool,
    pub preferred_airlines: Vec<String>,
}

impl Default for BookingRules {
    fn default() -> Self {
        Self {
            airfare_class: FareClass::Economy,
            advance_booking_days: 14,
            prefer_direct: false,
            preferred_airlines: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccommodationRules {
    pub nightly_limit: Option<f64>,
    pub preferred_types: Vec<String>,
    pub preferred_hotels: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportRules {
    /// Empty means every ground transport mode is allowed.
    pub allowed_modes: Vec<TransportMode>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RiskApproval {
    #[default]
    Manual,
    Auto {
        threshold: f64,
    },
}
