//! Offline destination risk heuristic.
//!
//! Keyword matching against fixed country and city lists plus a seasonal hurricane check.
//! The analysis never fails: a missing start date simply skips the seasonal rule.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

const HIGH_RISK_COUNTRIES: &[&str] = &[
    "syria",
    "afghanistan",
    "yemen",
    "somalia",
    "north korea",
    "iraq",
];
const MEDIUM_RISK_COUNTRIES: &[&str] = &["mexico", "haiti", "venezuela", "ukraine", "pakistan"];
const UNREST_CITIES: &[&str] = &["karachi", "kabul", "moscow"];
const HURRICANE_REGIONS: &[&str] = &["caribbean", "mexico", "bahamas", "puerto rico"];
const HURRICANE_MONTHS: std::ops::RangeInclusive<u32> = 6..=11;

const NO_FINDINGS: &str = "No obvious red flags detected by offline analyzer";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub const fn label(self) -> &'static str {
        match self {
            RiskLevel::Low => "Low",
            RiskLevel::Medium => "Medium",
            RiskLevel::High => "High",
        }
    }

    /// Whether a request at this level must be confirmed by a person before commit.
    pub const fn needs_confirmation(self) -> bool {
        !matches!(self, RiskLevel::Low)
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub level: RiskLevel,
    pub reasons: Vec<String>,
    pub safe: bool,
}

/// Classify a destination and optional start date.
pub fn analyze(destination: &str, start: Option<NaiveDate>) -> RiskAssessment {
    let folded = destination.to_lowercase();
    let mut level = RiskLevel::Low;
    let mut reasons = Vec::new();

    if let Some(country) = first_match(&folded, HIGH_RISK_COUNTRIES) {
        level = RiskLevel::High;
        reasons.push(format!("Destination matched high-risk country: {country}"));
    } else if let Some(country) = first_match(&folded, MEDIUM_RISK_COUNTRIES) {
        level = RiskLevel::Medium;
        reasons.push(format!("Destination matched medium-risk country: {country}"));
    }

    if first_match(&folded, UNREST_CITIES).is_some() && level < RiskLevel::High {
        level = RiskLevel::Medium;
        reasons.push("City-level advisory (localized unrest or travel advisory)".to_string());
    }

    if let Some(start) = start {
        if first_match(&folded, HURRICANE_REGIONS).is_some()
            && HURRICANE_MONTHS.contains(&start.month())
        {
            level = level.max(RiskLevel::Medium);
            reasons.push("Trip falls within hurricane season for the destination (Jun–Nov)".to_string());
        }
    }

    if reasons.is_empty() {
        reasons.push(NO_FINDINGS.to_string());
    }

    RiskAssessment {
        level,
        safe: level == RiskLevel::Low,
        reasons,
    }
}

/// Parse a loosely formatted date; anything unparseable disables the seasonal rule.
pub fn parse_start(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    let date_part = trimmed.get(..10).unwrap_or(trimmed);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

fn first_match(haystack: &str, keywords: &[&'static str]) -> Option<&'static str> {
    keywords
        .iter()
        .copied()
        .find(|keyword| haystack.contains(keyword))
}
