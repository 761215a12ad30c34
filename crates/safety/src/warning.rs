//! The safety warning vocabulary. Warnings accumulate append-only across
//! pipeline phases; a later phase never edits or removes an earlier one.

use serde::{Deserialize, Serialize};

use meditriage_common::InteractionSeverity;

/// Warning severity, totally ordered with `Critical` highest.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// Translate the interaction database's vocabulary. Severe and major
    /// interactions with a drug being prescribed right now are critical.
    pub fn from_interaction(severity: InteractionSeverity) -> Self {
        match severity {
            InteractionSeverity::Severe | InteractionSeverity::Major => Severity::Critical,
            InteractionSeverity::Moderate => Severity::High,
            InteractionSeverity::Minor => Severity::Medium,
            InteractionSeverity::None => Severity::Low,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningType {
    Interaction,
    Allergy,
    Contraindication,
    Dosing,
    SystemError,
    Info,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyWarning {
    pub severity: Severity,
    pub drug_name: String,
    pub warning_type: WarningType,
    pub message: String,
    pub recommendation: String,
    #[serde(default)]
    pub alternative: Option<String>,
}

impl SafetyWarning {
    /// Warnings at or above High feed recommendations and escalation.
    pub fn is_actionable(&self) -> bool {
        self.severity >= Severity::High
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_orders_critical_highest() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
    }

    #[test]
    fn interaction_severity_maps_exactly() {
        assert_eq!(
            Severity::from_interaction(InteractionSeverity::Major),
            Severity::Critical
        );
        assert_eq!(
            Severity::from_interaction(InteractionSeverity::Severe),
            Severity::Critical
        );
        assert_eq!(
            Severity::from_interaction(InteractionSeverity::Moderate),
            Severity::High
        );
        assert_eq!(
            Severity::from_interaction(InteractionSeverity::Minor),
            Severity::Medium
        );
        assert_eq!(
            Severity::from_interaction(InteractionSeverity::None),
            Severity::Low
        );
    }

    #[test]
    fn severity_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&Severity::Critical).unwrap(),
            "\"critical\""
        );
        let parsed: Severity = serde_json::from_str("\"medium\"").unwrap();
        assert_eq!(parsed, Severity::Medium);
    }
}
