//! Typed clinical payloads exchanged between tools, reasoning tiers, and
//! the safety monitor.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Electronic health record
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Demographics {
    #[serde(default)]
    pub age: u32,
    #[serde(default)]
    pub gender: String,
    #[serde(default)]
    pub weight_kg: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    pub name: String,
    #[serde(default = "default_condition_status")]
    pub status: String,
    #[serde(default)]
    pub onset: Option<String>,
}

fn default_condition_status() -> String {
    "active".to_string()
}

impl Condition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: default_condition_status(),
            onset: None,
        }
    }

    /// True for statuses that mean the condition is no longer current.
    pub fn is_resolved(&self) -> bool {
        let status = self.status.to_lowercase();
        status == "resolved" || status == "past" || status == "history"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Allergy {
    pub name: String,
    #[serde(default)]
    pub reaction: String,
    #[serde(default)]
    pub severity: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Vitals {
    #[serde(default)]
    pub blood_pressure: Option<String>,
    #[serde(default)]
    pub heart_rate: Option<u32>,
    #[serde(default)]
    pub temperature_f: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EhrRecord {
    #[serde(default)]
    pub demographics: Demographics,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub allergies: Vec<Allergy>,
    #[serde(default)]
    pub vitals: Vitals,
}

impl EhrRecord {
    pub fn active_conditions(&self) -> impl Iterator<Item = &Condition> {
        self.conditions.iter().filter(|c| !c.is_resolved())
    }

    pub fn active_condition_count(&self) -> usize {
        self.active_conditions().count()
    }

    pub fn past_conditions(&self) -> impl Iterator<Item = &Condition> {
        self.conditions.iter().filter(|c| c.is_resolved())
    }

    /// Case-insensitive substring match against active condition names.
    pub fn has_condition(&self, keyword: &str) -> bool {
        let keyword = keyword.to_lowercase();
        self.active_conditions()
            .any(|c| c.name.to_lowercase().contains(&keyword))
    }
}

// ---------------------------------------------------------------------------
// Labs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LabStatus {
    Normal,
    High,
    Low,
    CriticalHigh,
    CriticalLow,
}

impl LabStatus {
    pub fn is_abnormal(&self) -> bool {
        !matches!(self, LabStatus::Normal)
    }

    pub fn is_critical(&self) -> bool {
        matches!(self, LabStatus::CriticalHigh | LabStatus::CriticalLow)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LabStatus::Normal => "NORMAL",
            LabStatus::High => "HIGH",
            LabStatus::Low => "LOW",
            LabStatus::CriticalHigh => "CRITICAL_HIGH",
            LabStatus::CriticalLow => "CRITICAL_LOW",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabResult {
    pub test: String,
    pub value: f64,
    #[serde(default)]
    pub unit: String,
    #[serde(default = "default_lab_status")]
    pub status: LabStatus,
}

fn default_lab_status() -> LabStatus {
    LabStatus::Normal
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LabPanel {
    #[serde(default)]
    pub results: Vec<LabResult>,
    /// Prior values keyed as `<test>_6mo_ago` (lowercase, spaces as underscores).
    #[serde(default, rename = "historical_data")]
    pub historical: HashMap<String, f64>,
}

impl LabPanel {
    /// Current value for a test, matched case-insensitively by substring.
    pub fn value_of(&self, test: &str) -> Option<f64> {
        let test = test.to_lowercase();
        self.results
            .iter()
            .find(|r| r.test.to_lowercase().contains(&test))
            .map(|r| r.value)
    }

    pub fn abnormal(&self) -> impl Iterator<Item = &LabResult> {
        self.results.iter().filter(|r| r.status.is_abnormal())
    }

    /// The six-months-ago value for a test, if recorded.
    pub fn historical_for(&self, test: &str) -> Option<f64> {
        let key = format!("{}_6mo_ago", test.to_lowercase().replace(' ', "_"));
        self.historical.get(&key).copied()
    }
}

// ---------------------------------------------------------------------------
// Medications and prescriptions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Medication {
    pub name: String,
    #[serde(default)]
    pub dose: Option<String>,
    #[serde(default)]
    pub frequency: Option<String>,
}

impl Medication {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dose: None,
            frequency: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MedicationList {
    #[serde(default)]
    pub active: Vec<Medication>,
}

impl MedicationList {
    pub fn names(&self) -> Vec<String> {
        self.active.iter().map(|m| m.name.clone()).collect()
    }
}

/// A proposed (not yet dispensed) order, the unit of safety validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prescription {
    pub name: String,
    pub dose: String,
    pub frequency: String,
    #[serde(default)]
    pub instructions: Option<String>,
}

// ---------------------------------------------------------------------------
// Drug-drug interactions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionSeverity {
    Severe,
    Major,
    Moderate,
    Minor,
    None,
}

impl InteractionSeverity {
    /// Severe and major interactions demand action rather than monitoring.
    pub fn is_high_risk(&self) -> bool {
        matches!(self, InteractionSeverity::Severe | InteractionSeverity::Major)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionSeverity::Severe => "severe",
            InteractionSeverity::Major => "major",
            InteractionSeverity::Moderate => "moderate",
            InteractionSeverity::Minor => "minor",
            InteractionSeverity::None => "none",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    pub drug_a: String,
    pub drug_b: String,
    pub severity: InteractionSeverity,
    pub description: String,
    #[serde(default)]
    pub recommendation: Option<String>,
}

impl Interaction {
    pub fn involves(&self, drug: &str) -> bool {
        let drug = drug.to_lowercase();
        self.drug_a.to_lowercase() == drug || self.drug_b.to_lowercase() == drug
    }
}

// ---------------------------------------------------------------------------
// Guidelines and imaging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuidelineHit {
    pub title: String,
    pub snippet: String,
    pub source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImagingStudy {
    pub study: String,
    #[serde(default)]
    pub date: Option<String>,
    pub impression: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImagingReport {
    #[serde(default)]
    pub studies: Vec<ImagingStudy>,
}

// ---------------------------------------------------------------------------
// Specialist reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Rising,
    Falling,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabTrend {
    pub test: String,
    pub previous: f64,
    pub current: f64,
    pub direction: TrendDirection,
    pub change_percent: f64,
    pub significance: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComorbidityPattern {
    pub name: String,
    pub description: String,
    pub monitoring: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrendReport {
    pub trends: Vec<LabTrend>,
    pub patterns: Vec<ComorbidityPattern>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskFinding {
    pub category: String,
    pub detail: String,
    pub action: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RiskReport {
    /// High-risk findings that should change the plan.
    pub risks: Vec<RiskFinding>,
    /// Findings to monitor.
    pub warnings: Vec<RiskFinding>,
    /// Critically out-of-range values needing immediate review.
    pub critical_values: Vec<RiskFinding>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuidelineRecommendation {
    pub source: String,
    pub recommendation: String,
    pub strength: String,
    pub urgency: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GuidanceReport {
    pub applicable: Vec<GuidelineHit>,
    pub recommendations: Vec<GuidelineRecommendation>,
}
