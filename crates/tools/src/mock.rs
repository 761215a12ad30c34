//! Mock tools and sample payloads shared by tests across the workspace.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use meditriage_common::{
    Condition, Demographics, EhrRecord, Interaction, InteractionSeverity, LabPanel, LabResult,
    LabStatus, Medication, MedicationList, MeditriageError, Observation, Result,
};

use crate::registry::{Tool, ToolInput, ToolName};

/// Returns a fixed observation and counts invocations.
pub struct CannedTool {
    name: ToolName,
    payload: Observation,
    calls: AtomicUsize,
}

impl CannedTool {
    pub fn new(name: ToolName, payload: Observation) -> Self {
        Self {
            name,
            payload,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Tool for CannedTool {
    fn name(&self) -> ToolName {
        self.name
    }

    async fn invoke(&self, _input: ToolInput) -> Result<Observation> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.payload.clone())
    }
}

/// Always fails, with a configurable error class.
pub struct FailingTool {
    name: ToolName,
    error: fn(&str) -> MeditriageError,
    reason: String,
    calls: AtomicUsize,
}

impl FailingTool {
    /// Fails as if the data does not exist.
    pub fn unavailable(name: ToolName, reason: &str) -> Self {
        Self {
            name,
            error: |r| MeditriageError::DataUnavailable(r.to_string()),
            reason: reason.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Fails as if the data exists but cannot be parsed.
    pub fn malformed(name: ToolName, reason: &str) -> Self {
        Self {
            name,
            error: |r| MeditriageError::MalformedData(r.to_string()),
            reason: reason.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Tool for FailingTool {
    fn name(&self) -> ToolName {
        self.name
    }

    async fn invoke(&self, _input: ToolInput) -> Result<Observation> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err((self.error)(&self.reason))
    }
}

// ---------------------------------------------------------------------------
// Sample payloads
// ---------------------------------------------------------------------------

/// A multimorbid renal patient, the workhorse fixture.
pub fn sample_ehr() -> EhrRecord {
    EhrRecord {
        demographics: Demographics {
            age: 67,
            gender: "female".to_string(),
            weight_kg: Some(72.0),
        },
        conditions: vec![
            Condition::new("CKD Stage 3"),
            Condition::new("Type 2 Diabetes"),
            Condition::new("Hypertension"),
        ],
        allergies: vec![],
        vitals: Default::default(),
    }
}

/// Labs with declining kidney function and anemia, plus historical values.
pub fn renal_labs() -> LabPanel {
    let mut historical = std::collections::HashMap::new();
    historical.insert("creatinine_6mo_ago".to_string(), 1.4);
    historical.insert("egfr_6mo_ago".to_string(), 48.0);
    historical.insert("hemoglobin_6mo_ago".to_string(), 12.1);
    LabPanel {
        results: vec![
            LabResult {
                test: "Creatinine".to_string(),
                value: 1.8,
                unit: "mg/dL".to_string(),
                status: LabStatus::High,
            },
            LabResult {
                test: "eGFR".to_string(),
                value: 38.0,
                unit: "mL/min".to_string(),
                status: LabStatus::Low,
            },
            LabResult {
                test: "Hemoglobin".to_string(),
                value: 10.2,
                unit: "g/dL".to_string(),
                status: LabStatus::Low,
            },
        ],
        historical,
    }
}

pub fn sample_meds() -> MedicationList {
    MedicationList {
        active: vec![
            Medication::named("Lisinopril"),
            Medication::named("Metformin"),
            Medication::named("Atorvastatin"),
        ],
    }
}

pub fn sample_interaction() -> Interaction {
    Interaction {
        drug_a: "Lisinopril".to_string(),
        drug_b: "Spironolactone".to_string(),
        severity: InteractionSeverity::Major,
        description: "Risk of hyperkalemia".to_string(),
        recommendation: Some("Monitor potassium closely".to_string()),
    }
}
