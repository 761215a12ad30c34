//! Prescription safety validation. Runs after a clinician has decided on
//! treatment: every proposed order is checked against the patient's
//! interactions, allergies, contraindications, and dosing risk factors
//! through a fixed sequence of phases that always reaches a final
//! assessment.

pub mod monitor;
pub mod rules;
pub mod warning;

pub use monitor::{
    AlternativeSuggestion, SafetyMonitor, SafetyPhase, SafetyReport, SafetyStatus,
};
pub use warning::{SafetyWarning, Severity, WarningType};
