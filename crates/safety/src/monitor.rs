//! The safety pipeline. A fixed sequence of phases inspects every
//! proposed prescription against the gathered patient context; a phase
//! that fails is logged and skipped so the pipeline always reaches the
//! final assessment.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use meditriage_common::{
    Medication, Observation, ObservationSet, Prescription, ProgressSink, Result,
};
use meditriage_narrator::{user_prompt, Narrator};
use meditriage_tools::{ToolInput, ToolName, ToolRegistry};

use crate::rules;
use crate::warning::{SafetyWarning, Severity, WarningType};

const SAFETY_SYSTEM_PROMPT: &str = "You are reviewing proposed prescriptions for a \
clinical pharmacist. Explain the most important safety findings, why they matter \
for this patient, and what must happen before dispensing. Be concise and specific.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyPhase {
    InitialCheck,
    DdiAnalysis,
    ContraindicationCheck,
    DosingAnalysis,
    GuidelinesCheck,
    PharmacologyCheck,
    EhrHistoryCheck,
    LlmReasoning,
    FinalAssessment,
}

impl SafetyPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SafetyPhase::InitialCheck => "initial_check",
            SafetyPhase::DdiAnalysis => "ddi_analysis",
            SafetyPhase::ContraindicationCheck => "contraindication_check",
            SafetyPhase::DosingAnalysis => "dosing_analysis",
            SafetyPhase::GuidelinesCheck => "guidelines_check",
            SafetyPhase::PharmacologyCheck => "pharmacology_check",
            SafetyPhase::EhrHistoryCheck => "ehr_history_check",
            SafetyPhase::LlmReasoning => "llm_reasoning",
            SafetyPhase::FinalAssessment => "final_assessment",
        }
    }

    fn event(&self) -> &'static str {
        match self {
            SafetyPhase::InitialCheck => "SAFETY_MONITOR_INITIAL_CHECK",
            SafetyPhase::DdiAnalysis => "SAFETY_MONITOR_DDI_ANALYSIS",
            SafetyPhase::ContraindicationCheck => "SAFETY_MONITOR_CONTRAINDICATION_CHECK",
            SafetyPhase::DosingAnalysis => "SAFETY_MONITOR_DOSING_ANALYSIS",
            SafetyPhase::GuidelinesCheck => "SAFETY_MONITOR_GUIDELINES_CHECK",
            SafetyPhase::PharmacologyCheck => "SAFETY_MONITOR_PHARMACOLOGY_CHECK",
            SafetyPhase::EhrHistoryCheck => "SAFETY_MONITOR_EHR_HISTORY_CHECK",
            SafetyPhase::LlmReasoning => "SAFETY_MONITOR_LLM_REASONING",
            SafetyPhase::FinalAssessment => "SAFETY_MONITOR_FINAL_ASSESSMENT",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyStatus {
    Completed,
    NoPrescriptions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlternativeSuggestion {
    pub original_drug: String,
    pub alternative: String,
    pub reason: String,
    pub severity: Severity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyReport {
    pub status: SafetyStatus,
    pub warnings: Vec<SafetyWarning>,
    /// One actionable line per Critical/High warning.
    pub recommendations: Vec<String>,
    pub alternatives: Vec<AlternativeSuggestion>,
    /// Narrative review text, present only when the pipeline escalated.
    pub insights: Vec<String>,
    pub summary: String,
    pub phases_run: Vec<SafetyPhase>,
}

pub struct SafetyMonitor {
    registry: Arc<ToolRegistry>,
    narrator: Arc<dyn Narrator>,
}

impl SafetyMonitor {
    pub fn new(registry: Arc<ToolRegistry>, narrator: Arc<dyn Narrator>) -> Self {
        Self { registry, narrator }
    }

    pub async fn run(
        &self,
        patient_id: &str,
        prescriptions: &[Prescription],
        context: &ObservationSet,
        sink: &dyn ProgressSink,
    ) -> SafetyReport {
        sink.emit("SAFETY_MONITOR_STARTED");

        if prescriptions.is_empty() {
            sink.emit("SAFETY_MONITOR_NO_PRESCRIPTIONS");
            return SafetyReport {
                status: SafetyStatus::NoPrescriptions,
                warnings: Vec::new(),
                recommendations: Vec::new(),
                alternatives: Vec::new(),
                insights: Vec::new(),
                summary: "No prescriptions to validate".to_string(),
                phases_run: vec![SafetyPhase::InitialCheck],
            };
        }
        sink.emit(&format!(
            "SAFETY_MONITOR_VALIDATING_{}_PRESCRIPTIONS",
            prescriptions.len()
        ));

        let mut phases_run = Vec::new();
        let mut warnings: Vec<SafetyWarning> = Vec::new();

        enter(SafetyPhase::InitialCheck, &mut phases_run, sink);
        for prescription in prescriptions {
            sink.emit(&format!("SAFETY_CHECKING_{}", prescription.name));
        }

        enter(SafetyPhase::DdiAnalysis, &mut phases_run, sink);
        absorb(
            SafetyPhase::DdiAnalysis,
            self.ddi_analysis(prescriptions, context).await,
            &mut warnings,
        );

        enter(SafetyPhase::ContraindicationCheck, &mut phases_run, sink);
        absorb(
            SafetyPhase::ContraindicationCheck,
            contraindication_check(prescriptions, context),
            &mut warnings,
        );

        enter(SafetyPhase::DosingAnalysis, &mut phases_run, sink);
        absorb(
            SafetyPhase::DosingAnalysis,
            dosing_analysis(prescriptions, context),
            &mut warnings,
        );

        enter(SafetyPhase::GuidelinesCheck, &mut phases_run, sink);
        absorb(
            SafetyPhase::GuidelinesCheck,
            self.guidelines_check(prescriptions).await,
            &mut warnings,
        );

        enter(SafetyPhase::PharmacologyCheck, &mut phases_run, sink);
        absorb(
            SafetyPhase::PharmacologyCheck,
            pharmacology_check(prescriptions, context),
            &mut warnings,
        );

        enter(SafetyPhase::EhrHistoryCheck, &mut phases_run, sink);
        absorb(
            SafetyPhase::EhrHistoryCheck,
            ehr_history_check(prescriptions, context),
            &mut warnings,
        );

        let mut insights = Vec::new();
        if warnings.iter().any(|w| w.is_actionable()) {
            enter(SafetyPhase::LlmReasoning, &mut phases_run, sink);
            match self
                .llm_reasoning(patient_id, prescriptions, &warnings, context)
                .await
            {
                Ok(text) => insights.push(text),
                Err(e) => {
                    // Escalation is best-effort; the warnings stand alone.
                    warn!(error = %e, "narrative safety review failed");
                }
            }
        }

        enter(SafetyPhase::FinalAssessment, &mut phases_run, sink);
        let recommendations = recommendations_from(&warnings);
        let alternatives = alternatives_from(&warnings);
        let summary = summarize(&warnings);
        info!(
            patient_id,
            warnings = warnings.len(),
            "safety check completed"
        );
        sink.emit("SAFETY_MONITOR_COMPLETED");

        SafetyReport {
            status: SafetyStatus::Completed,
            warnings,
            recommendations,
            alternatives,
            insights,
            summary,
            phases_run,
        }
    }

    /// Re-run interaction checking over current medications plus each
    /// candidate drug. A tool failure becomes a warning, not an error:
    /// unverifiable interactions are themselves a safety finding.
    async fn ddi_analysis(
        &self,
        prescriptions: &[Prescription],
        context: &ObservationSet,
    ) -> Result<Vec<SafetyWarning>> {
        let current: Vec<Medication> = context
            .meds()
            .map(|list| list.active.clone())
            .unwrap_or_default();

        let mut out = Vec::new();
        for prescription in prescriptions {
            let mut all = current.clone();
            all.push(Medication::named(prescription.name.clone()));
            match self
                .registry
                .invoke(ToolName::Ddi, ToolInput::Medications(all))
                .await
            {
                Ok(Observation::Interactions(found)) => {
                    for interaction in found.iter().filter(|ix| ix.involves(&prescription.name)) {
                        out.push(SafetyWarning {
                            severity: Severity::from_interaction(interaction.severity),
                            drug_name: prescription.name.clone(),
                            warning_type: WarningType::Interaction,
                            message: interaction.description.clone(),
                            recommendation: interaction
                                .recommendation
                                .clone()
                                .unwrap_or_else(|| "Monitor patient closely".to_string()),
                            alternative: None,
                        });
                    }
                }
                Ok(_) => {}
                Err(e) => out.push(SafetyWarning {
                    severity: Severity::Medium,
                    drug_name: prescription.name.clone(),
                    warning_type: WarningType::SystemError,
                    message: format!("Unable to check drug interactions: {e}"),
                    recommendation: "Manually verify drug interactions".to_string(),
                    alternative: None,
                }),
            }
        }
        Ok(out)
    }

    /// Search the guideline corpus for each drug name; hits become
    /// low-severity informational notes.
    async fn guidelines_check(
        &self,
        prescriptions: &[Prescription],
    ) -> Result<Vec<SafetyWarning>> {
        let mut out = Vec::new();
        for prescription in prescriptions {
            let keyword = prescription.name.to_lowercase();
            match self
                .registry
                .invoke(ToolName::Guidelines, ToolInput::Keyword(keyword.clone()))
                .await
            {
                Ok(Observation::Guidelines(hits)) => {
                    for hit in hits {
                        out.push(SafetyWarning {
                            severity: Severity::Low,
                            drug_name: prescription.name.clone(),
                            warning_type: WarningType::Info,
                            message: format!("Guideline '{}' may apply", hit.title),
                            recommendation: "Review current guidance before prescribing"
                                .to_string(),
                            alternative: None,
                        });
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    debug!(keyword, error = %e, "guideline lookup failed");
                }
            }
        }
        Ok(out)
    }

    async fn llm_reasoning(
        &self,
        patient_id: &str,
        prescriptions: &[Prescription],
        warnings: &[SafetyWarning],
        context: &ObservationSet,
    ) -> Result<String> {
        let mut user = user_prompt(patient_id, "prescription safety review");
        user.push_str("\nproposed:");
        for prescription in prescriptions {
            user.push_str(&format!(
                "\n- {} {} {}",
                prescription.name, prescription.dose, prescription.frequency
            ));
        }
        user.push_str("\nfindings:");
        for warning in warnings.iter().filter(|w| w.is_actionable()) {
            user.push_str(&format!(
                "\n- [{}] {}: {}",
                warning.severity, warning.drug_name, warning.message
            ));
        }
        self.narrator
            .synthesize(SAFETY_SYSTEM_PROMPT, &user, context)
            .await
    }
}

fn enter(phase: SafetyPhase, phases_run: &mut Vec<SafetyPhase>, sink: &dyn ProgressSink) {
    sink.emit(phase.event());
    phases_run.push(phase);
}

/// Append a phase's warnings, or log and move on. Earlier warnings are
/// never touched.
fn absorb(
    phase: SafetyPhase,
    outcome: Result<Vec<SafetyWarning>>,
    warnings: &mut Vec<SafetyWarning>,
) {
    match outcome {
        Ok(mut batch) => warnings.append(&mut batch),
        Err(e) => {
            warn!(phase = phase.as_str(), error = %e, "safety phase failed, continuing");
        }
    }
}

/// Condition-table, lab-threshold, and allergy contraindications.
fn contraindication_check(
    prescriptions: &[Prescription],
    context: &ObservationSet,
) -> Result<Vec<SafetyWarning>> {
    let mut out = Vec::new();
    let ehr = context.ehr();
    let egfr = context.labs().and_then(|labs| labs.value_of("egfr"));

    for prescription in prescriptions {
        let drug_lower = prescription.name.to_lowercase();

        if let Some(record) = ehr {
            for rule in rules::contraindications_for(&prescription.name) {
                for condition in &record.conditions {
                    let name = condition.name.to_lowercase();
                    if condition.is_resolved() {
                        continue;
                    }
                    if name.contains(rule.condition) || rule.condition.contains(name.as_str()) {
                        out.push(SafetyWarning {
                            severity: rule.severity,
                            drug_name: prescription.name.clone(),
                            warning_type: WarningType::Contraindication,
                            message: format!("Contraindicated in {}", condition.name),
                            recommendation: rule.recommendation.to_string(),
                            alternative: rule.alternative.map(str::to_string),
                        });
                    }
                }
            }

            for allergy in &record.allergies {
                let allergy_lower = allergy.name.to_lowercase();
                if allergy_lower.is_empty() {
                    continue;
                }
                let matches = drug_lower.contains(&allergy_lower)
                    || allergy_lower.contains(&drug_lower)
                    || rules::is_class_allergy(&prescription.name, &allergy.name);
                if matches {
                    let severity = if allergy.severity.eq_ignore_ascii_case("severe") {
                        Severity::Critical
                    } else {
                        Severity::High
                    };
                    out.push(SafetyWarning {
                        severity,
                        drug_name: prescription.name.clone(),
                        warning_type: WarningType::Allergy,
                        message: format!("Patient has documented allergy to {}", allergy.name),
                        recommendation: "DO NOT PRESCRIBE - Use alternative medication"
                            .to_string(),
                        alternative: rules::allergy_alternative(&allergy.name)
                            .map(str::to_string),
                    });
                }
            }
        }

        if drug_lower == "metformin" {
            if let Some(egfr) = egfr {
                if egfr < 30.0 {
                    out.push(SafetyWarning {
                        severity: Severity::Critical,
                        drug_name: prescription.name.clone(),
                        warning_type: WarningType::Contraindication,
                        message: format!("Metformin contraindicated with eGFR {egfr}"),
                        recommendation: "Use insulin therapy instead".to_string(),
                        alternative: Some("Insulin therapy".to_string()),
                    });
                }
            }
        }
    }
    Ok(out)
}

/// Age-based and renal-clearance dosing checks.
fn dosing_analysis(
    prescriptions: &[Prescription],
    context: &ObservationSet,
) -> Result<Vec<SafetyWarning>> {
    let mut out = Vec::new();
    let age = context.ehr().map(|e| e.demographics.age).unwrap_or(0);
    let egfr = context.labs().and_then(|labs| labs.value_of("egfr"));

    for prescription in prescriptions {
        if age > 65 {
            out.push(SafetyWarning {
                severity: Severity::Medium,
                drug_name: prescription.name.clone(),
                warning_type: WarningType::Dosing,
                message: format!("Patient is {age} years old - consider reduced dosing"),
                recommendation: "Start with lower dose, monitor closely".to_string(),
                alternative: None,
            });
        }

        if rules::requires_renal_adjustment(&prescription.name) {
            if let Some(egfr) = egfr {
                if egfr < 30.0 {
                    out.push(SafetyWarning {
                        severity: Severity::High,
                        drug_name: prescription.name.clone(),
                        warning_type: WarningType::Dosing,
                        message: format!(
                            "Renal impairment (eGFR {egfr}) - dose adjustment required"
                        ),
                        recommendation: "Reduce dose by 50% or use alternative".to_string(),
                        alternative: rules::renal_alternative(&prescription.name)
                            .map(str::to_string),
                    });
                }
            }
        }
    }
    Ok(out)
}

/// Mechanism-level interaction pairs against current medications,
/// independent of the interaction database.
fn pharmacology_check(
    prescriptions: &[Prescription],
    context: &ObservationSet,
) -> Result<Vec<SafetyWarning>> {
    let mut out = Vec::new();
    let current: Vec<String> = context
        .meds()
        .map(|list| list.names())
        .unwrap_or_default()
        .iter()
        .map(|name| name.to_lowercase())
        .collect();

    for prescription in prescriptions {
        for rule in rules::pharmacology_for(&prescription.name) {
            if current.iter().any(|med| med == rule.other) {
                out.push(SafetyWarning {
                    severity: rule.severity,
                    drug_name: prescription.name.clone(),
                    warning_type: WarningType::Interaction,
                    message: rule.description.to_string(),
                    recommendation: rule.recommendation.to_string(),
                    alternative: None,
                });
            }
        }
    }
    Ok(out)
}

/// A resolved condition that once contraindicated the drug still merits
/// a look before re-prescribing.
fn ehr_history_check(
    prescriptions: &[Prescription],
    context: &ObservationSet,
) -> Result<Vec<SafetyWarning>> {
    let mut out = Vec::new();
    let Some(record) = context.ehr() else {
        return Ok(out);
    };

    for prescription in prescriptions {
        for condition in record.past_conditions() {
            let name = condition.name.to_lowercase();
            let relevant = rules::contraindications_for(&prescription.name)
                .iter()
                .any(|rule| name.contains(rule.condition) || rule.condition.contains(name.as_str()));
            if relevant {
                out.push(SafetyWarning {
                    severity: Severity::Medium,
                    drug_name: prescription.name.clone(),
                    warning_type: WarningType::Contraindication,
                    message: format!(
                        "History of {} - reassess before prescribing {}",
                        condition.name, prescription.name
                    ),
                    recommendation: "Confirm the condition has fully resolved".to_string(),
                    alternative: None,
                });
            }
        }
    }
    Ok(out)
}

fn recommendations_from(warnings: &[SafetyWarning]) -> Vec<String> {
    warnings
        .iter()
        .filter(|w| w.is_actionable())
        .map(|w| format!("{}: {}", w.drug_name, w.recommendation))
        .collect()
}

fn alternatives_from(warnings: &[SafetyWarning]) -> Vec<AlternativeSuggestion> {
    warnings
        .iter()
        .filter_map(|w| {
            w.alternative.as_ref().map(|alt| AlternativeSuggestion {
                original_drug: w.drug_name.clone(),
                alternative: alt.clone(),
                reason: w.message.clone(),
                severity: w.severity,
            })
        })
        .collect()
}

fn summarize(warnings: &[SafetyWarning]) -> String {
    let critical = warnings
        .iter()
        .filter(|w| w.severity == Severity::Critical)
        .count();
    let high = warnings
        .iter()
        .filter(|w| w.severity == Severity::High)
        .count();
    let medium = warnings
        .iter()
        .filter(|w| w.severity == Severity::Medium)
        .count();

    let mut parts = Vec::new();
    if critical > 0 {
        parts.push(format!("{critical} CRITICAL safety issue(s)"));
    }
    if high > 0 {
        parts.push(format!("{high} HIGH priority warning(s)"));
    }
    if medium > 0 {
        parts.push(format!("{medium} medium priority note(s)"));
    }
    if parts.is_empty() {
        return "All prescriptions appear safe based on current patient data.".to_string();
    }
    parts.join(" | ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn warning(severity: Severity) -> SafetyWarning {
        SafetyWarning {
            severity,
            drug_name: "metformin".to_string(),
            warning_type: WarningType::Contraindication,
            message: "Contraindicated in severe renal impairment".to_string(),
            recommendation: "Contraindicated if eGFR <30".to_string(),
            alternative: Some("Insulin therapy".to_string()),
        }
    }

    #[test]
    fn summary_buckets_by_severity() {
        let warnings = vec![
            warning(Severity::Critical),
            warning(Severity::High),
            warning(Severity::High),
            warning(Severity::Medium),
        ];
        assert_eq!(
            summarize(&warnings),
            "1 CRITICAL safety issue(s) | 2 HIGH priority warning(s) | 1 medium priority note(s)"
        );
    }

    #[test]
    fn empty_and_low_only_summaries_are_all_clear() {
        assert!(summarize(&[]).starts_with("All prescriptions appear safe"));
        let low_only = vec![SafetyWarning {
            severity: Severity::Low,
            warning_type: WarningType::Info,
            ..warning(Severity::Low)
        }];
        assert!(summarize(&low_only).starts_with("All prescriptions appear safe"));
    }

    #[test]
    fn recommendations_only_from_actionable_warnings() {
        let warnings = vec![warning(Severity::Critical), warning(Severity::Medium)];
        let recs = recommendations_from(&warnings);
        assert_eq!(recs, vec!["metformin: Contraindicated if eGFR <30"]);
    }

    #[test]
    fn alternatives_follow_the_alternative_field() {
        let mut no_alt = warning(Severity::High);
        no_alt.alternative = None;
        let alts = alternatives_from(&[warning(Severity::Critical), no_alt]);
        assert_eq!(alts.len(), 1);
        assert_eq!(alts[0].alternative, "Insulin therapy");
        assert_eq!(alts[0].severity, Severity::Critical);
    }

    #[test]
    fn failed_phase_preserves_prior_warnings() {
        let mut warnings = vec![warning(Severity::Critical)];
        absorb(
            SafetyPhase::DosingAnalysis,
            Err(meditriage_common::MeditriageError::Phase(
                "lab lookup".to_string(),
            )),
            &mut warnings,
        );
        assert_eq!(warnings.len(), 1);
        absorb(
            SafetyPhase::PharmacologyCheck,
            Ok(vec![warning(Severity::Medium)]),
            &mut warnings,
        );
        assert_eq!(warnings.len(), 2);
    }
}
