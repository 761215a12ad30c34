//! Tier 1: smart tool selection, fixed-order execution, one synthesis
//! pass. Every tool failure is isolated into an error observation; the
//! run always ends with a summary.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{info, warn};

use meditriage_common::{
    Medication, Observation, ObservationSet, ProgressSink, SourceKey,
};
use meditriage_narrator::{user_prompt, Narrator, SYSTEM_PROMPT};
use meditriage_tools::{prioritize, select_tools, SelectorConfig, ToolInput, ToolName, ToolRegistry};

/// Condition keywords that map to guideline search terms.
const GUIDELINE_TERMS: [&str; 23] = [
    "diabetes",
    "hypertension",
    "ckd",
    "kidney",
    "heart",
    "cardiac",
    "copd",
    "asthma",
    "cancer",
    "stroke",
    "seizure",
    "infection",
    "pneumonia",
    "sepsis",
    "anemia",
    "thrombosis",
    "bleeding",
    "pain",
    "fever",
    "fatigue",
    "dizziness",
    "chest",
    "respiratory",
];

/// Guideline search terms for a complaint; `general` when nothing matches.
pub fn extract_keywords(complaint: &str) -> Vec<String> {
    let complaint = complaint.to_lowercase();
    let mut keywords: Vec<String> = GUIDELINE_TERMS
        .iter()
        .filter(|term| complaint.contains(*term))
        .map(|term| term.to_string())
        .collect();
    if keywords.is_empty() {
        keywords.push("general".to_string());
    }
    keywords
}

/// Complaint terms plus terms for recognized conditions, first
/// occurrence wins. Duplicates would burn a guideline fetch on a term
/// already searched.
fn guideline_keywords(complaint: &str, observations: &ObservationSet) -> Vec<String> {
    let mut keywords = extract_keywords(complaint);
    if let Some(ehr) = observations.ehr() {
        for condition in &ehr.conditions {
            let name = condition.name.to_lowercase();
            if name.contains("ckd") || name.contains("kidney") {
                keywords.push("ckd".to_string());
            }
            if name.contains("diabetes") {
                keywords.push("diabetes".to_string());
            }
            if name.contains("hypertension") || name.contains("htn") {
                keywords.push("hypertension".to_string());
            }
        }
    }
    let mut seen = HashSet::new();
    keywords.retain(|k| seen.insert(k.clone()));
    keywords
}

/// What a tier run produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub summary: String,
    pub observations: ObservationSet,
    /// Human-readable reasons for each data source that failed.
    pub errors: Vec<String>,
}

pub struct StandardOrchestrator {
    registry: Arc<ToolRegistry>,
    narrator: Arc<dyn Narrator>,
    selector: SelectorConfig,
}

impl StandardOrchestrator {
    pub fn new(
        registry: Arc<ToolRegistry>,
        narrator: Arc<dyn Narrator>,
        selector: SelectorConfig,
    ) -> Self {
        Self {
            registry,
            narrator,
            selector,
        }
    }

    /// Full run: fetch the record, then everything else.
    pub async fn run(
        &self,
        patient_id: &str,
        complaint: &str,
        sink: &dyn ProgressSink,
    ) -> RunOutcome {
        let ehr = self
            .registry
            .observe(
                ToolName::Ehr,
                ToolInput::Patient(patient_id.to_string()),
                sink,
            )
            .await;
        self.run_with_ehr(patient_id, complaint, ehr, sink).await
    }

    /// Run with an already-fetched record observation, so the engine's
    /// routing fetch is not repeated.
    pub async fn run_with_ehr(
        &self,
        patient_id: &str,
        complaint: &str,
        ehr: Observation,
        sink: &dyn ProgressSink,
    ) -> RunOutcome {
        let mut observations = ObservationSet::new();
        let mut errors = Vec::new();
        if let Observation::Error { reason } = &ehr {
            errors.push(format!("EHR: {reason}"));
        }
        observations.insert(SourceKey::Ehr, ehr);

        let selected = select_tools(complaint, observations.ehr(), &self.selector);
        let ordered = prioritize(&selected);
        sink.emit(&format!(
            "SMART_SELECTION: {}",
            ordered
                .iter()
                .map(|t| t.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        ));
        info!(patient_id, tools = ordered.len(), "running standard tier");

        for tool in &ordered {
            match tool {
                ToolName::Ehr => {} // already fetched
                ToolName::Labs | ToolName::Meds | ToolName::Imaging => {
                    let obs = self
                        .registry
                        .observe(*tool, ToolInput::Patient(patient_id.to_string()), sink)
                        .await;
                    if let Observation::Error { reason } = &obs {
                        errors.push(format!("{}: {reason}", tool.source_key()));
                    }
                    observations.insert(tool.source_key(), obs);
                }
                ToolName::Ddi => {
                    self.check_interactions(&mut observations, &mut errors, sink)
                        .await;
                }
                ToolName::Guidelines => {
                    self.search_guidelines(complaint, &mut observations, &mut errors, sink)
                        .await;
                }
            }
        }

        let summary = self
            .synthesize(patient_id, complaint, &observations, &errors, sink)
            .await;
        RunOutcome {
            summary,
            observations,
            errors,
        }
    }

    /// Interaction check runs only when a usable medication list exists;
    /// otherwise the DDI slot is an explicit empty result.
    async fn check_interactions(
        &self,
        observations: &mut ObservationSet,
        errors: &mut Vec<String>,
        sink: &dyn ProgressSink,
    ) {
        let active: Vec<Medication> = observations
            .meds()
            .map(|m| m.active.clone())
            .unwrap_or_default();
        if active.is_empty() {
            sink.emit("CHECK_DDI_SKIPPED (no usable medication list)");
            observations.insert(SourceKey::Ddi, Observation::Interactions(vec![]));
            return;
        }
        let obs = self
            .registry
            .observe(ToolName::Ddi, ToolInput::Medications(active), sink)
            .await;
        if let Observation::Error { reason } = &obs {
            errors.push(format!("DDI: {reason}"));
        }
        observations.insert(SourceKey::Ddi, obs);
    }

    /// Search guidelines per keyword (complaint terms plus recognized
    /// conditions, capped at three) and merge hits, first title wins.
    async fn search_guidelines(
        &self,
        complaint: &str,
        observations: &mut ObservationSet,
        errors: &mut Vec<String>,
        sink: &dyn ProgressSink,
    ) {
        let keywords = guideline_keywords(complaint, observations);

        sink.emit("SEARCH_GUIDELINES_STARTED");
        let mut merged = Vec::new();
        let mut seen_titles = Vec::new();
        let mut failed = None;
        for keyword in keywords.iter().take(3) {
            match self
                .registry
                .invoke(ToolName::Guidelines, ToolInput::Keyword(keyword.clone()))
                .await
            {
                Ok(Observation::Guidelines(hits)) => {
                    for hit in hits {
                        if !seen_titles.contains(&hit.title) {
                            seen_titles.push(hit.title.clone());
                            merged.push(hit);
                        }
                    }
                }
                Ok(other) => {
                    warn!(keyword, "guidelines tool returned unexpected payload {other:?}");
                }
                Err(e) => {
                    failed = Some(e.to_string());
                }
            }
        }

        if let Some(reason) = failed {
            sink.emit(&format!("SEARCH_GUIDELINES_FAILED: {reason}"));
            errors.push(format!("Guidelines: {reason}"));
            if merged.is_empty() {
                observations.insert(SourceKey::Guide, Observation::Error { reason });
                return;
            }
        } else {
            sink.emit(&format!(
                "SEARCH_GUIDELINES_COMPLETED (keywords: {})",
                keywords
                    .iter()
                    .take(3)
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
        }
        observations.insert(SourceKey::Guide, Observation::Guidelines(merged));
    }

    async fn synthesize(
        &self,
        patient_id: &str,
        complaint: &str,
        observations: &ObservationSet,
        errors: &[String],
        sink: &dyn ProgressSink,
    ) -> String {
        let mut user = user_prompt(patient_id, complaint);
        if !errors.is_empty() {
            user.push_str("\n\nNote: Some data sources had errors:\n");
            for e in errors {
                user.push_str(&format!("- {e}\n"));
            }
        }

        sink.emit("SYNTHESIS_STARTED");
        match self
            .narrator
            .synthesize(SYSTEM_PROMPT, &user, observations)
            .await
        {
            Ok(summary) => {
                sink.emit("SYNTHESIS_COMPLETED");
                summary
            }
            Err(e) => {
                // Terminal fallback: surface the evidence rather than nothing.
                warn!(error = %e, "synthesis failed, returning diagnostic summary");
                sink.emit(&format!("SYNTHESIS_FAILED: {e}"));
                let evidence = serde_json::to_string_pretty(observations)
                    .unwrap_or_else(|_| "<unserializable>".to_string());
                format!("Error during synthesis: {e}\n\nObservations collected:\n{evidence}")
            }
        }
    }
}
