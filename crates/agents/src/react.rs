//! Tier 2: a bounded think/act/observe loop. The decision step is a pure
//! function over the observations gathered so far and returns a
//! structured [`NextAction`], never free text to be re-parsed.

use std::sync::Arc;

use tracing::info;

use meditriage_common::{
    Medication, Observation, ObservationSet, ProgressSink, ReasoningTrace, SourceKey,
};
use meditriage_tools::{ToolInput, ToolName, ToolRegistry};

/// Hard bound on think/act cycles.
pub const MAX_ITERATIONS: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextAction {
    Fetch {
        tool: ToolName,
        keyword: Option<String>,
    },
    Finish,
}

/// Decide what to do next given the evidence so far. Returns the thought
/// alongside the action so the trace reads like reasoning, not logging.
pub fn decide(observations: &ObservationSet) -> (String, NextAction) {
    if !observations.contains(SourceKey::Ehr) {
        return (
            "Need patient demographics and conditions first".to_string(),
            NextAction::Fetch {
                tool: ToolName::Ehr,
                keyword: None,
            },
        );
    }

    if !observations.contains(SourceKey::Labs) {
        let thought = match observations.ehr() {
            Some(ehr) if ehr.has_condition("kidney") || ehr.has_condition("ckd") => {
                "Patient has CKD, need labs to assess renal function".to_string()
            }
            _ => "Need lab data to assess current status".to_string(),
        };
        return (
            thought,
            NextAction::Fetch {
                tool: ToolName::Labs,
                keyword: None,
            },
        );
    }

    if !observations.contains(SourceKey::Meds) {
        let thought = match observations.labs() {
            Some(labs) if labs.abnormal().next().is_some() => {
                "Found abnormal labs, need to check medications".to_string()
            }
            _ => "Should check current medications".to_string(),
        };
        return (
            thought,
            NextAction::Fetch {
                tool: ToolName::Meds,
                keyword: None,
            },
        );
    }

    if !observations.contains(SourceKey::Ddi) {
        if let Some(meds) = observations.meds() {
            if meds.active.len() >= 3 {
                return (
                    "Multiple medications, should check for interactions".to_string(),
                    NextAction::Fetch {
                        tool: ToolName::Ddi,
                        keyword: None,
                    },
                );
            }
        }
    }

    if !observations.contains(SourceKey::Guide) {
        if let Some(ehr) = observations.ehr() {
            if let Some(condition) = ehr.conditions.first() {
                let keyword = condition
                    .name
                    .split_whitespace()
                    .next()
                    .unwrap_or("general")
                    .to_lowercase();
                return (
                    format!("Need guidelines for {}", condition.name),
                    NextAction::Fetch {
                        tool: ToolName::Guidelines,
                        keyword: Some(keyword),
                    },
                );
            }
        }
    }

    ("Sufficient information gathered".to_string(), NextAction::Finish)
}

pub struct ReasoningLoopAgent {
    registry: Arc<ToolRegistry>,
}

impl ReasoningLoopAgent {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    /// Run the loop from a seed observation set (typically the record the
    /// router already fetched). Returns the accumulated evidence and the
    /// full trace.
    pub async fn run(
        &self,
        patient_id: &str,
        _complaint: &str,
        seed: ObservationSet,
        sink: &dyn ProgressSink,
    ) -> (ObservationSet, ReasoningTrace) {
        let mut observations = seed;
        let mut trace = ReasoningTrace::new();
        let mut iterations = 0;

        for iteration in 1..=MAX_ITERATIONS {
            iterations = iteration;
            sink.emit(&format!("ITERATION_{iteration}_STARTED"));

            let (thought, action) = decide(&observations);
            sink.emit(&format!("THOUGHT: {thought}"));

            let (tool, keyword) = match action {
                NextAction::Finish => {
                    sink.emit("AGENT_DECIDED_TO_STOP");
                    trace.push(thought, "finish", "loop complete");
                    break;
                }
                NextAction::Fetch { tool, keyword } => (tool, keyword),
            };

            let action_desc = match &keyword {
                Some(k) => format!("{tool}({k})"),
                None => tool.to_string(),
            };
            sink.emit(&format!("ACTION: Calling {action_desc}"));

            let observation = self
                .act(patient_id, tool, keyword, &mut observations, sink)
                .await;
            let outcome = match &observation {
                Observation::Error { reason } => format!("failed: {reason}"),
                _ => format!("retrieved {} data", tool.source_key()),
            };
            observations.insert(tool.source_key(), observation);
            trace.push(thought, action_desc, outcome);
        }

        sink.emit(&format!("REACT_COMPLETED after {iterations} iterations"));
        info!(patient_id, iterations, "reasoning loop finished");
        (observations, trace)
    }

    async fn act(
        &self,
        patient_id: &str,
        tool: ToolName,
        keyword: Option<String>,
        observations: &mut ObservationSet,
        sink: &dyn ProgressSink,
    ) -> Observation {
        match tool {
            ToolName::Ddi => {
                // The interaction check needs the medication list first.
                if !observations.contains(SourceKey::Meds) {
                    let meds = self
                        .registry
                        .observe(
                            ToolName::Meds,
                            ToolInput::Patient(patient_id.to_string()),
                            sink,
                        )
                        .await;
                    observations.insert(SourceKey::Meds, meds);
                }
                let active: Vec<Medication> = observations
                    .meds()
                    .map(|m| m.active.clone())
                    .unwrap_or_default();
                self.registry
                    .observe(ToolName::Ddi, ToolInput::Medications(active), sink)
                    .await
            }
            ToolName::Guidelines => {
                let keyword = keyword.unwrap_or_else(|| "general".to_string());
                self.registry
                    .observe(ToolName::Guidelines, ToolInput::Keyword(keyword), sink)
                    .await
            }
            _ => {
                self.registry
                    .observe(tool, ToolInput::Patient(patient_id.to_string()), sink)
                    .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meditriage_tools::mock::{sample_ehr, sample_meds};

    #[test]
    fn decision_chain_starts_with_the_record() {
        let observations = ObservationSet::new();
        let (_, action) = decide(&observations);
        assert_eq!(
            action,
            NextAction::Fetch {
                tool: ToolName::Ehr,
                keyword: None
            }
        );
    }

    #[test]
    fn renal_condition_shapes_the_lab_thought() {
        let mut observations = ObservationSet::new();
        observations.insert(SourceKey::Ehr, Observation::Ehr(sample_ehr()));
        let (thought, action) = decide(&observations);
        assert!(thought.contains("CKD"));
        assert_eq!(
            action,
            NextAction::Fetch {
                tool: ToolName::Labs,
                keyword: None
            }
        );
    }

    #[test]
    fn three_medications_trigger_interaction_check() {
        let mut observations = ObservationSet::new();
        observations.insert(SourceKey::Ehr, Observation::Ehr(sample_ehr()));
        observations.insert(
            SourceKey::Labs,
            Observation::Labs(meditriage_common::LabPanel::default()),
        );
        observations.insert(SourceKey::Meds, Observation::Meds(sample_meds()));
        let (_, action) = decide(&observations);
        assert_eq!(
            action,
            NextAction::Fetch {
                tool: ToolName::Ddi,
                keyword: None
            }
        );
    }

    #[test]
    fn guideline_keyword_comes_from_first_condition() {
        let mut observations = ObservationSet::new();
        observations.insert(SourceKey::Ehr, Observation::Ehr(sample_ehr()));
        observations.insert(
            SourceKey::Labs,
            Observation::Labs(meditriage_common::LabPanel::default()),
        );
        observations.insert(
            SourceKey::Meds,
            Observation::Meds(meditriage_common::MedicationList::default()),
        );
        let (_, action) = decide(&observations);
        assert_eq!(
            action,
            NextAction::Fetch {
                tool: ToolName::Guidelines,
                keyword: Some("ckd".to_string())
            }
        );
    }

    #[test]
    fn complete_evidence_finishes() {
        let mut observations = ObservationSet::new();
        observations.insert(SourceKey::Ehr, Observation::Ehr(sample_ehr()));
        observations.insert(
            SourceKey::Labs,
            Observation::Labs(meditriage_common::LabPanel::default()),
        );
        observations.insert(
            SourceKey::Meds,
            Observation::Meds(meditriage_common::MedicationList::default()),
        );
        observations.insert(SourceKey::Guide, Observation::Guidelines(vec![]));
        let (_, action) = decide(&observations);
        assert_eq!(action, NextAction::Finish);
    }

    #[test]
    fn decide_is_pure() {
        let mut observations = ObservationSet::new();
        observations.insert(SourceKey::Ehr, Observation::Ehr(sample_ehr()));
        assert_eq!(decide(&observations), decide(&observations));
    }
}
