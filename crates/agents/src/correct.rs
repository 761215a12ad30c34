//! Tier 3: self-correction. Generate a draft, score it against the
//! evidence with a fixed deduction rubric, gather whatever the critique
//! says is missing, and regenerate with the issues spelled out. The loop
//! never makes more than [`MAX_ITERATIONS`] generation calls.

use std::sync::Arc;

use tracing::{debug, info};

use meditriage_common::{
    CorrectionRound, Critique, LabStatus, Observation, ObservationSet, ProgressSink, Result,
    SourceKey,
};
use meditriage_narrator::{user_prompt, Narrator, SYSTEM_PROMPT};
use meditriage_tools::{ToolInput, ToolName, ToolRegistry};

pub const MAX_ITERATIONS: usize = 3;

/// Score at which a draft is accepted without further correction.
const QUALITY_THRESHOLD: f64 = 8.0;

/// Section headers a draft must carry to score cleanly.
const REQUIRED_SECTIONS: [&str; 4] = ["ONE-LINE SUMMARY", "SNAPSHOT", "ATTENTION NEEDED", "PLAN"];

/// Score a draft against the evidence. Pure: a given draft and
/// observation set always critique identically. Deductions from 10.0,
/// floored at 0.
pub fn critique(draft: &str, observations: &ObservationSet) -> Critique {
    let mut issues = Vec::new();
    let mut score: f64 = 10.0;

    // Every gathered source must be cited.
    for key in observations.keys() {
        if !draft.contains(key.tag()) {
            issues.push(format!("Missing citation for {key} data"));
            score -= 0.5;
        }
    }

    // Length: 150-250 words is the target band.
    let word_count = draft.split_whitespace().count();
    if word_count > 300 {
        issues.push(format!("Too verbose ({word_count} words, target 150-250)"));
        score -= 1.0;
    } else if word_count < 100 {
        issues.push(format!("Too brief ({word_count} words, target 150-250)"));
        score -= 1.0;
    }

    for section in REQUIRED_SECTIONS {
        if !draft.contains(section) {
            issues.push(format!("Missing required section: {section}"));
            score -= 1.5;
        }
    }

    // Every abnormal (non-critical) lab value must appear verbatim.
    if let Some(labs) = observations.labs() {
        for lab in &labs.results {
            if matches!(lab.status, LabStatus::High | LabStatus::Low)
                && !draft.contains(&lab.value.to_string())
            {
                issues.push(format!("Abnormal {} value not mentioned", lab.test));
                score -= 0.5;
            }
        }
    }

    if let Some(interactions) = observations.interactions() {
        if !interactions.is_empty() && !draft.to_lowercase().contains("interaction") {
            issues.push("Drug interactions not addressed".to_string());
            score -= 1.0;
        }
    }

    if !draft.contains("1.") && !draft.contains("2.") {
        issues.push("No numbered action plan".to_string());
        score -= 1.0;
    }

    Critique {
        quality_score: score.max(0.0),
        issues,
        word_count,
    }
}

fn needs_more_data(issues: &[String]) -> bool {
    const DATA_WORDS: [&str; 4] = ["missing", "incomplete", "not found", "unavailable"];
    issues.iter().any(|issue| {
        let issue = issue.to_lowercase();
        DATA_WORDS.iter().any(|w| issue.contains(w))
    })
}

pub struct SelfCorrectingAgent {
    registry: Arc<ToolRegistry>,
    narrator: Arc<dyn Narrator>,
}

impl SelfCorrectingAgent {
    pub fn new(registry: Arc<ToolRegistry>, narrator: Arc<dyn Narrator>) -> Self {
        Self { registry, narrator }
    }

    /// Returns the final summary and the record of every round.
    pub async fn run(
        &self,
        patient_id: &str,
        complaint: &str,
        mut observations: ObservationSet,
        sink: &dyn ProgressSink,
    ) -> Result<(String, Vec<CorrectionRound>)> {
        let user = user_prompt(patient_id, complaint);
        let mut rounds = Vec::new();
        let mut draft: Option<String> = None;

        for iteration in 1..=MAX_ITERATIONS {
            sink.emit(&format!("CORRECTION_ITERATION_{iteration}"));

            let current = match draft.take() {
                Some(text) => text,
                None => {
                    sink.emit("GENERATING_INITIAL_SUMMARY");
                    self.narrator
                        .synthesize(SYSTEM_PROMPT, &user, &observations)
                        .await?
                }
            };

            sink.emit("CRITIQUING_OUTPUT");
            let critique = critique(&current, &observations);
            let done = critique.quality_score >= QUALITY_THRESHOLD || critique.issues.is_empty();
            let issues = critique.issues.clone();
            rounds.push(CorrectionRound {
                iteration,
                summary: current.clone(),
                critique,
            });

            if done {
                sink.emit("QUALITY_THRESHOLD_MET");
                return Ok((current, rounds));
            }
            sink.emit(&format!("FOUND_{}_ISSUES", issues.len()));

            if iteration == MAX_ITERATIONS {
                // Out of budget, ship the best we have.
                info!(patient_id, "correction budget exhausted");
                return Ok((current, rounds));
            }

            if needs_more_data(&issues) {
                sink.emit("GATHERING_ADDITIONAL_DATA");
                self.gather_missing(&issues, patient_id, &mut observations, sink)
                    .await;
            }

            sink.emit("REGENERATING_SUMMARY");
            let system = correction_prompt(&issues);
            draft = Some(
                self.narrator
                    .synthesize(&system, &user, &observations)
                    .await?,
            );
        }

        unreachable!("loop returns within the iteration budget")
    }

    /// Fetch sources the critique names as missing, if not already held.
    async fn gather_missing(
        &self,
        issues: &[String],
        patient_id: &str,
        observations: &mut ObservationSet,
        sink: &dyn ProgressSink,
    ) {
        for issue in issues {
            if issue.contains("IMAGING") && !observations.contains(SourceKey::Imaging) {
                let obs = self
                    .registry
                    .observe(
                        ToolName::Imaging,
                        ToolInput::Patient(patient_id.to_string()),
                        sink,
                    )
                    .await;
                observations.insert(SourceKey::Imaging, obs);
            } else if issue.contains("GUIDE") && !observations.contains(SourceKey::Guide) {
                let keyword = observations
                    .ehr()
                    .and_then(|ehr| ehr.conditions.first())
                    .and_then(|c| c.name.split_whitespace().next())
                    .unwrap_or("general")
                    .to_lowercase();
                debug!(keyword, "fetching guidelines for critique gap");
                let obs = self
                    .registry
                    .observe(ToolName::Guidelines, ToolInput::Keyword(keyword), sink)
                    .await;
                observations.insert(SourceKey::Guide, obs);
            }
        }
    }
}

fn correction_prompt(issues: &[String]) -> String {
    let mut prompt = String::from(SYSTEM_PROMPT);
    prompt.push_str("\n\nPREVIOUS ATTEMPT HAD THESE ISSUES:\n");
    for (i, issue) in issues.iter().enumerate() {
        prompt.push_str(&format!("{}. {issue}\n", i + 1));
    }
    prompt.push_str("\nPlease generate an IMPROVED summary addressing these issues.\n");
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use meditriage_common::{Interaction, InteractionSeverity, LabPanel, LabResult};
    use meditriage_tools::mock::{renal_labs, sample_ehr};

    fn observations_with_labs() -> ObservationSet {
        let mut set = ObservationSet::new();
        set.insert(SourceKey::Ehr, Observation::Ehr(sample_ehr()));
        set.insert(SourceKey::Labs, Observation::Labs(renal_labs()));
        set
    }

    #[test]
    fn perfect_draft_scores_ten() {
        let set = observations_with_labs();
        let body = "word ".repeat(140);
        let draft = format!(
            "ONE-LINE SUMMARY\nPATIENT SNAPSHOT\nATTENTION NEEDED\nPLAN\n\
             [EHR] [LABS] eGFR 38 Creatinine 1.8 Hemoglobin 10.2\n1. follow up\n{body}"
        );
        let critique = critique(&draft, &set);
        assert_eq!(critique.quality_score, 10.0);
        assert!(critique.issues.is_empty());
    }

    #[test]
    fn missing_citation_and_section_deduct() {
        let set = observations_with_labs();
        let critique = critique("short note", &set);
        assert!(critique
            .issues
            .iter()
            .any(|i| i == "Missing citation for EHR data"));
        assert!(critique
            .issues
            .iter()
            .any(|i| i == "Missing required section: PLAN"));
        assert!(critique.issues.contains(&"No numbered action plan".to_string()));
        assert!(critique.quality_score < 8.0);
    }

    #[test]
    fn score_never_goes_negative() {
        let mut set = observations_with_labs();
        set.insert(
            SourceKey::Ddi,
            Observation::Interactions(vec![Interaction {
                drug_a: "a".to_string(),
                drug_b: "b".to_string(),
                severity: InteractionSeverity::Major,
                description: "x".to_string(),
                recommendation: None,
            }]),
        );
        let critique = critique("", &set);
        assert!(critique.quality_score >= 0.0);
        assert!(critique.quality_score <= 10.0);
    }

    #[test]
    fn abnormal_values_must_appear_verbatim() {
        let mut set = ObservationSet::new();
        set.insert(
            SourceKey::Labs,
            Observation::Labs(LabPanel {
                results: vec![LabResult {
                    test: "Potassium".to_string(),
                    value: 5.8,
                    unit: "mEq/L".to_string(),
                    status: LabStatus::High,
                }],
                historical: Default::default(),
            }),
        );
        let body = "word ".repeat(150);
        let with_value = format!(
            "ONE-LINE SUMMARY SNAPSHOT ATTENTION NEEDED PLAN [LABS] K+ 5.8\n1. recheck\n{body}"
        );
        assert!(critique(&with_value, &set).issues.is_empty());

        let without_value = format!(
            "ONE-LINE SUMMARY SNAPSHOT ATTENTION NEEDED PLAN [LABS] potassium elevated\n1. recheck\n{body}"
        );
        let result = critique(&without_value, &set);
        assert!(result
            .issues
            .contains(&"Abnormal Potassium value not mentioned".to_string()));
    }

    #[test]
    fn data_gap_detection_matches_keywords() {
        assert!(needs_more_data(&["Missing citation for IMAGING data".to_string()]));
        assert!(!needs_more_data(&["Too brief (50 words)".to_string()]));
    }
}
