//! Tier 5: multi-specialist analysis. Gather in two waves (the record,
//! then complaint-driven fetches in parallel), run the trend, risk, and
//! guideline specialists concurrently, and fuse everything into one
//! synthesis call.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use meditriage_common::{
    ComorbidityPattern, GuidanceReport, GuidelineRecommendation, LabTrend, Observation,
    ObservationSet, ProgressSink, Result, RiskFinding, RiskReport, SourceKey, TrendDirection,
    TrendReport,
};
use meditriage_narrator::{user_prompt, Narrator, SYSTEM_PROMPT};
use meditriage_tools::{ToolInput, ToolName, ToolRegistry};

use crate::standard::RunOutcome;

// Trend significance thresholds (percent change over six months).
const CREATININE_SIGNIFICANT_PCT: f64 = 20.0;
const EGFR_SIGNIFICANT_PCT: f64 = 15.0;
const HEMOGLOBIN_SIGNIFICANT_PCT: f64 = 10.0;

/// Lab-trend and comorbidity-pattern analysis. Pure over the evidence.
pub fn analyze_trends(observations: &ObservationSet) -> TrendReport {
    let mut report = TrendReport::default();

    if let Some(labs) = observations.labs() {
        for lab in &labs.results {
            let Some(past) = labs.historical_for(&lab.test) else {
                continue;
            };
            if lab.value == past {
                continue;
            }
            let change_percent = ((lab.value - past) / past * 100.0).abs();
            let direction = if lab.value > past {
                TrendDirection::Rising
            } else {
                TrendDirection::Falling
            };
            report.trends.push(LabTrend {
                test: lab.test.clone(),
                previous: past,
                current: lab.value,
                direction,
                change_percent,
                significance: assess_significance(&lab.test, change_percent, direction),
            });
        }
    }

    if let Some(ehr) = observations.ehr() {
        let has = |kw: &str| ehr.has_condition(kw);
        if has("ckd") && has("diabetes") {
            report.patterns.push(ComorbidityPattern {
                name: "Diabetic Nephropathy Pattern".to_string(),
                description: "CKD + Diabetes suggests diabetic kidney disease".to_string(),
                monitoring: "Close monitoring of HbA1c, microalbuminuria, BP".to_string(),
            });
        }
        if has("hypertension") && has("ckd") {
            report.patterns.push(ComorbidityPattern {
                name: "Hypertensive Nephropathy".to_string(),
                description: "HTN contributing to kidney disease".to_string(),
                monitoring: "Aggressive BP control target <130/80".to_string(),
            });
        }
    }

    report
}

fn assess_significance(test: &str, change_percent: f64, direction: TrendDirection) -> String {
    let test = test.to_lowercase();
    if test.contains("creatinine") {
        if change_percent > CREATININE_SIGNIFICANT_PCT {
            return "SIGNIFICANT: >20% change in creatinine".to_string();
        }
        return "Monitor".to_string();
    }
    if test.contains("egfr") {
        if change_percent > EGFR_SIGNIFICANT_PCT && direction == TrendDirection::Falling {
            return "SIGNIFICANT: >15% decline in kidney function".to_string();
        }
        return "Stable decline".to_string();
    }
    if test.contains("hemoglobin") {
        if change_percent > HEMOGLOBIN_SIGNIFICANT_PCT {
            return "SIGNIFICANT: >10% change in hemoglobin".to_string();
        }
        return "Minor change".to_string();
    }
    "Assess clinically".to_string()
}

/// Interaction and lab-value risk triage. Pure over the evidence.
pub fn assess_risks(observations: &ObservationSet) -> RiskReport {
    let mut report = RiskReport::default();

    if let Some(interactions) = observations.interactions() {
        for ix in interactions {
            let finding = RiskFinding {
                category: "Drug Interaction".to_string(),
                detail: format!("{} + {}: {}", ix.drug_a, ix.drug_b, ix.description),
                action: if ix.severity.is_high_risk() {
                    "Consider alternatives".to_string()
                } else {
                    "Review and monitor".to_string()
                },
            };
            if ix.severity.is_high_risk() {
                report.risks.push(finding);
            } else {
                report.warnings.push(finding);
            }
        }
    }

    if let Some(labs) = observations.labs() {
        for lab in &labs.results {
            if lab.status.is_critical() {
                report.critical_values.push(RiskFinding {
                    category: "Critical Lab".to_string(),
                    detail: format!(
                        "{} {} {} ({})",
                        lab.test,
                        lab.value,
                        lab.unit,
                        lab.status.as_str()
                    ),
                    action: "Immediate clinical review required".to_string(),
                });
            } else if lab.status.is_abnormal() {
                let test = lab.test.to_lowercase();
                if test.contains("potassium") || test.contains("creatinine") {
                    report.warnings.push(RiskFinding {
                        category: "Abnormal Lab".to_string(),
                        detail: format!("{} {} {}", lab.test, lab.value, lab.unit),
                        action: "Monitor and trend".to_string(),
                    });
                }
            }
        }
    }

    report
}

/// Per-condition guideline search plus finding-driven recommendations.
/// The searches run in parallel, one task per condition.
pub async fn match_guidelines(
    registry: &Arc<ToolRegistry>,
    observations: &ObservationSet,
) -> GuidanceReport {
    let mut report = GuidanceReport::default();

    if let Some(ehr) = observations.ehr() {
        let mut handles: Vec<JoinHandle<(String, Result<Observation>)>> = Vec::new();
        for condition in &ehr.conditions {
            let keyword = condition
                .name
                .split_whitespace()
                .next()
                .unwrap_or("general")
                .to_lowercase();
            let registry = Arc::clone(registry);
            handles.push(tokio::spawn(async move {
                let result = registry
                    .invoke(ToolName::Guidelines, ToolInput::Keyword(keyword.clone()))
                    .await;
                (keyword, result)
            }));
        }

        // Join in condition order so the applicable list stays stable.
        let mut seen_titles = Vec::new();
        for handle in handles {
            match handle.await {
                Ok((_, Ok(Observation::Guidelines(hits)))) => {
                    for hit in hits {
                        if !seen_titles.contains(&hit.title) {
                            seen_titles.push(hit.title.clone());
                            report.applicable.push(hit);
                        }
                    }
                }
                Ok((_, Ok(_))) => {}
                Ok((keyword, Err(e))) => {
                    // A missing guideline corpus degrades, not aborts.
                    debug!(keyword, error = %e, "guideline search failed");
                }
                Err(e) => {
                    warn!(error = %e, "guideline search task panicked");
                }
            }
        }
    }

    if let Some(labs) = observations.labs() {
        for lab in &labs.results {
            if lab.test.eq_ignore_ascii_case("egfr") && lab.value < 35.0 {
                report.recommendations.push(GuidelineRecommendation {
                    source: "KDIGO CKD Guidelines".to_string(),
                    recommendation: "Nephrology referral for eGFR <35".to_string(),
                    strength: "Strong".to_string(),
                    urgency: "Within 2-4 weeks".to_string(),
                });
            }
            if lab.test.eq_ignore_ascii_case("hemoglobin") && lab.value < 11.0 {
                report.recommendations.push(GuidelineRecommendation {
                    source: "KDIGO Anemia Guidelines".to_string(),
                    recommendation: "Consider ESA therapy for Hgb <11 in CKD".to_string(),
                    strength: "Moderate".to_string(),
                    urgency: "Non-urgent".to_string(),
                });
            }
        }
    }

    report
}

pub struct SpecialistCoordinator {
    registry: Arc<ToolRegistry>,
    narrator: Arc<dyn Narrator>,
}

impl SpecialistCoordinator {
    pub fn new(registry: Arc<ToolRegistry>, narrator: Arc<dyn Narrator>) -> Self {
        Self { registry, narrator }
    }

    pub async fn run(
        &self,
        patient_id: &str,
        complaint: &str,
        sink: &dyn ProgressSink,
    ) -> Result<RunOutcome> {
        sink.emit("COORDINATOR_STARTED");
        let mut errors = Vec::new();

        let observations = self.gather(patient_id, complaint, &mut errors, sink).await;
        let observations = self.analyze(observations, sink).await;

        sink.emit("SYNTHESIS_STARTED");
        let user = user_prompt(patient_id, complaint);
        let summary = self
            .narrator
            .synthesize(SYSTEM_PROMPT, &user, &observations)
            .await?;
        sink.emit("SYNTHESIS_COMPLETED");

        Ok(RunOutcome {
            summary,
            observations,
            errors,
        })
    }

    /// Wave one is the record; wave two fetches labs, imaging, and meds
    /// concurrently, each gated on the complaint or the record.
    async fn gather(
        &self,
        patient_id: &str,
        complaint: &str,
        errors: &mut Vec<String>,
        sink: &dyn ProgressSink,
    ) -> ObservationSet {
        sink.emit("AGENT_DataGatherer_STARTED");
        let mut observations = ObservationSet::new();
        let ehr = self
            .registry
            .observe(
                ToolName::Ehr,
                ToolInput::Patient(patient_id.to_string()),
                sink,
            )
            .await;
        observations.insert(SourceKey::Ehr, ehr);

        let complaint_lower = complaint.to_lowercase();
        let mut wanted = Vec::new();
        if ["fatigue", "tired", "weak", "dizzy"]
            .iter()
            .any(|w| complaint_lower.contains(w))
        {
            wanted.push(ToolName::Labs);
        }
        if ["pain", "chest", "breath"]
            .iter()
            .any(|w| complaint_lower.contains(w))
        {
            wanted.push(ToolName::Imaging);
        }
        if observations
            .ehr()
            .map(|ehr| ehr.conditions.len() >= 2)
            .unwrap_or(false)
        {
            wanted.push(ToolName::Meds);
        }

        let mut handles: Vec<JoinHandle<(ToolName, Observation)>> = Vec::new();
        for tool in wanted {
            let registry = Arc::clone(&self.registry);
            let patient_id = patient_id.to_string();
            handles.push(tokio::spawn(async move {
                let result = registry
                    .invoke(tool, ToolInput::Patient(patient_id))
                    .await
                    .unwrap_or_else(|e| Observation::Error {
                        reason: e.to_string(),
                    });
                (tool, result)
            }));
        }
        for handle in handles {
            match handle.await {
                Ok((tool, observation)) => {
                    if let Observation::Error { reason } = &observation {
                        errors.push(format!("{}: {reason}", tool.source_key()));
                    }
                    observations.insert(tool.source_key(), observation);
                }
                Err(e) => {
                    warn!(error = %e, "gather task panicked");
                    errors.push(format!("gather: {e}"));
                }
            }
        }

        sink.emit("AGENT_DataGatherer_COMPLETED");
        observations
    }

    /// Run the three specialists concurrently over a shared snapshot of
    /// the gathered evidence, then file their reports.
    async fn analyze(&self, mut observations: ObservationSet, sink: &dyn ProgressSink) -> ObservationSet {
        sink.emit("AGENT_Analyzer_STARTED");
        sink.emit("AGENT_RiskAssessment_STARTED");
        sink.emit("AGENT_GuidelineExpert_STARTED");

        let snapshot = observations.clone();
        let trend_handle = {
            let snapshot = snapshot.clone();
            tokio::spawn(async move { analyze_trends(&snapshot) })
        };
        let risk_handle = {
            let snapshot = snapshot.clone();
            tokio::spawn(async move { assess_risks(&snapshot) })
        };
        let guidance_handle = {
            let registry = Arc::clone(&self.registry);
            tokio::spawn(async move { match_guidelines(&registry, &snapshot).await })
        };

        let trends = trend_handle.await.unwrap_or_else(|e| {
            warn!(error = %e, "trend specialist panicked");
            TrendReport::default()
        });
        let risks = risk_handle.await.unwrap_or_else(|e| {
            warn!(error = %e, "risk specialist panicked");
            RiskReport::default()
        });
        let guidance = guidance_handle.await.unwrap_or_else(|e| {
            warn!(error = %e, "guideline specialist panicked");
            GuidanceReport::default()
        });

        sink.emit("AGENT_Analyzer_COMPLETED");
        sink.emit("AGENT_RiskAssessment_COMPLETED");
        sink.emit("AGENT_GuidelineExpert_COMPLETED");

        observations.insert(SourceKey::Analysis, Observation::Trends(trends));
        observations.insert(SourceKey::Risks, Observation::Risks(risks));
        observations.insert(SourceKey::Guidelines, Observation::Guidance(guidance));
        observations
    }
}
