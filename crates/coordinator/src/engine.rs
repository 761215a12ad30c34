//! The engine: fetch the record, assess, dispatch to a tier, and fall
//! back to the standard tier if an advanced tier errors. A run always
//! returns a report with a summary.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use meditriage_agents::{
    ReasoningLoopAgent, SelfCorrectingAgent, SpecialistCoordinator, StandardOrchestrator,
};
use meditriage_common::{
    CorrectionRound, MeditriageError, Observation, ObservationSet, ProgressSink, ReasoningTrace,
    Result, SourceKey,
};
use meditriage_narrator::{user_prompt, Narrator, SYSTEM_PROMPT};
use meditriage_tools::{ToolInput, ToolName, ToolRegistry};

use crate::config::EngineConfig;
use crate::router::{assess, Assessment, Tier};

/// Everything a run produced, for callers and for audit.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub summary: String,
    pub observations: ObservationSet,
    pub assessment: Assessment,
    /// e.g. "CRITICAL", or "STANDARD (fallback)" when a tier failed over.
    pub tier_used: String,
    pub reasoning_trace: Option<ReasoningTrace>,
    pub correction_rounds: Vec<CorrectionRound>,
    /// The advanced-tier error when the run fell back.
    pub error: Option<String>,
}

pub struct Engine {
    registry: Arc<ToolRegistry>,
    narrator: Arc<dyn Narrator>,
    config: EngineConfig,
}

impl Engine {
    pub fn new(
        registry: Arc<ToolRegistry>,
        narrator: Arc<dyn Narrator>,
        config: EngineConfig,
    ) -> Self {
        Self {
            registry,
            narrator,
            config,
        }
    }

    /// Routed processing: record first, assess, dispatch by tier.
    pub async fn process(
        &self,
        patient_id: &str,
        complaint: &str,
        sink: &dyn ProgressSink,
    ) -> RunReport {
        let run_id = Uuid::new_v4();
        info!(%run_id, patient_id, "processing case");

        let ehr = self
            .registry
            .observe(
                ToolName::Ehr,
                ToolInput::Patient(patient_id.to_string()),
                sink,
            )
            .await;

        let assessment = assess(complaint, ehr_of(&ehr), &self.config.router);
        sink.emit(&format!("COMPLEXITY_ASSESSMENT: {}", assessment.level));
        sink.emit(&format!("ROUTING_TO: {}", assessment.level.autonomy()));
        for reason in assessment.reasons.iter().take(3) {
            sink.emit(&format!("  - {reason}"));
        }

        match assessment.level {
            Tier::Standard => {
                sink.emit("USING_STANDARD_MODE: Fast & efficient");
                let outcome = self
                    .standard()
                    .run_with_ehr(patient_id, complaint, ehr, sink)
                    .await;
                RunReport {
                    run_id,
                    summary: outcome.summary,
                    observations: outcome.observations,
                    assessment,
                    tier_used: Tier::Standard.as_str().to_string(),
                    reasoning_trace: None,
                    correction_rounds: Vec::new(),
                    error: None,
                }
            }
            Tier::Complex => {
                sink.emit("USING_COMPLEX_MODE: Adaptive reasoning");
                match self.run_complex(patient_id, complaint, ehr.clone(), sink).await {
                    Ok((summary, observations, trace)) => RunReport {
                        run_id,
                        summary,
                        observations,
                        assessment,
                        tier_used: Tier::Complex.as_str().to_string(),
                        reasoning_trace: Some(trace),
                        correction_rounds: Vec::new(),
                        error: None,
                    },
                    Err(e) => {
                        self.fall_back(run_id, patient_id, complaint, ehr, assessment, e, sink)
                            .await
                    }
                }
            }
            Tier::Critical => {
                sink.emit("USING_CRITICAL_MODE: Maximum quality & safety");
                match self.run_critical(patient_id, complaint, ehr.clone(), sink).await {
                    Ok((summary, observations, trace, rounds)) => RunReport {
                        run_id,
                        summary,
                        observations,
                        assessment,
                        tier_used: Tier::Critical.as_str().to_string(),
                        reasoning_trace: Some(trace),
                        correction_rounds: rounds,
                        error: None,
                    },
                    Err(e) => {
                        self.fall_back(run_id, patient_id, complaint, ehr, assessment, e, sink)
                            .await
                    }
                }
            }
        }
    }

    /// Comprehensive processing: skip routing and run the multi-specialist
    /// tier, falling back to standard on error.
    pub async fn process_comprehensive(
        &self,
        patient_id: &str,
        complaint: &str,
        sink: &dyn ProgressSink,
    ) -> RunReport {
        let run_id = Uuid::new_v4();
        sink.emit("USING_MULTI_AGENT_MODE: Comprehensive analysis");
        let assessment = assess(complaint, None, &self.config.router);

        let coordinator =
            SpecialistCoordinator::new(Arc::clone(&self.registry), Arc::clone(&self.narrator));
        match coordinator.run(patient_id, complaint, sink).await {
            Ok(outcome) => RunReport {
                run_id,
                summary: outcome.summary,
                observations: outcome.observations,
                assessment,
                tier_used: "COMPREHENSIVE".to_string(),
                reasoning_trace: None,
                correction_rounds: Vec::new(),
                error: None,
            },
            Err(e) => {
                let ehr = self
                    .registry
                    .observe(
                        ToolName::Ehr,
                        ToolInput::Patient(patient_id.to_string()),
                        sink,
                    )
                    .await;
                self.fall_back(run_id, patient_id, complaint, ehr, assessment, e, sink)
                    .await
            }
        }
    }

    async fn run_complex(
        &self,
        patient_id: &str,
        complaint: &str,
        ehr: Observation,
        sink: &dyn ProgressSink,
    ) -> Result<(String, ObservationSet, ReasoningTrace)> {
        let mut seed = ObservationSet::new();
        seed.insert(SourceKey::Ehr, ehr);
        let agent = ReasoningLoopAgent::new(Arc::clone(&self.registry));
        let (observations, trace) = agent.run(patient_id, complaint, seed, sink).await;

        sink.emit("SYNTHESIS_STARTED");
        let user = user_prompt(patient_id, complaint);
        let summary = self
            .narrator
            .synthesize(SYSTEM_PROMPT, &user, &observations)
            .await
            .map_err(|e| MeditriageError::Routing(format!("complex-tier synthesis: {e}")))?;
        sink.emit("SYNTHESIS_COMPLETED");
        Ok((summary, observations, trace))
    }

    async fn run_critical(
        &self,
        patient_id: &str,
        complaint: &str,
        ehr: Observation,
        sink: &dyn ProgressSink,
    ) -> Result<(String, ObservationSet, ReasoningTrace, Vec<CorrectionRound>)> {
        let mut seed = ObservationSet::new();
        seed.insert(SourceKey::Ehr, ehr);
        let agent = ReasoningLoopAgent::new(Arc::clone(&self.registry));
        let (observations, trace) = agent.run(patient_id, complaint, seed, sink).await;

        let corrector =
            SelfCorrectingAgent::new(Arc::clone(&self.registry), Arc::clone(&self.narrator));
        let (summary, rounds) = corrector
            .run(patient_id, complaint, observations.clone(), sink)
            .await
            .map_err(|e| MeditriageError::Routing(format!("critical-tier correction: {e}")))?;
        Ok((summary, observations, trace, rounds))
    }

    /// Any advanced-tier error lands here: log it, record it, and run the
    /// standard tier so the caller still gets a summary.
    async fn fall_back(
        &self,
        run_id: Uuid,
        patient_id: &str,
        complaint: &str,
        ehr: Observation,
        assessment: Assessment,
        error: MeditriageError,
        sink: &dyn ProgressSink,
    ) -> RunReport {
        warn!(%run_id, error = %error, "advanced tier failed, falling back to standard");
        sink.emit(&format!("ROUTING_ERROR: {error}, falling back to standard mode"));
        let outcome = self
            .standard()
            .run_with_ehr(patient_id, complaint, ehr, sink)
            .await;
        RunReport {
            run_id,
            summary: outcome.summary,
            observations: outcome.observations,
            assessment,
            tier_used: "STANDARD (fallback)".to_string(),
            reasoning_trace: None,
            correction_rounds: Vec::new(),
            error: Some(error.to_string()),
        }
    }

    fn standard(&self) -> StandardOrchestrator {
        StandardOrchestrator::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.narrator),
            self.config.selector.clone(),
        )
    }
}

fn ehr_of(observation: &Observation) -> Option<&meditriage_common::EhrRecord> {
    match observation {
        Observation::Ehr(record) => Some(record),
        _ => None,
    }
}
