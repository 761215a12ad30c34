//! Audit structures: the think/act/observe trace of a reasoning loop and
//! the critique record of a self-correction pass.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceStep {
    pub thought: String,
    pub action: String,
    pub outcome: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReasoningTrace {
    steps: Vec<TraceStep>,
}

impl ReasoningTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(
        &mut self,
        thought: impl Into<String>,
        action: impl Into<String>,
        outcome: impl Into<String>,
    ) {
        self.steps.push(TraceStep {
            thought: thought.into(),
            action: action.into(),
            outcome: outcome.into(),
        });
    }

    pub fn steps(&self) -> &[TraceStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Human-readable rendering for audit output.
    pub fn render(&self) -> String {
        let mut out = String::from("=== Reasoning Trace ===\n");
        for (i, step) in self.steps.iter().enumerate() {
            out.push_str(&format!(
                "Step {}:\n  Thought: {}\n  Action: {}\n  Outcome: {}\n",
                i + 1,
                step.thought,
                step.action,
                step.outcome
            ));
        }
        out
    }
}

/// Result of scoring a draft narrative against the evidence it cites.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Critique {
    /// 0.0 ..= 10.0, deductions applied from a perfect 10.
    pub quality_score: f64,
    pub issues: Vec<String>,
    pub word_count: usize,
}

impl Critique {
    pub fn is_acceptable(&self) -> bool {
        self.issues.is_empty() || self.quality_score >= 8.0
    }
}

/// One generate-critique cycle of the self-correcting tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrectionRound {
    pub iteration: usize,
    pub summary: String,
    pub critique: Critique,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_renders_in_step_order() {
        let mut trace = ReasoningTrace::new();
        trace.push("Need the record", "fetch ehr", "3 conditions");
        trace.push("Check labs", "fetch labs", "2 abnormal");
        let rendered = trace.render();
        assert!(rendered.starts_with("=== Reasoning Trace ==="));
        let first = rendered.find("fetch ehr").unwrap();
        let second = rendered.find("fetch labs").unwrap();
        assert!(first < second);
        assert_eq!(trace.len(), 2);
    }

    #[test]
    fn critique_acceptance() {
        let clean = Critique {
            quality_score: 10.0,
            issues: vec![],
            word_count: 180,
        };
        assert!(clean.is_acceptable());

        let flawed = Critique {
            quality_score: 6.5,
            issues: vec!["Missing required section: PLAN".to_string()],
            word_count: 80,
        };
        assert!(!flawed.is_acceptable());

        let good_enough = Critique {
            quality_score: 9.0,
            issues: vec!["Abnormal eGFR value not mentioned".to_string()],
            word_count: 200,
        };
        assert!(good_enough.is_acceptable());
    }
}
