//! Keyword-driven tool selection. Given a chief complaint and whatever is
//! already known from the record, decide which tools a run should invoke
//! and in what order. When the evidence is too thin to narrow the set,
//! fall back to the full registry rather than guess.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use meditriage_common::EhrRecord;

use crate::registry::ToolName;

/// Keyword tables driving selection. Defaults carry the reference
/// vocabulary; deployments can override them from configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    pub labs_keywords: Vec<String>,
    pub imaging_keywords: Vec<String>,
    pub meds_keywords: Vec<String>,
    pub ddi_keywords: Vec<String>,
    pub guidelines_keywords: Vec<String>,
    /// Complaints mentioning pain pull in labs, meds, and guidelines.
    pub pain_words: Vec<String>,
    /// Respiratory complaints pull in labs, imaging, and meds.
    pub respiratory_words: Vec<String>,
    /// Constitutional complaints pull in labs and meds.
    pub constitutional_words: Vec<String>,
    /// Condition count at or above which an interaction check is added.
    pub ddi_condition_threshold: usize,
    /// At or below this many selected tools the selection is considered
    /// too ambiguous and the whole registry runs instead.
    pub ambiguity_floor: usize,
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            labs_keywords: words(&[
                "blood",
                "lab",
                "test",
                "results",
                "cbc",
                "bmp",
                "creatinine",
                "glucose",
                "hemoglobin",
                "a1c",
                "liver",
                "kidney",
                "electrolyte",
            ]),
            imaging_keywords: words(&[
                "x-ray",
                "ct",
                "mri",
                "ultrasound",
                "scan",
                "imaging",
                "chest",
                "radiograph",
                "echo",
                "echocardiogram",
            ]),
            meds_keywords: words(&[
                "medication",
                "drug",
                "pill",
                "prescription",
                "taking",
                "dose",
                "side effect",
                "adverse",
                "reaction",
            ]),
            ddi_keywords: words(&[
                "interaction",
                "multiple medications",
                "new medication",
                "changed medication",
                "drug interaction",
            ]),
            guidelines_keywords: words(&[
                "protocol",
                "treatment",
                "management",
                "guideline",
                "standard",
                "recommendation",
                "therapy",
            ]),
            pain_words: words(&["pain", "ache", "discomfort"]),
            respiratory_words: words(&["shortness", "breath", "sob", "dyspnea"]),
            constitutional_words: words(&["dizzy", "fatigue", "weakness", "tired"]),
            ddi_condition_threshold: 3,
            ambiguity_floor: 2,
        }
    }
}

impl SelectorConfig {
    fn keyword_tables(&self) -> [(ToolName, &[String]); 5] {
        [
            (ToolName::Labs, self.labs_keywords.as_slice()),
            (ToolName::Imaging, self.imaging_keywords.as_slice()),
            (ToolName::Meds, self.meds_keywords.as_slice()),
            (ToolName::Ddi, self.ddi_keywords.as_slice()),
            (ToolName::Guidelines, self.guidelines_keywords.as_slice()),
        ]
    }
}

fn mentions_any(text: &str, word_list: &[String]) -> bool {
    word_list.iter().any(|w| text.contains(w.as_str()))
}

/// Pure selection: same complaint, record, and config always give the same
/// set. The EHR tool is always a member.
pub fn select_tools(
    complaint: &str,
    ehr: Option<&EhrRecord>,
    config: &SelectorConfig,
) -> BTreeSet<ToolName> {
    let complaint = complaint.to_lowercase();
    let mut selected = BTreeSet::from([ToolName::Ehr]);

    for (tool, keywords) in config.keyword_tables() {
        if keywords.iter().any(|k| complaint.contains(k.as_str())) {
            selected.insert(tool);
        }
    }

    if mentions_any(&complaint, &config.pain_words) {
        selected.extend([ToolName::Labs, ToolName::Meds, ToolName::Guidelines]);
    }
    if mentions_any(&complaint, &config.respiratory_words) {
        selected.extend([ToolName::Labs, ToolName::Imaging, ToolName::Meds]);
    }
    if mentions_any(&complaint, &config.constitutional_words) {
        selected.extend([ToolName::Labs, ToolName::Meds]);
    }

    if let Some(record) = ehr {
        if record.active_condition_count() >= config.ddi_condition_threshold {
            selected.insert(ToolName::Ddi);
        }
        if record.active_condition_count() > 0 {
            selected.insert(ToolName::Guidelines);
        }
    }

    if selected.len() <= config.ambiguity_floor {
        debug!(
            selected = selected.len(),
            "selection too ambiguous, running every tool"
        );
        selected = ToolName::ALL.into_iter().collect();
    }

    selected
}

/// Fixed execution order: record first, interaction checks after the
/// medication list, guidelines last.
pub fn prioritize(selected: &BTreeSet<ToolName>) -> Vec<ToolName> {
    ToolName::ALL
        .into_iter()
        .filter(|t| selected.contains(t))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use meditriage_common::Condition;

    fn record_with_conditions(names: &[&str]) -> EhrRecord {
        EhrRecord {
            conditions: names.iter().map(|n| Condition::new(*n)).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn ehr_is_always_selected() {
        let config = SelectorConfig::default();
        for complaint in ["chest pain", "routine follow-up", ""] {
            let selected = select_tools(complaint, None, &config);
            assert!(selected.contains(&ToolName::Ehr), "missing ehr for {complaint:?}");
        }
    }

    #[test]
    fn ambiguous_complaint_falls_back_to_everything() {
        let config = SelectorConfig::default();
        let ehr = record_with_conditions(&["Seasonal allergies"]);
        // "mild cough" matches no keyword table; guidelines joins via the
        // condition rule, leaving only two tools, which is below the floor.
        let selected = select_tools("mild cough", Some(&ehr), &config);
        assert_eq!(selected.len(), ToolName::ALL.len());
        assert!(selected.contains(&ToolName::Labs));
        assert!(selected.contains(&ToolName::Meds));
    }

    #[test]
    fn respiratory_complaint_pulls_in_imaging() {
        let config = SelectorConfig::default();
        let selected = select_tools("shortness of breath on exertion", None, &config);
        assert!(selected.contains(&ToolName::Imaging));
        assert!(selected.contains(&ToolName::Labs));
        assert!(selected.contains(&ToolName::Meds));
    }

    #[test]
    fn many_conditions_adds_interaction_check() {
        let config = SelectorConfig::default();
        let ehr = record_with_conditions(&["CKD Stage 3", "Type 2 Diabetes", "Hypertension"]);
        let selected = select_tools("worsening fatigue and swelling", Some(&ehr), &config);
        assert!(selected.contains(&ToolName::Ddi));
        assert!(selected.contains(&ToolName::Guidelines));
    }

    #[test]
    fn selection_is_deterministic() {
        let config = SelectorConfig::default();
        let ehr = record_with_conditions(&["CKD Stage 3", "Hypertension"]);
        let a = select_tools("chest pain with dyspnea", Some(&ehr), &config);
        let b = select_tools("chest pain with dyspnea", Some(&ehr), &config);
        assert_eq!(a, b);
    }

    #[test]
    fn prioritize_orders_by_fixed_priority() {
        let selected: BTreeSet<_> = [ToolName::Guidelines, ToolName::Ehr, ToolName::Ddi]
            .into_iter()
            .collect();
        assert_eq!(
            prioritize(&selected),
            vec![ToolName::Ehr, ToolName::Ddi, ToolName::Guidelines]
        );
    }
}
