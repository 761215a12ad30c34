//! Deterministic template synthesis. Pre-builds the whole summary from
//! exact data extraction, so the output can never claim something the
//! observations do not contain. Identical observations always render to
//! identical bytes.

use async_trait::async_trait;

use meditriage_common::{LabStatus, ObservationSet, Result};

use crate::{parse_prompt_field, Narrator};

#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateNarrator;

impl TemplateNarrator {
    pub fn new() -> Self {
        Self
    }

    /// Pure rendering; `synthesize` delegates here.
    pub fn render(observations: &ObservationSet, patient_id: &str, complaint: &str) -> String {
        let mut out = String::new();

        out.push_str("## ONE-LINE SUMMARY\n");
        out.push_str(&one_liner(observations, complaint));
        out.push_str("\n\n## PATIENT SNAPSHOT\n");
        out.push_str(&snapshot(observations, patient_id, complaint));
        out.push_str("\n\n## ATTENTION NEEDED\n");
        out.push_str(&attention(observations));
        out.push_str("\n\n## MEDICATION CONCERNS\n");
        out.push_str(&medication_concerns(observations));
        out.push_str("\n\n## PLAN\n");
        out.push_str(&plan(observations));
        out.push_str(
            "\n\n---\n*Data sources: [EHR] Electronic Health Record, [LABS] Laboratory \
             Results, [MEDS] Medication List, [DDI] Drug Interaction Database, \
             [GUIDELINES] Clinical Practice Guidelines*",
        );
        out
    }
}

#[async_trait]
impl Narrator for TemplateNarrator {
    async fn synthesize(
        &self,
        _system: &str,
        user: &str,
        observations: &ObservationSet,
    ) -> Result<String> {
        let patient_id = parse_prompt_field(user, "patient_id");
        let complaint = parse_prompt_field(user, "complaint");
        Ok(Self::render(observations, &patient_id, &complaint))
    }
}

fn one_liner(observations: &ObservationSet, complaint: &str) -> String {
    match observations.ehr() {
        Some(ehr) => {
            let primary = ehr
                .conditions
                .first()
                .map(|c| c.name.clone())
                .unwrap_or_else(|| "multiple conditions".to_string());
            format!(
                "{}yo {} with {} presenting with {} [EHR]",
                ehr.demographics.age, ehr.demographics.gender, primary, complaint
            )
        }
        None => format!("Patient presenting with {complaint} (record unavailable)"),
    }
}

fn snapshot(observations: &ObservationSet, patient_id: &str, complaint: &str) -> String {
    let mut lines = vec![format!("- Patient: {patient_id}")];
    lines.push(format!("- Chief Complaint: {complaint}"));
    if let Some(ehr) = observations.ehr() {
        lines.push(format!(
            "- Age/Gender: {}yo {} [EHR]",
            ehr.demographics.age, ehr.demographics.gender
        ));
        let conditions: Vec<_> = ehr
            .conditions
            .iter()
            .take(3)
            .map(|c| c.name.clone())
            .collect();
        let condition_str = if conditions.is_empty() {
            "no documented conditions".to_string()
        } else {
            conditions.join(", ")
        };
        lines.push(format!("- Active Conditions: {condition_str} [EHR]"));
        let allergy_str = if ehr.allergies.is_empty() {
            "none documented".to_string()
        } else {
            ehr.allergies
                .iter()
                .map(|a| a.name.clone())
                .collect::<Vec<_>>()
                .join(", ")
        };
        lines.push(format!("- Allergies: {allergy_str} [EHR]"));
        if let Some(bp) = &ehr.vitals.blood_pressure {
            lines.push(format!("- BP: {bp} [EHR]"));
        }
    } else {
        lines.push("- Health record unavailable".to_string());
    }
    lines.join("\n")
}

fn attention(observations: &ObservationSet) -> String {
    let mut items = Vec::new();

    if let Some(labs) = observations.labs() {
        // Critical values first, with clinical context for the common ones.
        for lab in labs.results.iter().filter(|r| r.status.is_critical()) {
            let line = if lab.test.eq_ignore_ascii_case("egfr") {
                format!(
                    "- Severe kidney dysfunction: eGFR {} {} [LABS]",
                    lab.value, lab.unit
                )
            } else if lab.test.eq_ignore_ascii_case("hemoglobin") {
                format!(
                    "- Severe anemia: Hemoglobin {} {} [LABS]",
                    lab.value, lab.unit
                )
            } else if lab.test.eq_ignore_ascii_case("potassium") {
                format!(
                    "- Critical potassium: K+ {} {} (arrhythmia risk) [LABS]",
                    lab.value, lab.unit
                )
            } else {
                format!(
                    "- {}: {} {} ({}) [LABS]",
                    lab.test,
                    lab.value,
                    lab.unit,
                    lab.status.as_str()
                )
            };
            items.push(line);
        }
        for lab in labs
            .results
            .iter()
            .filter(|r| matches!(r.status, LabStatus::High | LabStatus::Low))
            .take(3)
        {
            items.push(format!(
                "- {}: {} {} ({}) [LABS]",
                lab.test,
                lab.value,
                lab.unit,
                lab.status.as_str()
            ));
        }

        // Worsening trends, two at most.
        let mut trend_count = 0;
        for lab in &labs.results {
            if trend_count >= 2 {
                break;
            }
            let Some(past) = labs.historical_for(&lab.test) else {
                continue;
            };
            if lab.value == past {
                continue;
            }
            let test = lab.test.to_lowercase();
            if test == "egfr" && lab.value < past {
                let pct = (((lab.value - past) / past * 100.0).abs() * 10.0).round() / 10.0;
                items.push(format!(
                    "- Declining kidney function: eGFR {} -> {} ({pct}% decrease over 6mo) [LABS]",
                    past, lab.value
                ));
                trend_count += 1;
            } else if test == "hemoglobin" && lab.value < past {
                items.push(format!(
                    "- Worsening anemia: Hemoglobin {} -> {} {} [LABS]",
                    past, lab.value, lab.unit
                ));
                trend_count += 1;
            } else if (test == "creatinine" || test == "bun") && lab.value > past {
                items.push(format!(
                    "- Rising {}: {} -> {} {} [LABS]",
                    lab.test, past, lab.value, lab.unit
                ));
                trend_count += 1;
            }
        }
    }

    if items.is_empty() {
        "- All laboratory values within acceptable ranges".to_string()
    } else {
        items.join("\n")
    }
}

fn medication_concerns(observations: &ObservationSet) -> String {
    let mut items = Vec::new();

    if let Some(meds) = observations.meds() {
        if !meds.active.is_empty() {
            items.push(format!(
                "- Active medications: {} [MEDS]",
                meds.names().join(", ")
            ));
        }
    }

    match observations.interactions() {
        Some(interactions) if !interactions.is_empty() => {
            for ix in interactions.iter().take(3) {
                items.push(format!(
                    "- {} + {}: {} - {} [DDI]",
                    ix.drug_a,
                    ix.drug_b,
                    ix.severity.as_str(),
                    ix.description
                ));
            }
        }
        _ => items.push("- No significant drug-drug interactions detected [DDI]".to_string()),
    }

    items.join("\n")
}

fn plan(observations: &ObservationSet) -> String {
    let mut items: Vec<String> = Vec::new();

    let has_ckd = observations
        .ehr()
        .map(|ehr| ehr.has_condition("kidney") || ehr.has_condition("ckd"))
        .unwrap_or(false);

    let labs = observations.labs();
    let egfr = labs.and_then(|l| l.value_of("egfr"));
    let hgb = labs.and_then(|l| l.value_of("hemoglobin"));
    let potassium = labs.and_then(|l| l.value_of("potassium"));
    let creatinine = labs.and_then(|l| l.value_of("creatinine"));

    if has_ckd {
        if let Some(egfr) = egfr {
            if egfr < 30.0 {
                items.push(format!(
                    "URGENT: Nephrology referral for advanced CKD (eGFR {egfr}) [GUIDELINES]"
                ));
            } else if egfr < 45.0 {
                items.push(format!(
                    "Nephrology referral for CKD management (eGFR {egfr}) [GUIDELINES]"
                ));
            }
        }
        if let Some(hgb) = hgb {
            if hgb < 10.0 {
                items.push(format!(
                    "Initiate ESA therapy for severe anemia (Hgb {hgb}) [GUIDELINES]"
                ));
            } else if hgb < 11.0 {
                items.push(format!(
                    "Consider ESA for anemia management (Hgb {hgb}) [GUIDELINES]"
                ));
            }
        }
    }

    if let Some(k) = potassium {
        if k > 5.5 {
            items.push(format!(
                "Monitor potassium closely, consider dietary counseling (K+ {k}) [GUIDELINES]"
            ));
        }
    }

    // CKD tightens the BP target.
    if let Some(bp) = observations.ehr().and_then(|ehr| ehr.vitals.blood_pressure.as_deref()) {
        let systolic = bp.split('/').next().and_then(|s| s.trim().parse::<u32>().ok());
        if let Some(systolic) = systolic {
            if systolic > 140 {
                let target = if has_ckd { "<130/80" } else { "<140/90" };
                items.push(format!(
                    "Optimize BP control (current {bp}, target {target}) [GUIDELINES]"
                ));
            }
        }
    }

    if let Some(interactions) = observations.interactions() {
        let high = interactions.iter().filter(|i| i.severity.is_high_risk()).count();
        if high > 0 {
            items.push(format!(
                "Review medications for {high} high-severity interactions [DDI]"
            ));
        }
    }

    if has_ckd && creatinine.is_some() {
        let on_ace_arb = observations
            .meds()
            .map(|meds| {
                meds.active.iter().any(|m| {
                    let name = m.name.to_lowercase();
                    name.contains("lisinopril")
                        || name.contains("losartan")
                        || name.contains("enalapril")
                })
            })
            .unwrap_or(false);
        if on_ace_arb {
            items.push(
                "Continue ACE-inhibitor therapy, monitor renal function [GUIDELINES]".to_string(),
            );
        }
    }

    if items.is_empty() {
        return "1. Continue current management\n2. Routine follow-up in 3 months".to_string();
    }

    let followup = if egfr.map(|v| v < 30.0).unwrap_or(false) {
        "1-2 weeks"
    } else if items.len() >= 3 {
        "2-4 weeks"
    } else {
        "4-8 weeks"
    };
    items.push(format!("Follow-up in {followup} to reassess"));

    items
        .iter()
        .enumerate()
        .map(|(i, item)| format!("{}. {}", i + 1, item))
        .collect::<Vec<_>>()
        .join("\n")
}
