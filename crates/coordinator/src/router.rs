//! Complexity routing. A pure scoring pass over the complaint and record
//! decides which reasoning tier handles the case.

use serde::{Deserialize, Serialize};

use meditriage_common::EhrRecord;

use crate::config::RouterConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Tier {
    Standard,
    Complex,
    Critical,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Standard => "STANDARD",
            Tier::Complex => "COMPLEX",
            Tier::Critical => "CRITICAL",
        }
    }

    /// The autonomy description surfaced in progress events.
    pub fn autonomy(&self) -> &'static str {
        match self {
            Tier::Standard => "Smart Selection",
            Tier::Complex => "Smart + Adaptive Reasoning",
            Tier::Critical => "Smart + Adaptive Reasoning + Self-Correction",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assessment {
    pub complexity_score: u32,
    pub risk_score: u32,
    pub total_score: u32,
    pub level: Tier,
    pub reasons: Vec<String>,
}

/// Score a case. Pure: identical inputs always produce identical
/// assessments, so routing is auditable after the fact.
pub fn assess(complaint: &str, ehr: Option<&EhrRecord>, config: &RouterConfig) -> Assessment {
    let complaint = complaint.to_lowercase();
    let mut complexity_score = 0u32;
    let mut risk_score = 0u32;
    let mut reasons = Vec::new();

    for keyword in &config.complex_keywords {
        if complaint.contains(keyword.as_str()) {
            complexity_score += 1;
            reasons.push(format!("Complex keyword: '{keyword}'"));
        }
    }

    for keyword in &config.critical_keywords {
        if complaint.contains(keyword.as_str()) {
            risk_score += 2;
            reasons.push(format!("Critical keyword: '{keyword}'"));
        }
    }

    if let Some(record) = ehr {
        let condition_count = record.conditions.len();
        if condition_count >= 4 {
            complexity_score += 2;
            reasons.push(format!("{condition_count} active conditions"));
        } else if condition_count >= 3 {
            complexity_score += 1;
        }

        for condition in &record.conditions {
            let name = condition.name.to_lowercase();
            if config
                .high_risk_conditions
                .iter()
                .any(|risk| name.contains(risk.as_str()))
            {
                risk_score += 1;
                reasons.push(format!("High-risk condition: {}", condition.name));
            }
        }

        // No medication count here; several conditions is the proxy.
        if condition_count >= 3 {
            complexity_score += 1;
            reasons.push("Likely polypharmacy".to_string());
        }
    }

    let total_score = complexity_score + risk_score;
    let level = if risk_score >= config.critical_risk_threshold
        || total_score >= config.critical_total_threshold
    {
        Tier::Critical
    } else if complexity_score >= config.complex_complexity_threshold
        || total_score >= config.complex_total_threshold
    {
        Tier::Complex
    } else {
        Tier::Standard
    };

    Assessment {
        complexity_score,
        risk_score,
        total_score,
        level,
        reasons,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meditriage_common::Condition;

    fn record(conditions: &[&str]) -> EhrRecord {
        EhrRecord {
            conditions: conditions.iter().map(|n| Condition::new(*n)).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn mild_complaint_routes_standard() {
        let config = RouterConfig::default();
        let ehr = record(&["Seasonal allergies"]);
        let assessment = assess("mild cough", Some(&ehr), &config);
        assert_eq!(assessment.level, Tier::Standard);
        assert_eq!(assessment.total_score, 0);
    }

    #[test]
    fn sudden_chest_pain_routes_critical() {
        let config = RouterConfig::default();
        let assessment = assess("sudden chest pain", None, &config);
        // Two critical keywords: "chest pain" and "sudden".
        assert_eq!(assessment.risk_score, 4);
        assert_eq!(assessment.level, Tier::Critical);
    }

    #[test]
    fn high_risk_conditions_raise_risk() {
        let config = RouterConfig::default();
        let ehr = record(&["CKD Stage 3", "Type 2 Diabetes", "Hypertension"]);
        let assessment = assess("worsening fatigue", Some(&ehr), &config);
        // worsening (+1), 3 conditions (+1), polypharmacy (+1), CKD (+1 risk)
        assert_eq!(assessment.complexity_score, 3);
        assert_eq!(assessment.risk_score, 1);
        assert_eq!(assessment.level, Tier::Critical);
        assert!(assessment
            .reasons
            .iter()
            .any(|r| r.contains("High-risk condition")));
    }

    #[test]
    fn multiple_complex_keywords_without_risk_route_complex() {
        let config = RouterConfig::default();
        let assessment = assess("unclear and confused presentation", None, &config);
        assert_eq!(assessment.complexity_score, 2);
        assert_eq!(assessment.risk_score, 0);
        assert_eq!(assessment.level, Tier::Complex);
    }

    #[test]
    fn assessment_is_pure() {
        let config = RouterConfig::default();
        let ehr = record(&["CKD Stage 3"]);
        let a = assess("worsening fatigue", Some(&ehr), &config);
        let b = assess("worsening fatigue", Some(&ehr), &config);
        assert_eq!(a.total_score, b.total_score);
        assert_eq!(a.level, b.level);
        assert_eq!(a.reasons, b.reasons);
    }

    #[test]
    fn thresholds_come_from_config() {
        let config = RouterConfig {
            critical_risk_threshold: 10,
            critical_total_threshold: 10,
            ..Default::default()
        };
        let assessment = assess("sudden chest pain", None, &config);
        // risk 4 no longer clears the raised bar; total 4 is complex-tier.
        assert_eq!(assessment.level, Tier::Complex);
    }
}
