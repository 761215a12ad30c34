//! Static drug-safety knowledge: contraindication rules, mechanism-level
//! interaction pairs, allergy drug classes, and renal-clearance lists.
//! A deployment would back these with a real formulary service; the
//! tables here cover the reference drug set.

use crate::warning::Severity;

/// A condition-keyed contraindication for a specific drug.
#[derive(Debug, Clone, Copy)]
pub struct ContraindicationRule {
    /// Condition name fragment, matched case-insensitively in both
    /// directions against documented conditions.
    pub condition: &'static str,
    pub severity: Severity,
    pub recommendation: &'static str,
    pub alternative: Option<&'static str>,
}

pub fn contraindications_for(drug: &str) -> &'static [ContraindicationRule] {
    match drug.to_lowercase().as_str() {
        "metformin" => &[
            ContraindicationRule {
                condition: "severe renal impairment",
                severity: Severity::Critical,
                recommendation: "Contraindicated if eGFR <30",
                alternative: Some("Insulin therapy"),
            },
            ContraindicationRule {
                condition: "severe hepatic impairment",
                severity: Severity::High,
                recommendation: "Use with caution in liver disease",
                alternative: Some("Insulin therapy"),
            },
        ],
        "lisinopril" => &[
            ContraindicationRule {
                condition: "pregnancy",
                severity: Severity::Critical,
                recommendation: "Contraindicated in pregnancy",
                alternative: Some("Methyldopa or labetalol"),
            },
            ContraindicationRule {
                condition: "bilateral renal artery stenosis",
                severity: Severity::High,
                recommendation: "May cause acute renal failure",
                alternative: Some("Calcium channel blocker"),
            },
        ],
        "warfarin" => &[
            ContraindicationRule {
                condition: "active bleeding",
                severity: Severity::Critical,
                recommendation: "Contraindicated with active bleeding",
                alternative: Some("Mechanical prophylaxis"),
            },
            ContraindicationRule {
                condition: "severe thrombocytopenia",
                severity: Severity::High,
                recommendation: "High bleeding risk",
                alternative: Some("DOAC or aspirin"),
            },
        ],
        _ => &[],
    }
}

/// A mechanism-level interaction between a prescribed drug and a current
/// medication, independent of the interaction database.
#[derive(Debug, Clone, Copy)]
pub struct PharmacologyRule {
    pub other: &'static str,
    pub severity: Severity,
    pub description: &'static str,
    pub recommendation: &'static str,
}

pub fn pharmacology_for(drug: &str) -> &'static [PharmacologyRule] {
    match drug.to_lowercase().as_str() {
        "warfarin" => &[
            PharmacologyRule {
                other: "aspirin",
                severity: Severity::High,
                description: "Increased bleeding risk",
                recommendation: "Monitor INR closely, consider PPI",
            },
            PharmacologyRule {
                other: "metformin",
                severity: Severity::Medium,
                description: "May affect INR",
                recommendation: "Monitor INR more frequently",
            },
        ],
        "digoxin" => &[PharmacologyRule {
            other: "furosemide",
            severity: Severity::High,
            description: "Hypokalemia increases digoxin toxicity",
            recommendation: "Monitor potassium and digoxin levels",
        }],
        "metformin" => &[PharmacologyRule {
            other: "furosemide",
            severity: Severity::Medium,
            description: "May increase metformin levels",
            recommendation: "Monitor renal function closely",
        }],
        _ => &[],
    }
}

const DRUG_CLASSES: &[(&str, &[&str])] = &[
    ("penicillin", &["amoxicillin", "ampicillin", "penicillin"]),
    ("sulfa", &["sulfamethoxazole", "sulfasalazine"]),
    ("ace_inhibitor", &["lisinopril", "enalapril", "captopril"]),
];

/// True when the documented allergy names a drug class the candidate
/// belongs to ("penicillin allergy" blocks amoxicillin).
pub fn is_class_allergy(drug: &str, allergy_name: &str) -> bool {
    let drug = drug.to_lowercase();
    let allergy = allergy_name.to_lowercase();
    DRUG_CLASSES.iter().any(|(class, members)| {
        allergy.contains(class) && members.contains(&drug.as_str())
    })
}

pub fn allergy_alternative(allergy_name: &str) -> Option<&'static str> {
    let allergy = allergy_name.to_lowercase();
    if allergy.contains("penicillin") {
        Some("Cephalexin or azithromycin")
    } else if allergy.contains("sulfa") {
        Some("Alternative antibiotic based on indication")
    } else if allergy.contains("ace_inhibitor") {
        Some("ARB (losartan, valsartan)")
    } else {
        None
    }
}

const RENAL_CLEARANCE_DRUGS: &[&str] = &[
    "metformin",
    "digoxin",
    "gabapentin",
    "pregabalin",
    "allopurinol",
    "colchicine",
    "sulfamethoxazole",
    "trimethoprim",
];

pub fn requires_renal_adjustment(drug: &str) -> bool {
    RENAL_CLEARANCE_DRUGS.contains(&drug.to_lowercase().as_str())
}

pub fn renal_alternative(drug: &str) -> Option<&'static str> {
    match drug.to_lowercase().as_str() {
        "metformin" => Some("Insulin therapy"),
        "gabapentin" => Some("Pregabalin (lower dose)"),
        "digoxin" => Some("Beta-blocker or calcium channel blocker"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metformin_renal_rule_is_critical() {
        let rules = contraindications_for("Metformin");
        let renal = rules
            .iter()
            .find(|r| r.condition.contains("renal"))
            .unwrap();
        assert_eq!(renal.severity, Severity::Critical);
        assert_eq!(renal.alternative, Some("Insulin therapy"));
    }

    #[test]
    fn unknown_drug_has_no_rules() {
        assert!(contraindications_for("acetaminophen").is_empty());
        assert!(pharmacology_for("acetaminophen").is_empty());
    }

    #[test]
    fn class_allergy_blocks_members() {
        assert!(is_class_allergy("Amoxicillin", "Penicillin allergy"));
        assert!(is_class_allergy("lisinopril", "ace_inhibitor intolerance"));
        assert!(!is_class_allergy("metformin", "Penicillin allergy"));
    }

    #[test]
    fn renal_drug_list_and_alternatives() {
        assert!(requires_renal_adjustment("Digoxin"));
        assert!(requires_renal_adjustment("gabapentin"));
        assert!(!requires_renal_adjustment("lisinopril"));
        assert_eq!(renal_alternative("metformin"), Some("Insulin therapy"));
        assert!(renal_alternative("colchicine").is_none());
    }

    #[test]
    fn warfarin_aspirin_pair_is_high() {
        let pair = pharmacology_for("warfarin")
            .iter()
            .find(|r| r.other == "aspirin")
            .unwrap();
        assert_eq!(pair.severity, Severity::High);
        assert!(pair.description.contains("bleeding"));
    }
}
