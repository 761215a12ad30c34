//! End-to-end safety pipeline tests over mock tools and the template
//! narrator.

use std::sync::Arc;

use meditriage_common::{
    Allergy, Condition, EhrRecord, GuidelineHit, LabStatus, Medication, MedicationList,
    MemorySink, Observation, ObservationSet, Prescription, SourceKey,
};
use meditriage_narrator::TemplateNarrator;
use meditriage_safety::{SafetyMonitor, SafetyPhase, SafetyStatus, Severity, WarningType};
use meditriage_tools::mock::{renal_labs, sample_ehr, sample_meds, CannedTool, FailingTool};
use meditriage_tools::{ToolName, ToolRegistry};

fn monitor(registry: ToolRegistry) -> SafetyMonitor {
    SafetyMonitor::new(Arc::new(registry), Arc::new(TemplateNarrator::new()))
}

fn quiet_ddi_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(CannedTool::new(
        ToolName::Ddi,
        Observation::Interactions(vec![]),
    )));
    registry
}

fn rx(name: &str, dose: &str, frequency: &str) -> Prescription {
    Prescription {
        name: name.to_string(),
        dose: dose.to_string(),
        frequency: frequency.to_string(),
        instructions: None,
    }
}

#[tokio::test]
async fn metformin_with_renal_failure_is_critical() {
    let mut labs = renal_labs();
    labs.results[1].value = 28.0;
    labs.results[1].status = LabStatus::CriticalLow;
    let mut context = ObservationSet::new();
    context.insert(SourceKey::Ehr, Observation::Ehr(sample_ehr()));
    context.insert(SourceKey::Labs, Observation::Labs(labs));
    context.insert(SourceKey::Meds, Observation::Meds(sample_meds()));

    let sink = MemorySink::new();
    let report = monitor(quiet_ddi_registry())
        .run(
            "PT-1001",
            &[rx("metformin", "500mg", "BID")],
            &context,
            &sink,
        )
        .await;

    assert_eq!(report.status, SafetyStatus::Completed);
    let contraindication = report
        .warnings
        .iter()
        .find(|w| w.warning_type == WarningType::Contraindication)
        .expect("renal contraindication flagged");
    assert_eq!(contraindication.severity, Severity::Critical);
    assert!(contraindication.message.contains("eGFR 28"));
    assert_eq!(
        contraindication.alternative.as_deref(),
        Some("Insulin therapy")
    );

    // 67-year-old on a renally cleared drug: both dosing notes fire.
    let dosing: Vec<_> = report
        .warnings
        .iter()
        .filter(|w| w.warning_type == WarningType::Dosing)
        .collect();
    assert_eq!(dosing.len(), 2);
    assert!(dosing.iter().any(|w| w.severity == Severity::High));

    assert!(report.summary.contains("CRITICAL safety issue(s)"));
    assert!(!report.recommendations.is_empty());
    assert!(report
        .alternatives
        .iter()
        .any(|a| a.alternative == "Insulin therapy"));
    // Critical findings escalate to a narrative review.
    assert!(!report.insights.is_empty());
    assert!(report.phases_run.contains(&SafetyPhase::LlmReasoning));
    assert_eq!(report.phases_run.last(), Some(&SafetyPhase::FinalAssessment));
}

#[tokio::test]
async fn no_prescriptions_short_circuits() {
    let sink = MemorySink::new();
    let report = monitor(ToolRegistry::new())
        .run("PT-1001", &[], &ObservationSet::new(), &sink)
        .await;

    assert_eq!(report.status, SafetyStatus::NoPrescriptions);
    assert!(report.warnings.is_empty());
    assert_eq!(report.summary, "No prescriptions to validate");
    assert_eq!(report.phases_run, vec![SafetyPhase::InitialCheck]);
    assert!(sink
        .events()
        .contains(&"SAFETY_MONITOR_NO_PRESCRIPTIONS".to_string()));
}

#[tokio::test]
async fn ddi_outage_becomes_a_system_warning() {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(FailingTool::unavailable(
        ToolName::Ddi,
        "interaction service offline",
    )));

    let sink = MemorySink::new();
    let report = monitor(registry)
        .run(
            "PT-2002",
            &[rx("amoxicillin", "250mg", "TID")],
            &ObservationSet::new(),
            &sink,
        )
        .await;

    assert_eq!(report.status, SafetyStatus::Completed);
    let system = report
        .warnings
        .iter()
        .find(|w| w.warning_type == WarningType::SystemError)
        .expect("outage surfaced as a warning");
    assert_eq!(system.severity, Severity::Medium);
    assert_eq!(system.recommendation, "Manually verify drug interactions");
    // Medium severity does not escalate.
    assert!(report.insights.is_empty());
    assert!(!report.phases_run.contains(&SafetyPhase::LlmReasoning));
    assert_eq!(report.summary, "1 medium priority note(s)");
}

#[tokio::test]
async fn severe_class_allergy_blocks_prescription() {
    let mut context = ObservationSet::new();
    context.insert(
        SourceKey::Ehr,
        Observation::Ehr(EhrRecord {
            allergies: vec![Allergy {
                name: "Penicillin".to_string(),
                reaction: "anaphylaxis".to_string(),
                severity: "severe".to_string(),
            }],
            ..Default::default()
        }),
    );

    let sink = MemorySink::new();
    let report = monitor(quiet_ddi_registry())
        .run(
            "PT-3003",
            &[rx("Amoxicillin", "500mg", "TID")],
            &context,
            &sink,
        )
        .await;

    let allergy = report
        .warnings
        .iter()
        .find(|w| w.warning_type == WarningType::Allergy)
        .expect("class allergy flagged");
    assert_eq!(allergy.severity, Severity::Critical);
    assert!(allergy.recommendation.starts_with("DO NOT PRESCRIBE"));
    assert_eq!(
        allergy.alternative.as_deref(),
        Some("Cephalexin or azithromycin")
    );
    assert!(!report.insights.is_empty());
}

#[tokio::test]
async fn warfarin_on_aspirin_flags_pharmacology() {
    let mut context = ObservationSet::new();
    context.insert(
        SourceKey::Meds,
        Observation::Meds(MedicationList {
            active: vec![Medication::named("Aspirin")],
        }),
    );

    let sink = MemorySink::new();
    let report = monitor(quiet_ddi_registry())
        .run(
            "PT-4004",
            &[rx("warfarin", "5mg", "daily")],
            &context,
            &sink,
        )
        .await;

    let pair = report
        .warnings
        .iter()
        .find(|w| w.message == "Increased bleeding risk")
        .expect("mechanism pair flagged");
    assert_eq!(pair.severity, Severity::High);
    assert!(report
        .recommendations
        .contains(&"warfarin: Monitor INR closely, consider PPI".to_string()));
}

#[tokio::test]
async fn resolved_contraindication_history_is_noted() {
    let mut context = ObservationSet::new();
    context.insert(
        SourceKey::Ehr,
        Observation::Ehr(EhrRecord {
            conditions: vec![Condition {
                name: "Active bleeding".to_string(),
                status: "resolved".to_string(),
                onset: None,
            }],
            ..Default::default()
        }),
    );

    let sink = MemorySink::new();
    let report = monitor(quiet_ddi_registry())
        .run(
            "PT-5005",
            &[rx("warfarin", "5mg", "daily")],
            &context,
            &sink,
        )
        .await;

    let history = report
        .warnings
        .iter()
        .find(|w| w.message.starts_with("History of"))
        .expect("resolved history noted");
    assert_eq!(history.severity, Severity::Medium);
    assert!(history.message.contains("reassess before prescribing warfarin"));
    // Resolved conditions stay out of the live contraindication check.
    assert_eq!(report.warnings.len(), 1);
}

#[tokio::test]
async fn guideline_hits_surface_as_informational_notes() {
    let mut registry = quiet_ddi_registry();
    registry.register(Arc::new(CannedTool::new(
        ToolName::Guidelines,
        Observation::Guidelines(vec![GuidelineHit {
            title: "anticoagulation management".to_string(),
            snippet: "INR targets and bridging".to_string(),
            source: "anticoagulation_management.txt".to_string(),
        }]),
    )));

    let sink = MemorySink::new();
    let report = monitor(registry)
        .run(
            "PT-6006",
            &[rx("warfarin", "5mg", "daily")],
            &ObservationSet::new(),
            &sink,
        )
        .await;

    let note = report
        .warnings
        .iter()
        .find(|w| w.warning_type == WarningType::Info)
        .expect("guideline note recorded");
    assert_eq!(note.severity, Severity::Low);
    assert!(note.message.contains("anticoagulation management"));
    // Informational notes alone read as safe.
    assert!(report.summary.starts_with("All prescriptions appear safe"));
}

#[tokio::test]
async fn pipeline_emits_every_phase_event() {
    let mut context = ObservationSet::new();
    context.insert(SourceKey::Ehr, Observation::Ehr(sample_ehr()));

    let sink = MemorySink::new();
    let report = monitor(quiet_ddi_registry())
        .run(
            "PT-1001",
            &[rx("atorvastatin", "20mg", "daily")],
            &context,
            &sink,
        )
        .await;

    let events = sink.events();
    for expected in [
        "SAFETY_MONITOR_STARTED",
        "SAFETY_MONITOR_INITIAL_CHECK",
        "SAFETY_CHECKING_atorvastatin",
        "SAFETY_MONITOR_DDI_ANALYSIS",
        "SAFETY_MONITOR_CONTRAINDICATION_CHECK",
        "SAFETY_MONITOR_DOSING_ANALYSIS",
        "SAFETY_MONITOR_GUIDELINES_CHECK",
        "SAFETY_MONITOR_PHARMACOLOGY_CHECK",
        "SAFETY_MONITOR_EHR_HISTORY_CHECK",
        "SAFETY_MONITOR_FINAL_ASSESSMENT",
        "SAFETY_MONITOR_COMPLETED",
    ] {
        assert!(
            events.contains(&expected.to_string()),
            "missing event {expected}"
        );
    }
    assert_eq!(report.status, SafetyStatus::Completed);
}
