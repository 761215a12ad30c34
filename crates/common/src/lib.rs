//! Shared types for the meditriage workspace: clinical payloads, the
//! observation model that every reasoning tier reads and writes, error
//! handling, and progress reporting.

pub mod error;
pub mod model;
pub mod observation;
pub mod progress;
pub mod trace;

pub use error::{MeditriageError, Result};
pub use model::{
    Allergy, ComorbidityPattern, Condition, Demographics, EhrRecord, GuidanceReport, GuidelineHit,
    GuidelineRecommendation, ImagingReport, ImagingStudy, Interaction, InteractionSeverity,
    LabPanel, LabResult, LabStatus, LabTrend, Medication, MedicationList, Prescription,
    RiskFinding, RiskReport, TrendDirection, TrendReport, Vitals,
};
pub use observation::{Observation, ObservationSet, SourceKey};
pub use progress::{MemorySink, NullSink, ProgressSink};
pub use trace::{CorrectionRound, Critique, ReasoningTrace, TraceStep};
