//! The reasoning tiers. Each tier gathers observations through the tool
//! registry and synthesizes a narrative through an injected narrator:
//!
//! - [`StandardOrchestrator`]: selected tools in fixed order, one pass.
//! - [`ReasoningLoopAgent`]: bounded think/act/observe loop that decides
//!   the next fetch from what it has already seen.
//! - [`SelfCorrectingAgent`]: generate, critique against the evidence,
//!   gather what is missing, regenerate.
//! - [`SpecialistCoordinator`]: concurrent gather, three concurrent
//!   specialists, fused synthesis.

pub mod correct;
pub mod react;
pub mod specialists;
pub mod standard;

pub use correct::{critique, SelfCorrectingAgent};
pub use react::{decide, NextAction, ReasoningLoopAgent};
pub use specialists::{analyze_trends, assess_risks, SpecialistCoordinator};
pub use standard::{RunOutcome, StandardOrchestrator};
