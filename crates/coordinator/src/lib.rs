//! The coordinator: assesses case complexity, routes to a reasoning
//! tier, and guarantees a summary comes back even when an advanced tier
//! fails.

pub mod config;
pub mod engine;
pub mod router;

pub use config::{EngineConfig, NarratorConfig, RouterConfig};
pub use engine::{Engine, RunReport};
pub use router::{assess, Assessment, Tier};
