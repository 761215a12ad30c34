//! Narrative synthesis. A [`Narrator`] turns gathered observations into a
//! clinician-facing summary. Implementations: a deterministic
//! [`TemplateNarrator`], an HTTP [`HttpNarrator`] speaking the
//! chat-completions protocol, and a [`FallbackNarrator`] decorator that
//! guarantees a usable summary even when the endpoint is down.

use async_trait::async_trait;

use meditriage_common::{ObservationSet, Result};

pub mod fallback;
pub mod http;
pub mod template;

pub use fallback::FallbackNarrator;
pub use http::{HttpNarrator, HttpNarratorConfig};
pub use template::TemplateNarrator;

/// Default instructions for narrative synthesis.
pub const SYSTEM_PROMPT: &str = "You are a clinical decision support assistant. \
Write a concise summary (150-250 words) for the treating clinician using ONLY \
the observations provided. Structure it with these sections: ONE-LINE SUMMARY, \
PATIENT SNAPSHOT, ATTENTION NEEDED, MEDICATION CONCERNS, PLAN (numbered). Tag \
every factual claim with its source, e.g. [EHR], [LABS], [MEDS], [DDI], \
[GUIDELINES]. Never invent values that are not in the observations.";

/// The section headers a well-formed summary carries.
pub const REQUIRED_SECTIONS: [&str; 5] = [
    "ONE-LINE SUMMARY",
    "PATIENT SNAPSHOT",
    "ATTENTION NEEDED",
    "MEDICATION CONCERNS",
    "PLAN",
];

#[async_trait]
pub trait Narrator: Send + Sync {
    /// Produce a narrative from a system instruction, the run's user
    /// prompt (`patient_id: ...\ncomplaint: "..."`), and the evidence.
    async fn synthesize(
        &self,
        system: &str,
        user: &str,
        observations: &ObservationSet,
    ) -> Result<String>;
}

#[async_trait]
impl Narrator for Box<dyn Narrator> {
    async fn synthesize(
        &self,
        system: &str,
        user: &str,
        observations: &ObservationSet,
    ) -> Result<String> {
        (**self).synthesize(system, user, observations).await
    }
}

/// Build the conventional user prompt for a run.
pub fn user_prompt(patient_id: &str, complaint: &str) -> String {
    format!("patient_id: {patient_id}\ncomplaint: \"{complaint}\"")
}

/// Pull a `key: value` line back out of a user prompt. Quotes are
/// stripped; a missing key yields an empty string.
pub fn parse_prompt_field(user: &str, key: &str) -> String {
    let prefix = format!("{key}:");
    user.lines()
        .find_map(|line| line.strip_prefix(&prefix))
        .map(|rest| rest.trim().trim_matches('"').to_string())
        .unwrap_or_default()
}
