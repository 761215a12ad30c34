//! Fallback decorator: try the primary narrator, and if it fails or
//! returns something that is clearly not a clinical summary, render the
//! deterministic template instead. The engine always gets a summary.

use async_trait::async_trait;
use tracing::warn;

use meditriage_common::{ObservationSet, Result};

use crate::template::TemplateNarrator;
use crate::{Narrator, REQUIRED_SECTIONS};

pub struct FallbackNarrator<N: Narrator> {
    primary: N,
    template: TemplateNarrator,
}

impl<N: Narrator> FallbackNarrator<N> {
    pub fn new(primary: N) -> Self {
        Self {
            primary,
            template: TemplateNarrator::new(),
        }
    }

    /// A response that carries none of the expected section headers is
    /// treated the same as a failed request.
    fn is_plausible(text: &str) -> bool {
        !text.trim().is_empty() && REQUIRED_SECTIONS.iter().any(|s| text.contains(s))
    }
}

#[async_trait]
impl<N: Narrator> Narrator for FallbackNarrator<N> {
    async fn synthesize(
        &self,
        system: &str,
        user: &str,
        observations: &ObservationSet,
    ) -> Result<String> {
        match self.primary.synthesize(system, user, observations).await {
            Ok(text) if Self::is_plausible(&text) => Ok(text),
            Ok(_) => {
                warn!("primary narrator returned implausible output, using template");
                self.template.synthesize(system, user, observations).await
            }
            Err(e) => {
                warn!(error = %e, "primary narrator failed, using template");
                self.template.synthesize(system, user, observations).await
            }
        }
    }
}
