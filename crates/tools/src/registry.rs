//! The tool registry. Tools are identified by a closed enum rather than
//! strings, so dispatch is exhaustive and an unknown tool is a compile
//! error, not a runtime surprise.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use meditriage_common::{
    Medication, MeditriageError, Observation, ProgressSink, Result, SourceKey,
};

/// Every tool the system can invoke. Declaration order is the fixed
/// execution priority: record first, then labs/meds/imaging, interaction
/// checks once medications are known, guidelines last.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ToolName {
    Ehr,
    Labs,
    Meds,
    Imaging,
    Ddi,
    Guidelines,
}

impl ToolName {
    pub const ALL: [ToolName; 6] = [
        ToolName::Ehr,
        ToolName::Labs,
        ToolName::Meds,
        ToolName::Imaging,
        ToolName::Ddi,
        ToolName::Guidelines,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::Ehr => "ehr",
            ToolName::Labs => "labs",
            ToolName::Meds => "meds",
            ToolName::Imaging => "imaging",
            ToolName::Ddi => "ddi",
            ToolName::Guidelines => "guidelines",
        }
    }

    /// The observation key this tool's output is filed under.
    pub fn source_key(&self) -> SourceKey {
        match self {
            ToolName::Ehr => SourceKey::Ehr,
            ToolName::Labs => SourceKey::Labs,
            ToolName::Meds => SourceKey::Meds,
            ToolName::Imaging => SourceKey::Imaging,
            ToolName::Ddi => SourceKey::Ddi,
            ToolName::Guidelines => SourceKey::Guide,
        }
    }

    /// Progress-event stem, e.g. `FETCH_LABS` -> `FETCH_LABS_STARTED`.
    pub fn event_stem(&self) -> &'static str {
        match self {
            ToolName::Ehr => "FETCH_EHR",
            ToolName::Labs => "FETCH_LABS",
            ToolName::Meds => "FETCH_MEDS",
            ToolName::Imaging => "FETCH_IMAGING",
            ToolName::Ddi => "CHECK_DDI",
            ToolName::Guidelines => "SEARCH_GUIDELINES",
        }
    }
}

impl std::fmt::Display for ToolName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed tool input. Each tool accepts exactly one variant; passing the
/// wrong one is a [`MeditriageError::Tool`].
#[derive(Debug, Clone)]
pub enum ToolInput {
    /// Patient identifier, for record-lookup tools.
    Patient(String),
    /// Medication list, for interaction checks.
    Medications(Vec<Medication>),
    /// Search term, for guideline lookup.
    Keyword(String),
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> ToolName;

    async fn invoke(&self, input: ToolInput) -> Result<Observation>;
}

/// Holds one implementation per [`ToolName`].
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<ToolName, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name(), tool);
    }

    pub fn get(&self, name: ToolName) -> Option<Arc<dyn Tool>> {
        self.tools.get(&name).cloned()
    }

    pub fn names(&self) -> Vec<ToolName> {
        let mut names: Vec<_> = self.tools.keys().copied().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Invoke a tool, propagating its error.
    pub async fn invoke(&self, name: ToolName, input: ToolInput) -> Result<Observation> {
        let tool = self
            .get(name)
            .ok_or_else(|| MeditriageError::Tool(format!("tool '{name}' is not registered")))?;
        debug!(tool = %name, "invoking tool");
        tool.invoke(input).await
    }

    /// Invoke a tool for an observation-gathering run: emits progress
    /// events and converts any failure into an [`Observation::Error`] so
    /// one broken data source never aborts the run.
    pub async fn observe(
        &self,
        name: ToolName,
        input: ToolInput,
        sink: &dyn ProgressSink,
    ) -> Observation {
        sink.emit(&format!("{}_STARTED", name.event_stem()));
        match self.invoke(name, input).await {
            Ok(observation) => {
                sink.emit(&format!("{}_COMPLETED", name.event_stem()));
                observation
            }
            Err(e) => {
                warn!(tool = %name, error = %e, "tool failed, recording error observation");
                sink.emit(&format!("{}_FAILED", name.event_stem()));
                Observation::Error {
                    reason: e.to_string(),
                }
            }
        }
    }
}
