//! File-backed tools reading a demo data tree:
//!
//! ```text
//! data/
//!   ehr/<patient_id>_ehr.json
//!   labs/<patient_id>_labs.json
//!   meds/<patient_id>_meds.json
//!   imaging/<patient_id>_imaging.json
//!   drugs/ddi_matrix.json
//!   guidelines/*.txt
//! ```
//!
//! A missing file is [`MeditriageError::DataUnavailable`]; a file that
//! exists but fails to parse is [`MeditriageError::MalformedData`]. The
//! two are distinct on purpose: an absent record is a routine outcome, a
//! corrupt one is an operational problem.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;

use meditriage_common::{
    EhrRecord, GuidelineHit, ImagingReport, Interaction, LabPanel, Medication, MedicationList,
    MeditriageError, Observation, Result,
};

use crate::registry::{Tool, ToolInput, ToolName, ToolRegistry};

const SNIPPET_LEN: usize = 200;

/// Root of the data tree plus the conventional subdirectories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataDirs {
    pub root: PathBuf,
}

impl DataDirs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn ehr(&self) -> PathBuf {
        self.root.join("ehr")
    }

    pub fn labs(&self) -> PathBuf {
        self.root.join("labs")
    }

    pub fn meds(&self) -> PathBuf {
        self.root.join("meds")
    }

    pub fn imaging(&self) -> PathBuf {
        self.root.join("imaging")
    }

    pub fn drugs(&self) -> PathBuf {
        self.root.join("drugs")
    }

    pub fn guidelines(&self) -> PathBuf {
        self.root.join("guidelines")
    }
}

async fn read_json<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let bytes = tokio::fs::read(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            MeditriageError::DataUnavailable(format!("{what} not found at {}", path.display()))
        } else {
            MeditriageError::Io(e)
        }
    })?;
    serde_json::from_slice(&bytes)
        .map_err(|e| MeditriageError::MalformedData(format!("{what}: {e}")))
}

fn expect_patient(input: ToolInput, tool: ToolName) -> Result<String> {
    match input {
        ToolInput::Patient(id) => Ok(id),
        other => Err(MeditriageError::Tool(format!(
            "tool '{tool}' expects a patient id, got {other:?}"
        ))),
    }
}

// ---------------------------------------------------------------------------
// Record-lookup tools
// ---------------------------------------------------------------------------

pub struct FileEhrTool {
    dir: PathBuf,
}

#[async_trait]
impl Tool for FileEhrTool {
    fn name(&self) -> ToolName {
        ToolName::Ehr
    }

    async fn invoke(&self, input: ToolInput) -> Result<Observation> {
        let patient_id = expect_patient(input, self.name())?;
        let path = self.dir.join(format!("{patient_id}_ehr.json"));
        let record: EhrRecord = read_json(&path, "EHR record").await?;
        Ok(Observation::Ehr(record))
    }
}

pub struct FileLabsTool {
    dir: PathBuf,
}

#[async_trait]
impl Tool for FileLabsTool {
    fn name(&self) -> ToolName {
        ToolName::Labs
    }

    async fn invoke(&self, input: ToolInput) -> Result<Observation> {
        let patient_id = expect_patient(input, self.name())?;
        let path = self.dir.join(format!("{patient_id}_labs.json"));
        let panel: LabPanel = read_json(&path, "lab panel").await?;
        Ok(Observation::Labs(panel))
    }
}

pub struct FileMedsTool {
    dir: PathBuf,
}

#[async_trait]
impl Tool for FileMedsTool {
    fn name(&self) -> ToolName {
        ToolName::Meds
    }

    async fn invoke(&self, input: ToolInput) -> Result<Observation> {
        let patient_id = expect_patient(input, self.name())?;
        let path = self.dir.join(format!("{patient_id}_meds.json"));
        let list: MedicationList = read_json(&path, "medication list").await?;
        Ok(Observation::Meds(list))
    }
}

pub struct FileImagingTool {
    dir: PathBuf,
}

#[async_trait]
impl Tool for FileImagingTool {
    fn name(&self) -> ToolName {
        ToolName::Imaging
    }

    async fn invoke(&self, input: ToolInput) -> Result<Observation> {
        let patient_id = expect_patient(input, self.name())?;
        let path = self.dir.join(format!("{patient_id}_imaging.json"));
        let report: ImagingReport = read_json(&path, "imaging report").await?;
        Ok(Observation::Imaging(report))
    }
}

// ---------------------------------------------------------------------------
// Interaction matrix
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct DdiMatrix {
    #[serde(default)]
    pairs: Vec<MatrixPair>,
}

#[derive(Debug, Deserialize)]
struct MatrixPair {
    a: String,
    b: String,
    #[serde(flatten)]
    rest: Interaction0,
}

#[derive(Debug, Deserialize)]
struct Interaction0 {
    severity: meditriage_common::InteractionSeverity,
    description: String,
    #[serde(default)]
    recommendation: Option<String>,
}

pub struct FileDdiTool {
    dir: PathBuf,
}

#[async_trait]
impl Tool for FileDdiTool {
    fn name(&self) -> ToolName {
        ToolName::Ddi
    }

    async fn invoke(&self, input: ToolInput) -> Result<Observation> {
        let medications: Vec<Medication> = match input {
            ToolInput::Medications(meds) => meds,
            other => {
                return Err(MeditriageError::Tool(format!(
                    "tool 'ddi' expects a medication list, got {other:?}"
                )))
            }
        };

        let path = self.dir.join("ddi_matrix.json");
        let matrix: DdiMatrix = read_json(&path, "DDI matrix").await?;

        let names: Vec<String> = medications
            .iter()
            .map(|m| m.name.to_lowercase())
            .collect();
        let hits = matrix
            .pairs
            .into_iter()
            .filter(|p| {
                names.contains(&p.a.to_lowercase()) && names.contains(&p.b.to_lowercase())
            })
            .map(|p| Interaction {
                drug_a: p.a,
                drug_b: p.b,
                severity: p.rest.severity,
                description: p.rest.description,
                recommendation: p.rest.recommendation,
            })
            .collect();
        Ok(Observation::Interactions(hits))
    }
}

// ---------------------------------------------------------------------------
// Guideline search
// ---------------------------------------------------------------------------

pub struct FileGuidelinesTool {
    dir: PathBuf,
}

#[async_trait]
impl Tool for FileGuidelinesTool {
    fn name(&self) -> ToolName {
        ToolName::Guidelines
    }

    async fn invoke(&self, input: ToolInput) -> Result<Observation> {
        let keyword = match input {
            ToolInput::Keyword(k) => k.to_lowercase(),
            other => {
                return Err(MeditriageError::Tool(format!(
                    "tool 'guidelines' expects a keyword, got {other:?}"
                )))
            }
        };

        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(MeditriageError::DataUnavailable(format!(
                    "guidelines directory not found at {}",
                    self.dir.display()
                )))
            }
            Err(e) => return Err(MeditriageError::Io(e)),
        };

        let mut hits = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("txt") {
                continue;
            }
            let text = match tokio::fs::read_to_string(&path).await {
                Ok(text) => text,
                Err(e) => {
                    // One unreadable guideline must not end the search.
                    warn!(path = %path.display(), error = %e, "skipping unreadable guideline");
                    continue;
                }
            };
            if !text.to_lowercase().contains(&keyword) {
                continue;
            }
            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("guideline");
            hits.push(GuidelineHit {
                title: stem.replace('_', " "),
                snippet: snippet_of(&text),
                source: path.display().to_string(),
            });
        }
        hits.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(Observation::Guidelines(hits))
    }
}

fn snippet_of(text: &str) -> String {
    if text.chars().count() > SNIPPET_LEN {
        let head: String = text.chars().take(SNIPPET_LEN).collect();
        format!("{head}...")
    } else {
        text.to_string()
    }
}

/// Register the full file-backed toolset against one data tree.
pub fn register_file_tools(registry: &mut ToolRegistry, dirs: &DataDirs) {
    registry.register(Arc::new(FileEhrTool { dir: dirs.ehr() }));
    registry.register(Arc::new(FileLabsTool { dir: dirs.labs() }));
    registry.register(Arc::new(FileMedsTool { dir: dirs.meds() }));
    registry.register(Arc::new(FileImagingTool { dir: dirs.imaging() }));
    registry.register(Arc::new(FileDdiTool { dir: dirs.drugs() }));
    registry.register(Arc::new(FileGuidelinesTool {
        dir: dirs.guidelines(),
    }));
}
