//! Engine configuration. Keyword tables and routing thresholds are data,
//! not code, so a deployment can retune them from TOML without a rebuild.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use meditriage_narrator::HttpNarratorConfig;
use meditriage_tools::SelectorConfig;

/// Routing vocabulary and thresholds. The default thresholds are the
/// reference values; they were deliberately set low upstream and are
/// expected to be tuned per deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    pub complex_keywords: Vec<String>,
    pub critical_keywords: Vec<String>,
    pub high_risk_conditions: Vec<String>,
    /// Risk score at or above which a case is critical.
    pub critical_risk_threshold: u32,
    /// Total score at or above which a case is critical.
    pub critical_total_threshold: u32,
    /// Complexity score at or above which a case is complex.
    pub complex_complexity_threshold: u32,
    /// Total score at or above which a case is complex.
    pub complex_total_threshold: u32,
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            complex_keywords: words(&[
                "unclear",
                "uncertain",
                "confused",
                "multiple",
                "several",
                "worsening",
                "progressive",
                "new onset",
                "change in",
            ]),
            critical_keywords: words(&[
                "chest pain",
                "difficulty breathing",
                "severe",
                "acute",
                "sudden",
                "unconscious",
                "bleeding",
                "seizure",
                "stroke",
                "mi",
                "heart attack",
                "anaphylaxis",
                "shock",
            ]),
            high_risk_conditions: words(&[
                "ckd",
                "kidney",
                "dialysis",
                "transplant",
                "immunosuppressed",
                "chemotherapy",
                "heart failure",
                "liver failure",
            ]),
            critical_risk_threshold: 2,
            critical_total_threshold: 3,
            complex_complexity_threshold: 2,
            complex_total_threshold: 3,
        }
    }
}

/// Where the narrative endpoint lives. Absent means template-only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NarratorConfig {
    pub http: Option<HttpNarratorConfig>,
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub data_dir: PathBuf,
    pub router: RouterConfig,
    pub selector: SelectorConfig,
    pub narrator: NarratorConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            router: RouterConfig::default(),
            selector: SelectorConfig::default(),
            narrator: NarratorConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config '{}': {e}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("invalid config '{}': {e}", path.display()))?;
        Ok(config)
    }
}
