//! Error types for meditriage.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MeditriageError {
    /// Requested data does not exist (e.g. no record for a patient id).
    #[error("Data unavailable: {0}")]
    DataUnavailable(String),

    /// Data exists but could not be parsed.
    #[error("Malformed data: {0}")]
    MalformedData(String),

    #[error("Tool error: {0}")]
    Tool(String),

    #[error("Selection error: {0}")]
    Selection(String),

    /// Narrative synthesis failed (endpoint down, empty response, ...).
    #[error("Synthesis error: {0}")]
    Synthesis(String),

    #[error("Safety phase error: {0}")]
    Phase(String),

    #[error("Routing error: {0}")]
    Routing(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl MeditriageError {
    /// Whether the error means "nothing there" rather than "something broke".
    pub fn is_not_found(&self) -> bool {
        matches!(self, MeditriageError::DataUnavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, MeditriageError>;
