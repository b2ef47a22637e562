use std::path::PathBuf;
use thiserror::Error;

/// Failures reported by a transcript source for a single item.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("No {language} transcript available for {item_id}")]
    NotAvailable { item_id: String, language: String },

    #[error("Transcripts are disabled for {item_id}")]
    Disabled { item_id: String },

    #[error("Fetching {language} transcript for {item_id} failed: {reason}")]
    Failed {
        item_id: String,
        language: String,
        reason: String,
    },
}

impl SourceError {
    /// Expected conditions: the item simply has no usable track and stays eligible for later runs.
    pub fn is_not_available(&self) -> bool {
        matches!(
            self,
            SourceError::NotAvailable { .. } | SourceError::Disabled { .. }
        )
    }
}

#[derive(Error, Debug)]
pub enum HarvestError {
    #[error("Failed to persist {path}: {reason}")]
    Persistence { path: PathBuf, reason: String },

    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    #[error("Could not extract a video id from {url}")]
    InvalidUrl { url: String },

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl HarvestError {
    pub(crate) fn persistence(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        HarvestError::Persistence {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, HarvestError>;
