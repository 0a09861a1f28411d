use thiserror::Error;

/// One sub-query that did not make it into the assembled table
#[derive(Debug, Clone, PartialEq)]
pub struct DroppedPartition {
    /// Position of the sub-query in planning order
    pub sequence: usize,
    /// Human readable description, e.g. `year=2021 regions=0..3001 (12)`
    pub label: String,
    /// Why the partition was dropped
    pub reason: String,
}

impl std::fmt::Display for DroppedPartition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{} {}: {}", self.sequence, self.label, self.reason)
    }
}

/// Errors that can occur when fetching and assembling SSB tables
#[derive(Debug, Error)]
pub enum SsbError {
    /// Table metadata could not be fetched or parsed
    #[error("Metadata fetch failed for table {table_id}: {reason}")]
    MetadataFetch { table_id: String, reason: String },

    /// A classification code list could not be fetched or parsed
    #[error("Classification fetch failed for classification {classification_id}: {reason}")]
    ClassificationFetch {
        classification_id: String,
        reason: String,
    },

    /// A planned sub-query exceeds the row ceiling
    #[error("Sub-query {label} requests {rows} rows, ceiling is {ceiling}")]
    QueryRejected {
        label: String,
        rows: u64,
        ceiling: u64,
    },

    /// One or more sub-queries failed under the abort policy
    #[error("{} partition(s) failed: {}", failed.len(), join_dropped(failed))]
    PartialResult { failed: Vec<DroppedPartition> },

    /// Table shape cannot be partitioned under the row ceiling
    #[error("Unsupported table: {0}")]
    Unsupported(String),

    /// Cube document does not match its declared shape
    #[error("Decode error: {0}")]
    Decode(String),

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// DataFrame construction error
    #[error("Polars error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),

    /// Configuration error (bad env vars, unreadable recipe files, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

fn join_dropped(failed: &[DroppedPartition]) -> String {
    failed
        .iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Type alias for Results using SsbError
pub type Result<T> = std::result::Result<T, SsbError>;
