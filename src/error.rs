//! Error taxonomy for the ingestion pipeline.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while fetching, parsing, storing, or querying scan reports.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Failed to fetch source '{locator}' after {attempts} attempt(s): {reason}")]
    Fetch {
        locator: String,
        attempts: u32,
        reason: String,
    },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to decode {}: {reason}", path.display())]
    Decode { path: PathBuf, reason: String },

    #[error("Unsupported query filter: {0}")]
    InvalidFilter(String),

    #[error("Storage operation '{operation}' failed: {reason}")]
    Persistence { operation: String, reason: String },

    #[error("No valid files to scan")]
    EmptySelection,

    #[error("Ingestion run did not complete: {0}")]
    Interrupted(String),
}

impl IngestError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        IngestError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn persistence<E: std::fmt::Display>(operation: &str, err: E) -> Self {
        IngestError::Persistence {
            operation: operation.to_string(),
            reason: err.to_string(),
        }
    }
}
