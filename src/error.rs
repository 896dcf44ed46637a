//! Error types for the Quotewise learning engine
//!
//! This module provides error handling using thiserror for structured error
//! definitions and anyhow for error propagation at the binary edge.
//!
//! Learning failures are never meant to reach the quote workflow; the engine
//! turns them into skipped outcomes. These errors exist for the layers below
//! that boundary (storage, extraction, configuration).

use std::time::Duration;
use thiserror::Error;

/// Main error type for Quotewise operations
#[derive(Error, Debug)]
pub enum QuotewiseError {
    /// The extraction service returned an error
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// The extraction service did not answer in time
    #[error("Extraction timed out after {0:?}")]
    ExtractionTimeout(Duration),

    /// LLM API request failed
    #[error("LLM API error: {0}")]
    LlmApi(String),

    /// Knowledge persistence failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Caller supplied an unusable value
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

/// Result type alias for Quotewise operations
pub type Result<T> = std::result::Result<T, QuotewiseError>;

/// Convert anyhow::Error to QuotewiseError
impl From<anyhow::Error> for QuotewiseError {
    fn from(err: anyhow::Error) -> Self {
        QuotewiseError::Other(err.to_string())
    }
}

impl From<crate::config::ConfigError> for QuotewiseError {
    fn from(err: crate::config::ConfigError) -> Self {
        QuotewiseError::Config(err.to_string())
    }
}

impl QuotewiseError {
    /// Whether retrying the same extraction call could succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            QuotewiseError::ExtractionTimeout(_)
                | QuotewiseError::Http(_)
                | QuotewiseError::LlmApi(_)
                | QuotewiseError::Extraction(_)
        )
    }
}
