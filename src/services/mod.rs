//! Services layer for the learning engine
//!
//! The only external capability the engine consumes is statement
//! extraction: given what a contractor changed in a quote, propose pricing
//! rules worth remembering.

pub mod llm;

pub use llm::{LlmConfig, LlmExtractionService};

use crate::error::Result;
use crate::quote::QuoteDiff;
use crate::types::{ContractorId, JobCategory};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A candidate that failed quality scoring on an earlier attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectionFeedback {
    pub statement: String,
    pub score: u32,
    pub issues: Vec<String>,
}

/// Everything the extraction service sees for one correction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionRequest {
    pub contractor_id: ContractorId,
    pub category: JobCategory,
    pub diff: QuoteDiff,
    pub job_description: Option<String>,
    pub contractor_notes: Option<String>,

    /// Statements already learned for the category
    pub existing_statements: Vec<String>,

    /// Category-level guidance
    pub tailored_guidance: Option<String>,

    /// Contractor-wide philosophy
    pub philosophy: Option<String>,

    /// Populated on retry attempts
    pub rejection_feedback: Vec<RejectionFeedback>,

    /// 1-based
    pub attempt: u32,
}

/// Extracts candidate learning statements from a quote correction
#[async_trait]
pub trait ExtractionService: Send + Sync {
    async fn extract(&self, request: &ExtractionRequest) -> Result<Vec<String>>;
}
