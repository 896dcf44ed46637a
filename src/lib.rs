//! Quotewise - per-contractor pricing knowledge engine
//!
//! Learns how each contractor prices work by watching what happens to the
//! quotes generated for them:
//! - Edits teach quality-scored pricing statements for the job category
//! - Unedited sends and customer acceptances reinforce category confidence
//! - Transferable rules accumulate in a contractor-wide DNA profile that
//!   bootstraps categories the contractor has never quoted
//!
//! # Architecture
//!
//! - **Types**: Knowledge documents, categories, statements, quotes, events
//! - **Storage**: Per-contractor knowledge store over a pluggable backend
//! - **Services**: Statement extraction (LLM-backed)
//! - **Processors**: Correction and acceptance learning pathways
//! - **Transfer**: Pattern classification, DNA merge, override detection
//! - **Relevance**: Statement selection for quote generation
//!
//! # Example
//!
//! ```ignore
//! use quotewise_core::{LearningConfig, LearningEngine, JsonFileBackend, LlmExtractionService};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let backend = Arc::new(JsonFileBackend::new("./knowledge").await?);
//!     let extractor = Arc::new(LlmExtractionService::with_default()?);
//!     let engine = Arc::new(LearningEngine::new(backend, extractor, LearningConfig::default()));
//!
//!     // Fire-and-forget from the quote workflow
//!     engine.submit(event);
//!
//!     // Later, when generating a quote
//!     let context = engine
//!         .build_context(&contractor, &JobCategory::new("deck"), "12x16 composite deck")
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

pub mod calibration;
pub mod config;
pub mod dashboard;
pub mod dna;
pub mod engine;
pub mod error;
pub mod events;
pub mod migration;
pub mod processors;
pub mod quality;
pub mod quote;
pub mod relevance;
pub mod services;
pub mod storage;
pub mod text;
pub mod transfer;
pub mod types;

// Re-export commonly used types
pub use calibration::{CalibrationReport, CalibrationWarning, ConfidenceCalibrator};
pub use config::{ConfigError, LearningConfig};
pub use dashboard::{ConfidenceDashboard, DashboardReport};
pub use dna::{ContractorDna, PatternType, PricingStyle, TransferablePattern, Transferability};
pub use engine::{LearningEngine, LearningOutcome};
pub use error::{QuotewiseError, Result};
pub use events::{LifecycleTransition, QuoteLifecycleEvent};
pub use migration::{DnaMigration, MigrationResult};
pub use processors::{
    AcceptanceInput, AcceptanceOutcome, AcceptanceProcessor, CorrectionInput, CorrectionOutcome,
    CorrectionProcessor, CorrectionReport,
};
pub use quality::{QualityScore, QualityScorer, QualityTier};
pub use quote::{LineItem, Quote, QuoteDiff};
pub use relevance::{GenerationContext, RelevanceScorer, RelevanceSelector, ScoredStatement};
pub use services::{ExtractionRequest, ExtractionService, LlmConfig, LlmExtractionService};
pub use storage::{InMemoryBackend, JsonFileBackend, KnowledgeBackend, KnowledgeStore};
pub use transfer::{PatternTransferEngine, TransferReport};
pub use types::{
    CategoryKnowledge, Complexity, ConfidenceDimensions, ConfidenceTier, ContractorId, JobCategory,
    KnowledgeDocument, LearningStatement, SignalType,
};
