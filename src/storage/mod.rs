//! Storage layer for contractor knowledge
//!
//! Persists one [`KnowledgeDocument`] per contractor. Backends only load and
//! save whole documents; [`KnowledgeStore`] owns the in-memory aggregates and
//! serializes mutation per contractor+category and per contractor DNA.

pub mod json_file;
pub mod memory;
pub mod store;

use crate::error::Result;
use crate::types::{ContractorId, KnowledgeDocument};
use async_trait::async_trait;

pub use json_file::JsonFileBackend;
pub use memory::InMemoryBackend;
pub use store::{ActivityGuard, ExclusiveGuard, KnowledgeStore};

/// Persistence backend for knowledge documents
#[async_trait]
pub trait KnowledgeBackend: Send + Sync {
    /// Load a contractor's document, `None` if it was never saved
    async fn load(&self, contractor: &ContractorId) -> Result<Option<KnowledgeDocument>>;

    /// Replace the stored document
    async fn save(&self, document: &KnowledgeDocument) -> Result<()>;

    /// Every contractor with a stored document
    async fn list_contractors(&self) -> Result<Vec<ContractorId>>;
}
