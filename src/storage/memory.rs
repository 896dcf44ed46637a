//! In-memory knowledge backend
//!
//! Documents are kept as serialized JSON so loads go through the same
//! default-fill path as the file backend.

use super::KnowledgeBackend;
use crate::error::Result;
use crate::types::{ContractorId, KnowledgeDocument};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
pub struct InMemoryBackend {
    documents: RwLock<HashMap<ContractorId, String>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed raw JSON, e.g. a legacy record
    pub async fn insert_raw(&self, contractor: ContractorId, json: impl Into<String>) {
        self.documents.write().await.insert(contractor, json.into());
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }
}

#[async_trait]
impl KnowledgeBackend for InMemoryBackend {
    async fn load(&self, contractor: &ContractorId) -> Result<Option<KnowledgeDocument>> {
        let documents = self.documents.read().await;
        match documents.get(contractor) {
            Some(json) => Ok(Some(serde_json::from_str(json)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, document: &KnowledgeDocument) -> Result<()> {
        let json = serde_json::to_string(document)?;
        self.documents
            .write()
            .await
            .insert(document.contractor_id.clone(), json);
        Ok(())
    }

    async fn list_contractors(&self) -> Result<Vec<ContractorId>> {
        let mut ids: Vec<ContractorId> = self.documents.read().await.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}
