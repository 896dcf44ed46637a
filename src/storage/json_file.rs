//! JSON file knowledge backend
//!
//! One `<contractor>.json` file per contractor under a data directory.
//! Writes go to a temporary file that is renamed over the target.

use super::KnowledgeBackend;
use crate::error::{QuotewiseError, Result};
use crate::types::{ContractorId, KnowledgeDocument};
use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    root: PathBuf,
}

impl JsonFileBackend {
    /// Create the backend, creating `root` if needed
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await.map_err(|e| {
            QuotewiseError::Storage(format!("Cannot create {}: {}", root.display(), e))
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, contractor: &ContractorId) -> PathBuf {
        self.root.join(format!("{}.json", file_stem(contractor)))
    }
}

/// Bytes kept as-is in a file stem; everything else, `%` included, is escaped
const STEM_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_');

/// File-system safe stem for a contractor id, distinct for distinct ids
fn file_stem(contractor: &ContractorId) -> String {
    utf8_percent_encode(contractor.as_str(), STEM_ESCAPE).to_string()
}

#[async_trait]
impl KnowledgeBackend for JsonFileBackend {
    async fn load(&self, contractor: &ContractorId) -> Result<Option<KnowledgeDocument>> {
        let path = self.path_for(contractor);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let document = serde_json::from_slice(&bytes).map_err(|e| {
            QuotewiseError::Storage(format!("Corrupt document {}: {}", path.display(), e))
        })?;
        debug!("Loaded knowledge document from {}", path.display());
        Ok(Some(document))
    }

    async fn save(&self, document: &KnowledgeDocument) -> Result<()> {
        let path = self.path_for(&document.contractor_id);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_vec_pretty(document)?;

        tokio::fs::write(&tmp, &json).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!(
            contractor = %document.contractor_id,
            bytes = json.len(),
            "Saved knowledge document"
        );
        Ok(())
    }

    async fn list_contractors(&self) -> Result<Vec<ContractorId>> {
        let mut ids = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            // Read the id from the document rather than decoding the stem
            match tokio::fs::read(&path).await {
                Ok(bytes) => match serde_json::from_slice::<KnowledgeDocument>(&bytes) {
                    Ok(doc) => ids.push(doc.contractor_id),
                    Err(e) => warn!("Skipping unreadable document {}: {}", path.display(), e),
                },
                Err(e) => warn!("Skipping {}: {}", path.display(), e),
            }
        }
        ids.sort();
        Ok(ids)
    }
}
