//! One-time DNA backfill from existing category knowledge
//!
//! Each contractor is migrated under the exclusive side of its activity
//! lock, so live event processing for that contractor waits until the
//! backfill finishes. Different contractors run in parallel.

use crate::error::Result;
use crate::storage::KnowledgeStore;
use crate::transfer::{PatternTransferEngine, TransferReport};
use crate::types::ContractorId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info};

/// Per-contractor migration result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationResult {
    pub contractor_id: ContractorId,
    pub report: Option<TransferReport>,
    pub error: Option<String>,
}

pub struct DnaMigration {
    store: Arc<KnowledgeStore>,
    transfer: Arc<PatternTransferEngine>,
}

impl DnaMigration {
    pub fn new(store: Arc<KnowledgeStore>, transfer: Arc<PatternTransferEngine>) -> Self {
        Self { store, transfer }
    }

    /// Backfill one contractor; safe to re-run
    pub async fn backfill_dna(&self, contractor: &ContractorId) -> Result<TransferReport> {
        let _exclusive = self.store.exclusive(contractor).await?;
        let report = self.transfer.backfill(contractor).await?;
        info!(
            contractor = %contractor,
            inserted = report.inserted,
            overridden = report.overridden,
            evicted = report.evicted,
            "DNA backfill complete"
        );
        Ok(report)
    }

    /// Backfill every stored contractor, in parallel
    pub async fn backfill_all(self: &Arc<Self>) -> Result<Vec<MigrationResult>> {
        let contractors = self.store.list_contractors().await?;
        info!(contractors = contractors.len(), "Starting DNA backfill");

        let mut tasks = JoinSet::new();
        for contractor in contractors {
            let migration = Arc::clone(self);
            tasks.spawn(async move {
                let outcome = migration.backfill_dna(&contractor).await;
                (contractor, outcome)
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((contractor_id, Ok(report))) => results.push(MigrationResult {
                    contractor_id,
                    report: Some(report),
                    error: None,
                }),
                Ok((contractor_id, Err(e))) => {
                    error!(contractor = %contractor_id, "DNA backfill failed: {}", e);
                    results.push(MigrationResult {
                        contractor_id,
                        report: None,
                        error: Some(e.to_string()),
                    });
                }
                Err(e) => error!("Backfill task panicked: {}", e),
            }
        }
        results.sort_by(|a, b| a.contractor_id.cmp(&b.contractor_id));
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LearningConfig;
    use crate::types::{JobCategory, LearningStatement};

    async fn seeded() -> (Arc<KnowledgeStore>, Arc<DnaMigration>) {
        let config = Arc::new(LearningConfig::default());
        let store = Arc::new(KnowledgeStore::in_memory(config.clone()));
        for (contractor, category, text) in [
            ("a", "deck", "Add 15% for second story access"),
            ("b", "fence", "Give repeat customers a 5% discount"),
            ("c", "roofing", "Charge $450 per square for architectural shingles"),
        ] {
            let category = JobCategory::new(category);
            let statement = LearningStatement::new(text, 85, category.clone());
            store
                .update_category(&ContractorId::new(contractor), &category, |r| {
                    r.learned_statements.push(statement)
                })
                .await
                .unwrap();
        }
        let transfer = Arc::new(PatternTransferEngine::new(store.clone(), config));
        (store.clone(), Arc::new(DnaMigration::new(store, transfer)))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_backfill_all_contractors() {
        let (store, migration) = seeded().await;
        let results = migration.backfill_all().await.unwrap();

        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.error.is_none()));
        assert_eq!(store.get_dna(&ContractorId::new("a")).await.unwrap().pattern_count(), 1);
        assert_eq!(store.get_dna(&ContractorId::new("b")).await.unwrap().pattern_count(), 1);
        // Unit cost only; classified but not persisted
        assert_eq!(store.get_dna(&ContractorId::new("c")).await.unwrap().pattern_count(), 0);
    }

    #[tokio::test]
    async fn test_rerun_is_idempotent() {
        let (store, migration) = seeded().await;
        let id = ContractorId::new("a");
        migration.backfill_dna(&id).await.unwrap();
        let first = store.get_dna(&id).await.unwrap();

        let report = migration.backfill_dna(&id).await.unwrap();
        assert_eq!(report.inserted, 0);
        let second = store.get_dna(&id).await.unwrap();
        assert_eq!(first.universal_patterns, second.universal_patterns);
    }
}
