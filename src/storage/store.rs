//! Knowledge store: owned per-contractor aggregates with atomic updates
//!
//! Each loaded contractor gets a slot holding its category records, DNA and
//! philosophy. Category records sit behind their own mutex, so updates to the
//! same (contractor, category) key are serialized while different categories
//! proceed independently. DNA has a single mutex per contractor.
//!
//! Every slot also carries an activity lock: live event processing holds the
//! shared side, the DNA backfill migration takes the exclusive side.
//!
//! Saves are write-behind: a failed save is logged and the change stays in
//! memory, to be written by the next successful save for that contractor.

use super::{InMemoryBackend, KnowledgeBackend};
use crate::calibration::ConfidenceCalibrator;
use crate::config::LearningConfig;
use crate::dna::ContractorDna;
use crate::error::{QuotewiseError, Result};
use crate::types::{CategoryKnowledge, ContractorId, JobCategory, KnowledgeDocument};
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use tracing::{debug, info, warn};

/// Shared side of a contractor's activity lock
pub type ActivityGuard = OwnedRwLockReadGuard<()>;

/// Exclusive side of a contractor's activity lock
pub type ExclusiveGuard = OwnedRwLockWriteGuard<()>;

struct ContractorSlot {
    id: ContractorId,
    categories: RwLock<BTreeMap<JobCategory, Arc<Mutex<CategoryKnowledge>>>>,
    dna: Mutex<Option<ContractorDna>>,
    philosophy: Mutex<Option<String>>,
    persist: Mutex<()>,
    activity: Arc<RwLock<()>>,
}

impl ContractorSlot {
    fn from_document(document: KnowledgeDocument) -> Self {
        let categories = document
            .categories
            .into_iter()
            .map(|(key, record)| (key, Arc::new(Mutex::new(record))))
            .collect();
        Self {
            id: document.contractor_id,
            categories: RwLock::new(categories),
            dna: Mutex::new(document.dna),
            philosophy: Mutex::new(document.philosophy),
            persist: Mutex::new(()),
            activity: Arc::new(RwLock::new(())),
        }
    }

    async fn snapshot(&self) -> KnowledgeDocument {
        let handles: Vec<(JobCategory, Arc<Mutex<CategoryKnowledge>>)> = self
            .categories
            .read()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), Arc::clone(v)))
            .collect();

        let mut document = KnowledgeDocument::new(self.id.clone());
        for (key, handle) in handles {
            let record = handle.lock().await.clone();
            document.categories.insert(key, record);
        }
        document.dna = self.dna.lock().await.clone();
        document.philosophy = self.philosophy.lock().await.clone();
        document.updated_at = Utc::now();
        document
    }
}

/// Owns every loaded contractor aggregate
pub struct KnowledgeStore {
    backend: Arc<dyn KnowledgeBackend>,
    config: Arc<LearningConfig>,
    calibrator: ConfidenceCalibrator,
    /// Slots load outside the map lock; the cell serializes loads per contractor
    slots: Mutex<HashMap<ContractorId, Arc<OnceCell<Arc<ContractorSlot>>>>>,
}

impl KnowledgeStore {
    pub fn new(backend: Arc<dyn KnowledgeBackend>, config: Arc<LearningConfig>) -> Self {
        Self {
            backend,
            calibrator: ConfidenceCalibrator::new(config.confidence.clone()),
            config,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Store backed by [`InMemoryBackend`]
    pub fn in_memory(config: Arc<LearningConfig>) -> Self {
        Self::new(Arc::new(InMemoryBackend::new()), config)
    }

    pub fn config(&self) -> &LearningConfig {
        &self.config
    }

    pub fn backend(&self) -> Arc<dyn KnowledgeBackend> {
        Arc::clone(&self.backend)
    }

    async fn slot(&self, contractor: &ContractorId) -> Result<Arc<ContractorSlot>> {
        let cell = {
            let mut slots = self.slots.lock().await;
            Arc::clone(slots.entry(contractor.clone()).or_default())
        };
        let slot = cell.get_or_try_init(|| self.load_slot(contractor)).await?;
        Ok(Arc::clone(slot))
    }

    async fn load_slot(&self, contractor: &ContractorId) -> Result<Arc<ContractorSlot>> {
        let document = match self.backend.load(contractor).await? {
            Some(mut document) => {
                let repairs = document.normalize(&self.config);
                if document.contractor_id.as_str().is_empty() {
                    document.contractor_id = contractor.clone();
                } else if document.contractor_id != *contractor {
                    return Err(QuotewiseError::Storage(format!(
                        "Document loaded for {} belongs to {}",
                        contractor, document.contractor_id
                    )));
                }
                let recalibrated = self.fill_dimension_caches(&mut document);
                if repairs > 0 || recalibrated > 0 {
                    info!(
                        contractor = %contractor,
                        repairs,
                        recalibrated,
                        "Normalized knowledge document on load"
                    );
                }
                document
            }
            None => {
                debug!(contractor = %contractor, "No stored knowledge, starting empty");
                KnowledgeDocument::new(contractor.clone())
            }
        };

        Ok(Arc::new(ContractorSlot::from_document(document)))
    }

    /// Records written before dimension caching get them computed now
    fn fill_dimension_caches(&self, document: &mut KnowledgeDocument) -> usize {
        let now = Utc::now();
        let mut count = 0;
        for record in document.categories.values_mut() {
            let has_history = record.quote_count > 0 || record.total_signals() > 0;
            if record.confidence_dimensions.computed_at.is_none() && has_history {
                record.confidence_dimensions = self.calibrator.calibrate(record, now).dimensions;
                count += 1;
            }
        }
        count
    }

    async fn category_handle(
        &self,
        slot: &ContractorSlot,
        category: &JobCategory,
    ) -> Arc<Mutex<CategoryKnowledge>> {
        if let Some(handle) = slot.categories.read().await.get(category) {
            return Arc::clone(handle);
        }
        let mut categories = slot.categories.write().await;
        Arc::clone(categories.entry(category.clone()).or_insert_with(|| {
            debug!(contractor = %slot.id, category = %category, "Initializing category record");
            Arc::new(Mutex::new(CategoryKnowledge::new(
                category.clone(),
                self.config.confidence.seed,
            )))
        }))
    }

    /// Save the slot, logging rather than returning a failure
    async fn persist(&self, slot: &ContractorSlot) {
        let _persist = slot.persist.lock().await;
        let document = slot.snapshot().await;
        if let Err(e) = self.backend.save(&document).await {
            warn!(
                contractor = %slot.id,
                "Failed to persist knowledge, keeping change in memory: {}",
                e
            );
        }
    }

    /// Current record for a category, initialized with defaults if absent
    pub async fn get_category(
        &self,
        contractor: &ContractorId,
        category: &JobCategory,
    ) -> Result<CategoryKnowledge> {
        let slot = self.slot(contractor).await?;
        let handle = self.category_handle(&slot, category).await;
        let record = handle.lock().await.clone();
        Ok(record)
    }

    /// Apply `mutator` to a category record atomically and persist the result
    ///
    /// Returns `Err` only when the contractor cannot be loaded. Once the
    /// mutator has run the change is applied, even if saving it failed.
    pub async fn update_category<F, R>(
        &self,
        contractor: &ContractorId,
        category: &JobCategory,
        mutator: F,
    ) -> Result<R>
    where
        F: FnOnce(&mut CategoryKnowledge) -> R + Send,
        R: Send,
    {
        let slot = self.slot(contractor).await?;
        let handle = self.category_handle(&slot, category).await;
        let result = {
            let mut record = handle.lock().await;
            let result = mutator(&mut record);
            record.last_updated = Utc::now();
            result
        };
        self.persist(&slot).await;
        Ok(result)
    }

    /// Snapshot of every category record for a contractor
    pub async fn categories(&self, contractor: &ContractorId) -> Result<Vec<CategoryKnowledge>> {
        let slot = self.slot(contractor).await?;
        Ok(slot.snapshot().await.categories.into_values().collect())
    }

    /// DNA profile, or an empty profile if none was created yet
    pub async fn get_dna(&self, contractor: &ContractorId) -> Result<ContractorDna> {
        let slot = self.slot(contractor).await?;
        let dna = slot.dna.lock().await;
        Ok(dna.clone().unwrap_or_default())
    }

    pub async fn has_dna(&self, contractor: &ContractorId) -> Result<bool> {
        let slot = self.slot(contractor).await?;
        let has = slot.dna.lock().await.is_some();
        Ok(has)
    }

    /// Apply `mutator` to the DNA profile atomically, creating it if needed
    pub async fn update_dna<F, R>(&self, contractor: &ContractorId, mutator: F) -> Result<R>
    where
        F: FnOnce(&mut ContractorDna) -> R + Send,
        R: Send,
    {
        let slot = self.slot(contractor).await?;
        let result = {
            let mut dna = slot.dna.lock().await;
            let profile = dna.get_or_insert_with(|| {
                info!(contractor = %contractor, "Creating contractor DNA profile");
                ContractorDna::new()
            });
            mutator(profile)
        };
        self.persist(&slot).await;
        Ok(result)
    }

    /// Set or clear category-level tailored guidance
    pub async fn set_guidance(
        &self,
        contractor: &ContractorId,
        category: &JobCategory,
        guidance: Option<String>,
    ) -> Result<()> {
        let guidance = guidance.map(|g| g.trim().to_string()).filter(|g| !g.is_empty());
        self.update_category(contractor, category, move |record| {
            record.tailored_guidance = guidance;
        })
        .await
    }

    pub async fn philosophy(&self, contractor: &ContractorId) -> Result<Option<String>> {
        let slot = self.slot(contractor).await?;
        let philosophy = slot.philosophy.lock().await.clone();
        Ok(philosophy)
    }

    /// Set or clear the contractor-wide pricing philosophy
    pub async fn set_philosophy(
        &self,
        contractor: &ContractorId,
        philosophy: Option<String>,
    ) -> Result<()> {
        let slot = self.slot(contractor).await?;
        *slot.philosophy.lock().await =
            philosophy.map(|p| p.trim().to_string()).filter(|p| !p.is_empty());
        self.persist(&slot).await;
        Ok(())
    }

    /// Consistent copy of the whole aggregate
    pub async fn document(&self, contractor: &ContractorId) -> Result<KnowledgeDocument> {
        let slot = self.slot(contractor).await?;
        Ok(slot.snapshot().await)
    }

    /// Contractors known to the backend or loaded in memory
    pub async fn list_contractors(&self) -> Result<Vec<ContractorId>> {
        let mut ids: BTreeSet<ContractorId> =
            self.backend.list_contractors().await?.into_iter().collect();
        ids.extend(
            self.slots
                .lock()
                .await
                .iter()
                .filter(|(_, cell)| cell.initialized())
                .map(|(id, _)| id.clone()),
        );
        Ok(ids.into_iter().collect())
    }

    /// Shared activity guard held while processing live events
    pub async fn activity(&self, contractor: &ContractorId) -> Result<ActivityGuard> {
        let slot = self.slot(contractor).await?;
        Ok(Arc::clone(&slot.activity).read_owned().await)
    }

    /// Exclusive guard that waits out and blocks live processing
    pub async fn exclusive(&self, contractor: &ContractorId) -> Result<ExclusiveGuard> {
        let slot = self.slot(contractor).await?;
        Ok(Arc::clone(&slot.activity).write_owned().await)
    }
}
