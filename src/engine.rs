//! Learning engine facade
//!
//! Routes quote lifecycle events to the right learning pathway and exposes
//! the read side (generation context, dashboard). Event processing never
//! fails: every internal error becomes [`LearningOutcome::Skipped`] so the
//! quote workflow that produced the event is never affected.

use crate::config::LearningConfig;
use crate::dashboard::{ConfidenceDashboard, DashboardReport};
use crate::error::Result;
use crate::events::{LifecycleTransition, QuoteLifecycleEvent};
use crate::migration::DnaMigration;
use crate::processors::{
    AcceptanceInput, AcceptanceOutcome, AcceptanceProcessor, CorrectionInput, CorrectionOutcome,
    CorrectionProcessor,
};
use crate::relevance::{GenerationContext, RelevanceSelector};
use crate::services::ExtractionService;
use crate::storage::{KnowledgeBackend, KnowledgeStore};
use crate::transfer::PatternTransferEngine;
use crate::types::{ContractorId, JobCategory, SignalType};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// What processing one event did
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LearningOutcome {
    /// A generated quote was counted
    QuoteRecorded { quote_count: u64 },
    Correction { outcome: CorrectionOutcome },
    Acceptance { outcome: AcceptanceOutcome },
    /// Nothing was learned; the reason was logged
    Skipped { reason: String },
}

pub struct LearningEngine {
    store: Arc<KnowledgeStore>,
    correction: CorrectionProcessor,
    acceptance: AcceptanceProcessor,
    selector: RelevanceSelector,
    dashboard: ConfidenceDashboard,
    migration: Arc<DnaMigration>,
}

impl LearningEngine {
    pub fn new(
        backend: Arc<dyn KnowledgeBackend>,
        extractor: Arc<dyn ExtractionService>,
        config: LearningConfig,
    ) -> Self {
        let config = Arc::new(config);
        let store = Arc::new(KnowledgeStore::new(backend, config.clone()));
        let transfer = Arc::new(PatternTransferEngine::new(store.clone(), config.clone()));

        Self {
            correction: CorrectionProcessor::new(
                store.clone(),
                extractor,
                transfer.clone(),
                config.clone(),
            ),
            acceptance: AcceptanceProcessor::new(store.clone(), config.clone()),
            selector: RelevanceSelector::new(store.clone(), config.clone()),
            dashboard: ConfidenceDashboard::new(store.clone(), &config),
            migration: Arc::new(DnaMigration::new(store.clone(), transfer)),
            store,
        }
    }

    pub fn store(&self) -> &Arc<KnowledgeStore> {
        &self.store
    }

    pub fn migration(&self) -> &Arc<DnaMigration> {
        &self.migration
    }

    /// Process one lifecycle event; never returns an error
    pub async fn process(&self, event: QuoteLifecycleEvent) -> LearningOutcome {
        let contractor = event.contractor_id.clone();
        let transition = event.transition;
        match self.try_process(event).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(
                    contractor = %contractor,
                    %transition,
                    "Learning skipped after error: {}",
                    e
                );
                LearningOutcome::Skipped {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Process in the background so the caller's action never waits on learning
    pub fn submit(self: &Arc<Self>, event: QuoteLifecycleEvent) -> JoinHandle<LearningOutcome> {
        let engine = Arc::clone(self);
        tokio::spawn(async move { engine.process(event).await })
    }

    async fn try_process(&self, event: QuoteLifecycleEvent) -> Result<LearningOutcome> {
        let _activity = self.store.activity(&event.contractor_id).await?;

        match event.transition {
            LifecycleTransition::Generated => {
                let Some(category) = event.category() else {
                    return Ok(skipped(&event, "generated quote has no job category"));
                };
                let complexity = event.complexity();
                let at = event.occurred_at;
                let quote_count = self
                    .store
                    .update_category(&event.contractor_id, &category, |record| {
                        record.record_quote(complexity, at);
                        record.quote_count
                    })
                    .await?;
                debug!(contractor = %event.contractor_id, category = %category, quote_count, "Quote recorded");
                Ok(LearningOutcome::QuoteRecorded { quote_count })
            }
            LifecycleTransition::Edited => {
                let Some(category) = event.category() else {
                    return Ok(skipped(&event, "edited quote has no job category"));
                };
                let edited = event.final_quote().clone();
                let outcome = self
                    .correction
                    .process(CorrectionInput {
                        contractor_id: event.contractor_id,
                        category,
                        original: event.original_quote,
                        edited,
                        notes: event.contractor_notes,
                        job_description: event.job_description,
                        occurred_at: event.occurred_at,
                    })
                    .await?;
                Ok(LearningOutcome::Correction { outcome })
            }
            LifecycleTransition::Sent | LifecycleTransition::CustomerAccepted => {
                let signal = if event.transition == LifecycleTransition::Sent {
                    SignalType::Sent
                } else {
                    SignalType::CustomerAccepted
                };
                let outcome = self
                    .acceptance
                    .process(AcceptanceInput {
                        category: event.category(),
                        was_edited: event.was_edited,
                        total: event.final_total(),
                        signal,
                        occurred_at: event.occurred_at,
                        contractor_id: event.contractor_id,
                        quote_id: Some(event.quote_id),
                    })
                    .await?;
                Ok(LearningOutcome::Acceptance { outcome })
            }
        }
    }

    /// Knowledge for generating a quote in `category`
    pub async fn build_context(
        &self,
        contractor: &ContractorId,
        category: &JobCategory,
        job_description: &str,
    ) -> Result<GenerationContext> {
        self.selector
            .build_context(contractor, category, job_description)
            .await
    }

    pub async fn dashboard(&self, contractor: &ContractorId) -> Result<DashboardReport> {
        self.dashboard.get(contractor).await
    }
}

fn skipped(event: &QuoteLifecycleEvent, reason: &str) -> LearningOutcome {
    debug!(contractor = %event.contractor_id, quote = %event.quote_id, "{}", reason);
    LearningOutcome::Skipped {
        reason: reason.to_string(),
    }
}
