//! Acceptance processing
//!
//! A quote sent or accepted without edits reinforces confidence in the
//! category. This path never adds learned statements. Each quote counts once:
//! a customer acceptance after an unedited send only upgrades the sample.

use crate::calibration::ConfidenceCalibrator;
use crate::config::LearningConfig;
use crate::error::Result;
use crate::storage::KnowledgeStore;
use crate::types::{AcceptedSample, ConfidenceTier, ContractorId, JobCategory, SignalType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct AcceptanceInput {
    pub contractor_id: ContractorId,
    pub quote_id: Option<String>,
    pub category: Option<JobCategory>,
    pub was_edited: bool,
    pub total: f64,
    pub signal: SignalType,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AcceptanceOutcome {
    NotApplicable { reason: String },
    /// The quote was already counted by an earlier signal
    AlreadyCounted { acceptance_count: u64 },
    Reinforced {
        acceptance_count: u64,
        confidence: f64,
        tier: ConfidenceTier,
    },
}

pub struct AcceptanceProcessor {
    store: Arc<KnowledgeStore>,
    calibrator: ConfidenceCalibrator,
    config: Arc<LearningConfig>,
}

impl AcceptanceProcessor {
    pub fn new(store: Arc<KnowledgeStore>, config: Arc<LearningConfig>) -> Self {
        Self {
            store,
            calibrator: ConfidenceCalibrator::new(config.confidence.clone()),
            config,
        }
    }

    pub async fn process(&self, input: AcceptanceInput) -> Result<AcceptanceOutcome> {
        if input.was_edited {
            debug!(contractor = %input.contractor_id, "Edited quote is not an acceptance signal");
            return Ok(AcceptanceOutcome::NotApplicable {
                reason: "quote was edited".to_string(),
            });
        }
        let Some(category) = input.category.filter(|c| !c.is_empty()) else {
            debug!(contractor = %input.contractor_id, "Quote has no job category");
            return Ok(AcceptanceOutcome::NotApplicable {
                reason: "quote has no job category".to_string(),
            });
        };

        let window = self.config.knowledge.accepted_sample_window;
        let quote_window = self.config.knowledge.accepted_quote_window;
        let increment = self.config.confidence.acceptance_increment;
        let signal = input.signal;
        let quote_id = input.quote_id.filter(|id| !id.is_empty());
        let sample = AcceptedSample {
            quote_id: quote_id.clone(),
            amount: input.total,
            signal,
            at: input.occurred_at,
        };

        let update = self
            .store
            .update_category(&input.contractor_id, &category, |record| {
                if let Some(id) = quote_id.as_deref() {
                    if record.has_accepted_quote(id) {
                        if signal == SignalType::CustomerAccepted {
                            for sample in record.accepted_samples.iter_mut() {
                                if sample.quote_id.as_deref() == Some(id) {
                                    sample.signal = SignalType::CustomerAccepted;
                                }
                            }
                        }
                        return Err(record.acceptance_count);
                    }
                }
                if let Some(id) = quote_id.clone() {
                    record.remember_accepted_quote(id, quote_window);
                }
                record.acceptance_count += 1;
                record.push_sample(sample, window);
                let report = self.calibrator.finalize(record, increment, Utc::now());
                Ok((record.acceptance_count, record.confidence, report.dimensions.tier))
            })
            .await?;

        let (acceptance_count, confidence, tier) = match update {
            Ok(counted) => counted,
            Err(acceptance_count) => {
                debug!(
                    contractor = %input.contractor_id,
                    category = %category,
                    quote_id = quote_id.as_deref().unwrap_or_default(),
                    "Quote already counted as an acceptance"
                );
                return Ok(AcceptanceOutcome::AlreadyCounted { acceptance_count });
            }
        };

        info!(
            contractor = %input.contractor_id,
            category = %category,
            acceptance_count,
            confidence,
            "Acceptance reinforced category confidence"
        );

        Ok(AcceptanceOutcome::Reinforced {
            acceptance_count,
            confidence,
            tier,
        })
    }
}
