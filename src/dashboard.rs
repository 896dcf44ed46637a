//! Read-only confidence reporting per contractor

use crate::calibration::{CalibrationWarning, ConfidenceCalibrator};
use crate::config::LearningConfig;
use crate::dna::PricingStyle;
use crate::error::Result;
use crate::storage::KnowledgeStore;
use crate::types::{ConfidenceDimensions, ContractorId, JobCategory};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Confidence breakdown for one category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryConfidence {
    pub category: JobCategory,
    pub quote_count: u64,
    pub acceptance_count: u64,
    pub correction_count: u64,
    pub statement_count: usize,
    pub confidence: f64,
    pub dimensions: ConfidenceDimensions,
    pub ceiling: f64,
    pub warnings: Vec<CalibrationWarning>,
    pub has_guidance: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DnaSummary {
    pub universal_patterns: usize,
    pub partial_patterns: usize,
    pub overridden_patterns: usize,
    pub pricing_style: PricingStyle,
    pub dna_confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardReport {
    pub contractor_id: ContractorId,
    pub categories: Vec<CategoryConfidence>,
    pub dna: Option<DnaSummary>,
    pub philosophy: Option<String>,
    pub generated_at: DateTime<Utc>,
}

pub struct ConfidenceDashboard {
    store: Arc<KnowledgeStore>,
    calibrator: ConfidenceCalibrator,
}

impl ConfidenceDashboard {
    pub fn new(store: Arc<KnowledgeStore>, config: &LearningConfig) -> Self {
        Self {
            store,
            calibrator: ConfidenceCalibrator::new(config.confidence.clone()),
        }
    }

    /// Recalibrate every category as of now, without writing anything back
    pub async fn get(&self, contractor: &ContractorId) -> Result<DashboardReport> {
        let document = self.store.document(contractor).await?;
        let now = Utc::now();

        let categories = document
            .categories
            .values()
            .map(|record| {
                let report = self.calibrator.calibrate(record, now);
                CategoryConfidence {
                    category: record.category.clone(),
                    quote_count: record.quote_count,
                    acceptance_count: record.acceptance_count,
                    correction_count: record.correction_count,
                    statement_count: record.learned_statements.len(),
                    confidence: record.confidence,
                    dimensions: report.dimensions,
                    ceiling: report.ceiling,
                    warnings: report.warnings,
                    has_guidance: record.tailored_guidance.is_some(),
                }
            })
            .collect();

        let dna = document.dna.as_ref().map(|dna| DnaSummary {
            universal_patterns: dna.universal_patterns.len(),
            partial_patterns: dna.partial_patterns.len(),
            overridden_patterns: dna.patterns().filter(|p| !p.overridden_in.is_empty()).count(),
            pricing_style: dna.pricing_style.clone(),
            dna_confidence: dna.dna_confidence,
        });

        Ok(DashboardReport {
            contractor_id: contractor.clone(),
            categories,
            dna,
            philosophy: document.philosophy,
            generated_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Complexity;

    #[tokio::test]
    async fn test_dashboard_lists_categories_and_does_not_write() {
        let config = Arc::new(LearningConfig::default());
        let store = Arc::new(KnowledgeStore::in_memory(config.clone()));
        let id = ContractorId::new("c-1");
        for name in ["deck", "fence"] {
            store
                .update_category(&id, &JobCategory::new(name), |r| {
                    r.record_quote(Complexity::Medium, Utc::now())
                })
                .await
                .unwrap();
        }
        let before = store.document(&id).await.unwrap();

        let dashboard = ConfidenceDashboard::new(store.clone(), &config);
        let report = dashboard.get(&id).await.unwrap();
        assert_eq!(report.categories.len(), 2);
        assert!(report.dna.is_none());
        assert!(report.categories.iter().all(|c| c
            .warnings
            .iter()
            .any(|w| matches!(w, CalibrationWarning::ThinSample { .. }))));

        let after = store.document(&id).await.unwrap();
        assert_eq!(before.categories, after.categories);
    }
}
