//! Cross-category pattern transfer
//!
//! After every correction the engine classifies the newly accepted
//! statements, checks them against patterns inherited from other categories
//! (validating or overriding them), and merges the transferable ones into
//! the contractor's DNA.

pub mod bootstrap;
pub mod classifier;
pub mod relations;

pub use bootstrap::{bootstrap_statements, BootstrappedStatement};
pub use classifier::{HeuristicClassifier, PatternClassifier};
pub use relations::RelationTable;

use crate::config::LearningConfig;
use crate::dna::{ContractorDna, MergeOutcome, TransferablePattern, Transferability};
use crate::error::Result;
use crate::storage::KnowledgeStore;
use crate::text;
use crate::types::{CategoryKnowledge, ContractorId, JobCategory};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Counts from one transfer pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReport {
    pub inserted: usize,
    pub refreshed: usize,
    pub unchanged: usize,
    pub specific: usize,
    pub validated: usize,
    pub overridden: usize,
    pub evicted: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MergeMode {
    /// Duplicates and consistent statements refresh validation
    Live,
    /// Re-running leaves the profile unchanged
    Backfill,
}

pub struct PatternTransferEngine {
    store: Arc<KnowledgeStore>,
    classifier: Arc<dyn PatternClassifier>,
    relations: RelationTable,
    config: Arc<LearningConfig>,
}

impl PatternTransferEngine {
    pub fn new(store: Arc<KnowledgeStore>, config: Arc<LearningConfig>) -> Self {
        Self::with_classifier(store, config, Arc::new(HeuristicClassifier::new()))
    }

    pub fn with_classifier(
        store: Arc<KnowledgeStore>,
        config: Arc<LearningConfig>,
        classifier: Arc<dyn PatternClassifier>,
    ) -> Self {
        Self {
            store,
            classifier,
            relations: RelationTable::default(),
            config,
        }
    }

    pub fn with_relations(mut self, relations: RelationTable) -> Self {
        self.relations = relations;
        self
    }

    pub fn relations(&self) -> &RelationTable {
        &self.relations
    }

    /// Inherited statements for a category, see [`bootstrap_statements`]
    pub fn bootstrap(&self, dna: &ContractorDna, category: &JobCategory) -> Vec<BootstrappedStatement> {
        bootstrap_statements(dna, category, &self.relations, &self.config.transfer)
    }

    /// Classify `statements`, used by the correction path
    pub fn classify_all(&self, statements: &[String], source: &CategoryKnowledge) -> Vec<TransferablePattern> {
        statements
            .iter()
            .map(|s| {
                let (pattern_type, transferability) = self.classifier.classify(s);
                TransferablePattern::new(s.as_str(), pattern_type, transferability, source)
            })
            .collect()
    }

    /// Merge statements accepted by one correction into the contractor's DNA
    pub async fn process_correction(
        &self,
        contractor: &ContractorId,
        category: &JobCategory,
        statements: &[String],
    ) -> Result<TransferReport> {
        let source = self.store.get_category(contractor, category).await?;
        let categories = self.store.categories(contractor).await?;
        let candidates = self.classify_all(statements, &source);

        let report = self
            .store
            .update_dna(contractor, |dna| {
                let mut report = TransferReport::default();
                for text in statements {
                    self.check_overrides(dna, category, text, MergeMode::Live, &mut report);
                }
                for pattern in candidates {
                    self.merge_one(dna, pattern, MergeMode::Live, &mut report);
                }
                report.evicted = dna.compact(self.config.transfer.max_patterns);
                dna.refresh_profile(categories.iter());
                report
            })
            .await?;

        info!(
            contractor = %contractor,
            category = %category,
            inserted = report.inserted,
            refreshed = report.refreshed,
            validated = report.validated,
            overridden = report.overridden,
            "DNA updated after correction"
        );
        Ok(report)
    }

    /// Rebuild DNA from every category's existing statements
    ///
    /// Idempotent: merges first without refreshing, then records overrides
    /// against the complete pattern set.
    pub async fn backfill(&self, contractor: &ContractorId) -> Result<TransferReport> {
        let categories = self.store.categories(contractor).await?;
        let candidates: Vec<(JobCategory, Vec<String>, Vec<TransferablePattern>)> = categories
            .iter()
            .filter(|c| !c.learned_statements.is_empty())
            .map(|c| {
                let texts: Vec<String> = c.learned_statements.iter().map(|s| s.text.clone()).collect();
                let patterns = self.classify_all(&texts, c);
                (c.category.clone(), texts, patterns)
            })
            .collect();

        if candidates.is_empty() && !self.store.has_dna(contractor).await? {
            debug!(contractor = %contractor, "Nothing to backfill");
            return Ok(TransferReport::default());
        }

        self.store
            .update_dna(contractor, |dna| {
                let mut report = TransferReport::default();
                for (_, _, patterns) in &candidates {
                    for pattern in patterns {
                        self.merge_one(dna, pattern.clone(), MergeMode::Backfill, &mut report);
                    }
                }
                for (category, texts, _) in &candidates {
                    for text in texts {
                        self.check_overrides(dna, category, text, MergeMode::Backfill, &mut report);
                    }
                }
                report.evicted = dna.compact(self.config.transfer.max_patterns);
                dna.refresh_profile(categories.iter());
                report
            })
            .await
    }

    fn merge_one(
        &self,
        dna: &mut ContractorDna,
        pattern: TransferablePattern,
        mode: MergeMode,
        report: &mut TransferReport,
    ) {
        let statement = pattern.statement.clone();
        let pattern_type = pattern.pattern_type;
        match dna.merge(pattern, mode == MergeMode::Live) {
            MergeOutcome::Inserted => {
                report.inserted += 1;
                debug!(%pattern_type, statement = %statement, "Pattern merged into DNA");
            }
            MergeOutcome::Refreshed => {
                report.refreshed += 1;
                debug!(%pattern_type, statement = %statement, "Existing pattern refreshed");
            }
            MergeOutcome::Unchanged => report.unchanged += 1,
            MergeOutcome::Rejected => {
                report.specific += 1;
                debug!(%pattern_type, statement = %statement, "Specific pattern not transferred");
            }
        }
    }

    /// Compare a category's own statement with patterns inherited from elsewhere
    fn check_overrides(
        &self,
        dna: &mut ContractorDna,
        category: &JobCategory,
        statement: &str,
        mode: MergeMode,
        report: &mut TransferReport,
    ) {
        let Some(value) = text::numeric_value(statement) else {
            return;
        };
        let keywords = text::keywords(statement);
        let min_overlap = self.config.transfer.min_keyword_overlap;
        let tolerance = self.config.relevance.conflict_tolerance;

        for pattern in dna.patterns_mut() {
            if pattern.source_category == *category {
                continue;
            }
            let applies = match pattern.transferability {
                Transferability::Universal => true,
                Transferability::Partial => self.relations.are_related(&pattern.source_category, category),
                Transferability::Specific => false,
            };
            if !applies || pattern.keywords.intersection(&keywords).count() < min_overlap {
                continue;
            }
            let Some(inherited) = pattern.numeric_value else {
                continue;
            };

            if text::relative_difference(value, inherited) <= tolerance {
                if mode == MergeMode::Live {
                    pattern.last_validated_at = Utc::now();
                    pattern.validation_count += 1;
                    report.validated += 1;
                    debug!(
                        category = %category,
                        pattern = %pattern.statement,
                        "Inherited pattern validated"
                    );
                }
            } else if pattern.overridden_in.insert(category.clone()) {
                report.overridden += 1;
                info!(
                    category = %category,
                    source = %pattern.source_category,
                    inherited = %pattern.statement,
                    own = %statement,
                    "Inherited pattern overridden by category statement"
                );
            }
        }
    }
}
