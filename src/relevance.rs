//! Relevance-based statement selection
//!
//! Scores each learned statement against a job description:
//!
//! - Keyword overlap with the description (40%)
//! - Recency rank among the category's statements (30%)
//! - Specificity: dollar, percent or unit content (20%)
//! - Foundational qualifiers such as "always" or "minimum" (10%)
//!
//! [`RelevanceScorer`] is pure and is shared with the correction path, which
//! evicts the lowest-scoring statements when a category is full.
//! [`RelevanceSelector`] reads the store and assembles the
//! [`GenerationContext`] handed to quote generation.

use crate::calibration::ConfidenceCalibrator;
use crate::config::{LearningConfig, RelevanceConfig};
use crate::error::Result;
use crate::storage::KnowledgeStore;
use crate::text;
use crate::transfer::{bootstrap_statements, BootstrappedStatement, RelationTable};
use crate::types::{
    normalize_statement, ConfidenceDimensions, ConfidenceTier, ContractorId, JobCategory,
    LearningStatement,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

const FOUNDATIONAL: &[&str] = &["always", "never", "minimum", "must", "every"];

/// Words that describe the job as involving more than one piece of work
const COMPLEXITY_MARKERS: &[&str] = &[
    "and", "plus", "also", "multiple", "second story", "demo", "demolition", "remove",
    "replace", "permit", "custom", "stairs",
];

/// Shared keywords too generic to name a conflicting subject
const GENERIC_SUBJECTS: &[&str] = &[
    "add", "charge", "price", "pricing", "cost", "costs", "include", "quote", "increase",
    "reduce", "total", "extra", "more", "less",
];

/// A statement with its relevance breakdown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredStatement {
    pub statement: LearningStatement,
    pub score: f64,
    pub keyword_overlap: f64,
    pub recency: f64,
    pub specificity: f64,
    pub foundational: f64,
}

/// Two selected statements that disagree numerically on the same subject
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementConflict {
    pub subject: String,
    pub first: String,
    pub second: String,
    pub first_value: f64,
    pub second_value: f64,
}

impl std::fmt::Display for StatementConflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Conflicting rules for '{}': \"{}\" ({}) vs \"{}\" ({})",
            self.subject, self.first, self.first_value, self.second, self.second_value
        )
    }
}

/// Knowledge handed to the quote generation service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationContext {
    pub contractor_id: ContractorId,
    pub category: JobCategory,
    pub selected_statements: Vec<ScoredStatement>,
    pub overall_confidence: f64,
    pub confidence_tier: ConfidenceTier,
    pub dimensions: ConfidenceDimensions,

    /// Only populated while the category is new
    pub dna_bootstrap_statements: Vec<BootstrappedStatement>,
    pub tailored_guidance: Option<String>,
    pub philosophy: Option<String>,
    pub warnings: Vec<String>,
    pub conflicts: Vec<StatementConflict>,
}

/// Pure relevance scoring over a category's statements
#[derive(Debug, Clone, Default)]
pub struct RelevanceScorer {
    config: RelevanceConfig,
}

impl RelevanceScorer {
    pub fn new(config: RelevanceConfig) -> Self {
        Self { config }
    }

    /// Score every statement, in input order
    pub fn score_all(&self, statements: &[LearningStatement], query: &str) -> Vec<ScoredStatement> {
        let query_keywords = text::keywords(query);
        let recency = recency_ranks(statements);

        statements
            .iter()
            .zip(recency)
            .map(|(statement, recency)| {
                let keywords = text::keywords(&statement.text);
                let keyword_overlap = if keywords.is_empty() {
                    0.0
                } else {
                    keywords.intersection(&query_keywords).count() as f64 / keywords.len() as f64
                };
                let specificity = specificity(&statement.text);
                let foundational = if text::contains_any(&statement.text, FOUNDATIONAL) {
                    1.0
                } else {
                    0.0
                };
                let score = keyword_overlap * self.config.weight_keyword
                    + recency * self.config.weight_recency
                    + specificity * self.config.weight_specificity
                    + foundational * self.config.weight_foundational;

                ScoredStatement {
                    statement: statement.clone(),
                    score: score.clamp(0.0, 1.0),
                    keyword_overlap,
                    recency,
                    specificity,
                    foundational,
                }
            })
            .collect()
    }

    /// How many statements a description of this size warrants
    pub fn target_count(&self, job_description: &str) -> usize {
        let words = job_description.split_whitespace().count();
        let base = match words {
            0..=12 => 3,
            13..=30 => 5,
            _ => 7,
        };
        let markers = text::count_matches(job_description, COMPLEXITY_MARKERS).min(3);
        (base + markers).clamp(self.config.min_selected, self.config.max_selected)
    }

    /// Statements above the relevance threshold, best first, up to the target
    pub fn select(&self, statements: &[LearningStatement], job_description: &str) -> Vec<ScoredStatement> {
        let target = self.target_count(job_description);
        let mut scored: Vec<ScoredStatement> = self
            .score_all(statements, job_description)
            .into_iter()
            .filter(|s| s.score >= self.config.min_relevance)
            .collect();
        scored.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then(b.statement.created_at.cmp(&a.statement.created_at))
        });
        scored.truncate(target);
        scored
    }

    /// Pairs in `selected` that share a subject but differ numerically
    pub fn detect_conflicts(&self, selected: &[ScoredStatement]) -> Vec<StatementConflict> {
        let parsed: Vec<(&str, std::collections::BTreeSet<String>, Option<f64>)> = selected
            .iter()
            .map(|s| {
                let body = s.statement.text.as_str();
                let subjects = text::keywords(body)
                    .into_iter()
                    .filter(|k| !GENERIC_SUBJECTS.contains(&k.as_str()))
                    .collect();
                (body, subjects, text::numeric_value(body))
            })
            .collect();

        let mut conflicts = Vec::new();
        for (i, (a_text, a_subjects, a_value)) in parsed.iter().enumerate() {
            for (b_text, b_subjects, b_value) in parsed.iter().skip(i + 1) {
                let (Some(a), Some(b)) = (a_value, b_value) else {
                    continue;
                };
                let Some(subject) = a_subjects.intersection(b_subjects).next() else {
                    continue;
                };
                if text::relative_difference(*a, *b) > self.config.conflict_tolerance {
                    conflicts.push(StatementConflict {
                        subject: subject.clone(),
                        first: a_text.to_string(),
                        second: b_text.to_string(),
                        first_value: *a,
                        second_value: *b,
                    });
                }
            }
        }
        conflicts
    }

    /// Remove lowest-relevance statements until `statements.len() <= cap`
    ///
    /// Statements listed in `protected` are evicted only once nothing else is
    /// left to remove. Ties go to the oldest statement.
    pub fn evict_to_cap(
        &self,
        statements: &mut Vec<LearningStatement>,
        cap: usize,
        query: &str,
        protected: &HashSet<Uuid>,
    ) -> Vec<LearningStatement> {
        let mut evicted = Vec::new();
        while statements.len() > cap {
            let scored = self.score_all(statements, query);
            let lowest = |respect_protection: bool| {
                scored
                    .iter()
                    .enumerate()
                    .filter(|(_, s)| !respect_protection || !protected.contains(&s.statement.id))
                    .min_by(|(_, a), (_, b)| {
                        a.score
                            .total_cmp(&b.score)
                            .then(a.statement.created_at.cmp(&b.statement.created_at))
                    })
                    .map(|(i, _)| i)
            };
            match lowest(true).or_else(|| lowest(false)) {
                Some(index) => evicted.push(statements.remove(index)),
                None => break,
            }
        }
        evicted
    }
}

/// (index + 1) / n by creation time, newest = 1.0
fn recency_ranks(statements: &[LearningStatement]) -> Vec<f64> {
    let n = statements.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| statements[a].created_at.cmp(&statements[b].created_at).then(a.cmp(&b)));

    let mut ranks = vec![0.0; n];
    for (rank, index) in order.into_iter().enumerate() {
        ranks[index] = (rank + 1) as f64 / n as f64;
    }
    ranks
}

fn specificity(statement: &str) -> f64 {
    if text::has_dollar_amount(statement) || text::has_percentage(statement) || text::has_unit(statement) {
        1.0
    } else if text::has_number(statement) {
        0.5
    } else {
        0.0
    }
}

/// Builds generation contexts from stored knowledge
pub struct RelevanceSelector {
    store: Arc<KnowledgeStore>,
    scorer: RelevanceScorer,
    calibrator: ConfidenceCalibrator,
    relations: RelationTable,
    config: Arc<LearningConfig>,
}

impl RelevanceSelector {
    pub fn new(store: Arc<KnowledgeStore>, config: Arc<LearningConfig>) -> Self {
        Self {
            store,
            scorer: RelevanceScorer::new(config.relevance.clone()),
            calibrator: ConfidenceCalibrator::new(config.confidence.clone()),
            relations: RelationTable::default(),
            config,
        }
    }

    pub fn with_relations(mut self, relations: RelationTable) -> Self {
        self.relations = relations;
        self
    }

    pub fn scorer(&self) -> &RelevanceScorer {
        &self.scorer
    }

    pub fn select(&self, statements: &[LearningStatement], job_description: &str) -> Vec<ScoredStatement> {
        self.scorer.select(statements, job_description)
    }

    pub async fn build_context(
        &self,
        contractor: &ContractorId,
        category: &JobCategory,
        job_description: &str,
    ) -> Result<GenerationContext> {
        let record = self.store.get_category(contractor, category).await?;
        let philosophy = self.store.philosophy(contractor).await?;
        let report = self.calibrator.calibrate(&record, Utc::now());

        let selected = self.scorer.select(&record.learned_statements, job_description);
        let conflicts = self.scorer.detect_conflicts(&selected);
        for conflict in &conflicts {
            warn!(contractor = %contractor, category = %category, "{}", conflict);
        }

        let dna_bootstrap_statements = if record.quote_count < self.config.transfer.bootstrap_max_quotes {
            let dna = self.store.get_dna(contractor).await?;
            let own: HashSet<String> = record.learned_statements.iter().map(|s| s.normalized()).collect();
            bootstrap_statements(&dna, category, &self.relations, &self.config.transfer)
                .into_iter()
                .filter(|b| !own.contains(&normalize_statement(&b.text)))
                .collect()
        } else {
            Vec::new()
        };

        let mut warnings: Vec<String> = report.warnings.iter().map(|w| w.to_string()).collect();
        warnings.extend(conflicts.iter().map(|c| c.to_string()));

        debug!(
            contractor = %contractor,
            category = %category,
            selected = selected.len(),
            bootstrapped = dna_bootstrap_statements.len(),
            tier = %report.dimensions.tier,
            "Built generation context"
        );

        Ok(GenerationContext {
            contractor_id: contractor.clone(),
            category: category.clone(),
            selected_statements: selected,
            overall_confidence: report.dimensions.overall,
            confidence_tier: report.dimensions.tier,
            dimensions: report.dimensions,
            dna_bootstrap_statements,
            tailored_guidance: record.tailored_guidance,
            philosophy,
            warnings,
            conflicts,
        })
    }
}
