//! DNA bootstrap for categories with little history of their own

use super::RelationTable;
use crate::config::TransferConfig;
use crate::dna::{ContractorDna, PatternType, Transferability};
use crate::types::{normalize_statement, JobCategory};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A statement inherited from another category's pattern
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BootstrappedStatement {
    pub text: String,
    pub source_category: JobCategory,
    pub pattern_type: PatternType,
    pub transferability: Transferability,
    pub inherited_confidence: f64,
}

/// Inherited statements for `category`, strongest first
///
/// Takes every universal pattern and the partial patterns whose source is
/// related to `category`. Patterns learned in `category` itself or
/// overridden there are skipped.
pub fn bootstrap_statements(
    dna: &ContractorDna,
    category: &JobCategory,
    relations: &RelationTable,
    config: &TransferConfig,
) -> Vec<BootstrappedStatement> {
    let mut candidates: Vec<BootstrappedStatement> = dna
        .patterns()
        .filter(|p| p.source_category != *category && !p.is_overridden_in(category))
        .filter(|p| match p.transferability {
            Transferability::Universal => true,
            Transferability::Partial => relations.are_related(&p.source_category, category),
            Transferability::Specific => false,
        })
        .map(|p| BootstrappedStatement {
            text: p.statement.clone(),
            source_category: p.source_category.clone(),
            pattern_type: p.pattern_type,
            transferability: p.transferability,
            inherited_confidence: p.inherited_confidence(config),
        })
        .collect();

    candidates.sort_by(|a, b| {
        b.inherited_confidence
            .total_cmp(&a.inherited_confidence)
            .then_with(|| a.text.cmp(&b.text))
    });

    let mut seen = HashSet::new();
    candidates.retain(|c| seen.insert(normalize_statement(&c.text)));
    candidates.truncate(config.max_bootstrap_statements);
    candidates
}
