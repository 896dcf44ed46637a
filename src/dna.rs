//! Contractor DNA: the cross-category pattern profile
//!
//! A contractor's DNA holds pricing patterns that were learned in one job
//! category and may be bootstrapped into others. Patterns are split by
//! transferability; `specific` patterns are never stored here.

use crate::config::TransferConfig;
use crate::text;
use crate::types::{normalize_statement, CategoryKnowledge, JobCategory};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use uuid::Uuid;

/// What kind of pricing rule a pattern expresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    AccessModifier,
    RelationshipDiscount,
    RushPremium,
    SeasonalAdjustment,
    PermitHandling,
    QualityPreference,
    MinimumPricing,
    MaterialCost,
    UnitCost,
    AbsolutePrice,
    General,
}

impl std::fmt::Display for PatternType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PatternType::AccessModifier => "access_modifier",
            PatternType::RelationshipDiscount => "relationship_discount",
            PatternType::RushPremium => "rush_premium",
            PatternType::SeasonalAdjustment => "seasonal_adjustment",
            PatternType::PermitHandling => "permit_handling",
            PatternType::QualityPreference => "quality_preference",
            PatternType::MinimumPricing => "minimum_pricing",
            PatternType::MaterialCost => "material_cost",
            PatternType::UnitCost => "unit_cost",
            PatternType::AbsolutePrice => "absolute_price",
            PatternType::General => "general",
        };
        write!(f, "{}", name)
    }
}

/// How far a pattern may travel across categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transferability {
    /// Transfers to every category
    Universal,
    /// Transfers only to related categories
    Partial,
    /// Never transfers
    Specific,
}

/// A pricing pattern eligible for cross-category transfer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferablePattern {
    #[serde(default = "Uuid::new_v4")]
    pub pattern_id: Uuid,
    pub pattern_type: PatternType,
    pub statement: String,
    pub source_category: JobCategory,
    pub source_confidence: f64,
    #[serde(default)]
    pub source_quote_count: u64,

    /// Validating quotes (acceptances) in the source category at extraction
    #[serde(default)]
    pub source_validations: u64,
    #[serde(default)]
    pub keywords: BTreeSet<String>,
    #[serde(default)]
    pub numeric_value: Option<f64>,
    pub transferability: Transferability,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub last_validated_at: DateTime<Utc>,
    #[serde(default)]
    pub validation_count: u64,

    /// Categories whose own statements contradicted this pattern
    #[serde(default)]
    pub overridden_in: BTreeSet<JobCategory>,
}

impl TransferablePattern {
    pub fn new(
        statement: impl Into<String>,
        pattern_type: PatternType,
        transferability: Transferability,
        source: &CategoryKnowledge,
    ) -> Self {
        let statement = statement.into().trim().to_string();
        let now = Utc::now();
        Self {
            pattern_id: Uuid::new_v4(),
            pattern_type,
            keywords: text::keywords(&statement),
            numeric_value: text::numeric_value(&statement),
            statement,
            source_category: source.category.clone(),
            source_confidence: source.confidence.clamp(0.0, 1.0),
            source_quote_count: source.quote_count,
            source_validations: source.acceptance_count,
            transferability,
            created_at: now,
            last_validated_at: now,
            validation_count: 0,
            overridden_in: BTreeSet::new(),
        }
    }

    /// Deduplication key: normalized statement plus pattern type
    pub fn dedup_key(&self) -> (String, PatternType) {
        (normalize_statement(&self.statement), self.pattern_type)
    }

    pub fn is_overridden_in(&self, category: &JobCategory) -> bool {
        self.overridden_in.contains(category)
    }

    /// Confidence this pattern carries when bootstrapped into another category
    ///
    /// `source_confidence x base_rate`, penalized for thin validation,
    /// boosted for strong validation, then clamped so inherited knowledge
    /// never looks fully confident.
    pub fn inherited_confidence(&self, config: &TransferConfig) -> f64 {
        let base = match self.transferability {
            Transferability::Universal => config.universal_base_rate,
            Transferability::Partial => config.partial_base_rate,
            Transferability::Specific => return 0.0,
        };
        let modifier = if self.source_validations < config.low_validation_threshold {
            config.low_validation_penalty
        } else if self.source_validations > config.high_validation_threshold {
            config.high_validation_boost
        } else {
            1.0
        };
        (self.source_confidence * base * modifier).clamp(
            config.min_inherited_confidence,
            config.max_inherited_confidence,
        )
    }
}

/// Direction the contractor usually moves generated prices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PricingTendency {
    RaisesPrices,
    LowersPrices,
    Balanced,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QualityOrientation {
    Premium,
    Budget,
    Mixed,
    #[default]
    Unknown,
}

/// Aggregate pricing behaviour across all categories
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PricingStyle {
    pub tendency: PricingTendency,

    /// Mean signed correction delta in percent
    pub avg_markup: Option<f64>,
    pub quality_orientation: QualityOrientation,
    pub profile_confidence: f64,
}

const PREMIUM_WORDS: &[&str] = &["premium", "high-end", "high end", "top quality", "best", "upgrade", "upgraded"];
const BUDGET_WORDS: &[&str] = &["budget", "cheap", "cheapest", "economy", "basic", "lowest cost"];

/// Deltas within this band (percent) count as balanced
const BALANCED_BAND: f64 = 2.0;

impl PricingStyle {
    /// Derive the style from category records and quality-preference patterns
    pub fn derive<'c, 'p>(
        categories: impl IntoIterator<Item = &'c CategoryKnowledge>,
        patterns: impl IntoIterator<Item = &'p TransferablePattern>,
        total_corrections: u64,
    ) -> Self {
        let deltas: Vec<f64> = categories
            .into_iter()
            .flat_map(|c| c.correction_magnitudes.iter().copied())
            .collect();
        let avg_markup = if deltas.is_empty() {
            None
        } else {
            Some(deltas.iter().sum::<f64>() / deltas.len() as f64)
        };
        let tendency = match avg_markup {
            None => PricingTendency::Unknown,
            Some(avg) if avg > BALANCED_BAND => PricingTendency::RaisesPrices,
            Some(avg) if avg < -BALANCED_BAND => PricingTendency::LowersPrices,
            Some(_) => PricingTendency::Balanced,
        };

        let (mut premium, mut budget) = (0usize, 0usize);
        for pattern in patterns {
            if pattern.pattern_type != PatternType::QualityPreference {
                continue;
            }
            if text::contains_any(&pattern.statement, PREMIUM_WORDS) {
                premium += 1;
            }
            if text::contains_any(&pattern.statement, BUDGET_WORDS) {
                budget += 1;
            }
        }
        let quality_orientation = match (premium, budget) {
            (0, 0) => QualityOrientation::Unknown,
            (p, 0) if p > 0 => QualityOrientation::Premium,
            (0, b) if b > 0 => QualityOrientation::Budget,
            _ => QualityOrientation::Mixed,
        };

        let n = total_corrections as f64;
        Self {
            tendency,
            avg_markup,
            quality_orientation,
            profile_confidence: (n / (n + 10.0)).min(0.95),
        }
    }
}

/// Result of merging one pattern into the profile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Inserted,
    /// Duplicate; `last_validated_at` refreshed
    Refreshed,
    /// Duplicate left untouched
    Unchanged,
    /// Specific patterns are never persisted
    Rejected,
}

/// Per-contractor cross-category profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContractorDna {
    pub universal_patterns: Vec<TransferablePattern>,
    pub partial_patterns: Vec<TransferablePattern>,
    pub pricing_style: PricingStyle,
    pub total_categories: u64,
    pub total_corrections: u64,
    pub dna_confidence: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Default for ContractorDna {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            universal_patterns: Vec::new(),
            partial_patterns: Vec::new(),
            pricing_style: PricingStyle::default(),
            total_categories: 0,
            total_corrections: 0,
            dna_confidence: 0.0,
            created_at: now,
            updated_at: now,
        }
    }
}

impl ContractorDna {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn patterns(&self) -> impl Iterator<Item = &TransferablePattern> {
        self.universal_patterns
            .iter()
            .chain(self.partial_patterns.iter())
    }

    pub fn patterns_mut(&mut self) -> impl Iterator<Item = &mut TransferablePattern> {
        self.universal_patterns
            .iter_mut()
            .chain(self.partial_patterns.iter_mut())
    }

    pub fn pattern_count(&self) -> usize {
        self.universal_patterns.len() + self.partial_patterns.len()
    }

    /// Merge a classified pattern, deduplicating by (statement, type)
    ///
    /// With `refresh`, a duplicate has its validation timestamp and count
    /// bumped; without it the profile is left as is, which keeps replays
    /// idempotent.
    pub fn merge(&mut self, pattern: TransferablePattern, refresh: bool) -> MergeOutcome {
        let list = match pattern.transferability {
            Transferability::Universal => &mut self.universal_patterns,
            Transferability::Partial => &mut self.partial_patterns,
            Transferability::Specific => return MergeOutcome::Rejected,
        };

        let key = pattern.dedup_key();
        if let Some(existing) = list.iter_mut().find(|p| p.dedup_key() == key) {
            if !refresh {
                return MergeOutcome::Unchanged;
            }
            existing.last_validated_at = Utc::now();
            existing.validation_count += 1;
            existing.source_confidence = existing.source_confidence.max(pattern.source_confidence);
            existing.source_quote_count = existing.source_quote_count.max(pattern.source_quote_count);
            existing.source_validations = existing.source_validations.max(pattern.source_validations);
            self.updated_at = Utc::now();
            return MergeOutcome::Refreshed;
        }

        list.push(pattern);
        self.updated_at = Utc::now();
        MergeOutcome::Inserted
    }

    /// Evict down to `max_patterns` per list, lowest confidence then oldest first
    ///
    /// Returns the number of evicted patterns.
    pub fn compact(&mut self, max_patterns: usize) -> usize {
        compact_list(&mut self.universal_patterns, max_patterns)
            + compact_list(&mut self.partial_patterns, max_patterns)
    }

    /// Recompute derived profile fields from the contractor's category records
    pub fn refresh_profile<'a>(
        &mut self,
        categories: impl IntoIterator<Item = &'a CategoryKnowledge> + Clone,
    ) {
        self.total_categories = categories.clone().into_iter().count() as u64;
        self.total_corrections = categories
            .clone()
            .into_iter()
            .map(|c| c.correction_count)
            .sum();
        self.pricing_style = PricingStyle::derive(
            categories,
            self.universal_patterns
                .iter()
                .chain(self.partial_patterns.iter()),
            self.total_corrections,
        );

        let count = self.pattern_count();
        let mean_source = if count == 0 {
            0.0
        } else {
            self.patterns().map(|p| p.source_confidence).sum::<f64>() / count as f64
        };
        self.dna_confidence = (mean_source * self.pricing_style.profile_confidence).clamp(0.0, 1.0);
        self.updated_at = Utc::now();
    }

    /// Repair step applied on load; returns the number of repairs
    pub fn normalize(&mut self) -> usize {
        let mut repairs = 0;

        // Re-file anything stored in the wrong list, dropping specific patterns
        let all: Vec<TransferablePattern> = self
            .universal_patterns
            .drain(..)
            .chain(self.partial_patterns.drain(..))
            .collect();
        let mut seen = HashSet::new();
        for mut pattern in all {
            if pattern.transferability == Transferability::Specific || !seen.insert(pattern.dedup_key()) {
                repairs += 1;
                continue;
            }
            if !pattern.source_confidence.is_finite() || !(0.0..=1.0).contains(&pattern.source_confidence) {
                pattern.source_confidence = if pattern.source_confidence.is_finite() {
                    pattern.source_confidence.clamp(0.0, 1.0)
                } else {
                    0.0
                };
                repairs += 1;
            }
            if pattern.keywords.is_empty() {
                pattern.keywords = text::keywords(&pattern.statement);
                repairs += 1;
            }
            if pattern.numeric_value.is_none() {
                if let Some(value) = text::numeric_value(&pattern.statement) {
                    pattern.numeric_value = Some(value);
                    repairs += 1;
                }
            }
            match pattern.transferability {
                Transferability::Universal => self.universal_patterns.push(pattern),
                _ => self.partial_patterns.push(pattern),
            }
        }

        if !self.dna_confidence.is_finite() || !(0.0..=1.0).contains(&self.dna_confidence) {
            self.dna_confidence = if self.dna_confidence.is_finite() {
                self.dna_confidence.clamp(0.0, 1.0)
            } else {
                0.0
            };
            repairs += 1;
        }

        repairs
    }
}

fn compact_list(list: &mut Vec<TransferablePattern>, max: usize) -> usize {
    if list.len() <= max {
        return 0;
    }
    // Keep the strongest and most recently validated at the front
    list.sort_by(|a, b| {
        b.source_confidence
            .total_cmp(&a.source_confidence)
            .then(b.last_validated_at.cmp(&a.last_validated_at))
    });
    let evicted = list.len() - max;
    list.truncate(max);
    evicted
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn deck(confidence: f64, acceptances: u64) -> CategoryKnowledge {
        let mut record = CategoryKnowledge::new(JobCategory::new("deck"), confidence);
        record.quote_count = 20;
        record.acceptance_count = acceptances;
        record
    }

    fn universal(text: &str, source: &CategoryKnowledge) -> TransferablePattern {
        TransferablePattern::new(text, PatternType::AccessModifier, Transferability::Universal, source)
    }

    #[test]
    fn test_inherited_confidence_base_rate() {
        let config = TransferConfig::default();
        let pattern = universal("Add 15% for second story access", &deck(0.85, 5));
        assert!((pattern.inherited_confidence(&config) - 0.51).abs() < 1e-9);
    }

    #[test]
    fn test_inherited_confidence_modifiers_and_clamp() {
        let config = TransferConfig::default();

        let thin = universal("Add 15% for second story access", &deck(0.85, 1));
        // 0.85 * 0.6 * 0.7 = 0.357
        assert!((thin.inherited_confidence(&config) - 0.357).abs() < 1e-9);

        let strong = universal("Add 15% for second story access", &deck(0.95, 40));
        // 0.95 * 0.6 * 1.1 = 0.627
        assert!((strong.inherited_confidence(&config) - 0.627).abs() < 1e-9);

        let weak = universal("Add 15% for second story access", &deck(0.2, 5));
        assert_eq!(weak.inherited_confidence(&config), 0.30);

        let mut partial = universal("Minimum charge of $500", &deck(0.9, 5));
        partial.transferability = Transferability::Partial;
        assert!((partial.inherited_confidence(&config) - 0.36).abs() < 1e-9);
    }

    #[test]
    fn test_merge_dedupes_and_refreshes() {
        let mut dna = ContractorDna::new();
        let source = deck(0.8, 5);
        let first = universal("Add 15% for second story access", &source);
        let before = first.last_validated_at;

        assert_eq!(dna.merge(first, true), MergeOutcome::Inserted);
        let dup = universal("add 15% for second story access.", &source);
        assert_eq!(dna.merge(dup.clone(), false), MergeOutcome::Unchanged);
        assert_eq!(dna.merge(dup, true), MergeOutcome::Refreshed);

        assert_eq!(dna.universal_patterns.len(), 1);
        assert_eq!(dna.universal_patterns[0].validation_count, 1);
        assert!(dna.universal_patterns[0].last_validated_at >= before);
    }

    #[test]
    fn test_specific_patterns_are_rejected() {
        let mut dna = ContractorDna::new();
        let pattern = TransferablePattern::new(
            "Charge $8 per sqft for composite boards",
            PatternType::UnitCost,
            Transferability::Specific,
            &deck(0.8, 5),
        );
        assert_eq!(dna.merge(pattern, true), MergeOutcome::Rejected);
        assert_eq!(dna.pattern_count(), 0);
    }

    #[test]
    fn test_compact_evicts_lowest_then_oldest() {
        let mut dna = ContractorDna::new();
        let source = deck(0.5, 5);
        for i in 0..5 {
            let mut p = universal(&format!("Add {}% for steep access", 10 + i), &source);
            p.source_confidence = if i == 0 { 0.1 } else { 0.5 };
            p.last_validated_at = Utc::now() - ChronoDuration::days(i as i64);
            dna.merge(p, true);
        }

        assert_eq!(dna.compact(3), 2);
        let kept: Vec<&str> = dna.universal_patterns.iter().map(|p| p.statement.as_str()).collect();
        assert!(!kept.contains(&"Add 10% for steep access"));
        assert!(!kept.contains(&"Add 14% for steep access"));
    }

    #[test]
    fn test_normalize_drops_specific_and_refiles() {
        let source = deck(0.8, 5);
        let mut dna = ContractorDna::new();
        let mut specific = universal("Charge $8 per sqft", &source);
        specific.transferability = Transferability::Specific;
        let mut misfiled = universal("Minimum charge of $500", &source);
        misfiled.transferability = Transferability::Partial;
        misfiled.keywords.clear();
        dna.universal_patterns.push(specific);
        dna.universal_patterns.push(misfiled);

        let repairs = dna.normalize();
        assert!(repairs >= 2);
        assert!(dna.universal_patterns.is_empty());
        assert_eq!(dna.partial_patterns.len(), 1);
        assert!(!dna.partial_patterns[0].keywords.is_empty());
    }

    #[test]
    fn test_pricing_style_from_signed_deltas() {
        let mut a = deck(0.6, 5);
        a.push_magnitude(12.0, 20);
        a.push_magnitude(8.0, 20);
        let style = PricingStyle::derive([&a], std::iter::empty(), 2);
        assert_eq!(style.tendency, PricingTendency::RaisesPrices);
        assert_eq!(style.avg_markup, Some(10.0));

        let mut b = deck(0.6, 5);
        b.push_magnitude(-1.0, 20);
        let style = PricingStyle::derive([&b], std::iter::empty(), 1);
        assert_eq!(style.tendency, PricingTendency::Balanced);

        let empty = PricingStyle::derive(std::iter::empty(), std::iter::empty(), 0);
        assert_eq!(empty.tendency, PricingTendency::Unknown);
        assert_eq!(empty.profile_confidence, 0.0);
    }
}
