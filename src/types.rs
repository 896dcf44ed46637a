//! Core data types for the Quotewise learning engine
//!
//! Defines the per-contractor knowledge document and the per-category
//! records it owns. Every persisted type uses `#[serde(default)]` so records
//! written before a field existed still load; [`KnowledgeDocument::normalize`]
//! then repairs anything a default cannot express.

use crate::config::LearningConfig;
use crate::dna::ContractorDna;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use uuid::Uuid;

/// Current on-disk schema version of [`KnowledgeDocument`]
pub const SCHEMA_VERSION: u32 = 3;

/// Contractor identifier
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContractorId(pub String);

impl ContractorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContractorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ContractorId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Job category, normalized to lowercase snake case ("Deck Repair" -> "deck_repair")
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobCategory(String);

impl JobCategory {
    pub fn new(name: &str) -> Self {
        let mut normalized = String::with_capacity(name.len());
        let mut pending_sep = false;
        for c in name.trim().chars() {
            if c.is_alphanumeric() {
                if pending_sep && !normalized.is_empty() {
                    normalized.push('_');
                }
                pending_sep = false;
                normalized.extend(c.to_lowercase());
            } else {
                pending_sep = true;
            }
        }
        Self(normalized)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for JobCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for JobCategory {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Job complexity bucket used for coverage calibration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Simple,
    Medium,
    Complex,
}

impl Complexity {
    pub const ALL: [Complexity; 3] = [Complexity::Simple, Complexity::Medium, Complexity::Complex];

    /// Infer complexity from the number of quoted line items
    pub fn from_line_items(count: usize) -> Self {
        match count {
            0..=3 => Complexity::Simple,
            4..=8 => Complexity::Medium,
            _ => Complexity::Complex,
        }
    }
}

/// Kind of positive signal carried by an accepted sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalType {
    /// Quote sent to the customer without edits
    Sent,
    /// Customer accepted a quote that was never edited
    CustomerAccepted,
}

/// A learned pricing rule, immutable once created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningStatement {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub text: String,
    #[serde(default)]
    pub quality_score: u32,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub category: JobCategory,
}

impl LearningStatement {
    pub fn new(text: impl Into<String>, quality_score: u32, category: JobCategory) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into().trim().to_string(),
            quality_score,
            created_at: Utc::now(),
            category,
        }
    }

    /// Text used for deduplication
    pub fn normalized(&self) -> String {
        normalize_statement(&self.text)
    }
}

/// Lowercase, collapse whitespace and drop trailing punctuation
pub fn normalize_statement(text: &str) -> String {
    let collapsed = text
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    collapsed
        .trim_end_matches(|c: char| matches!(c, '.' | '!' | ';' | ',' | ':'))
        .to_string()
}

/// One accepted quote total
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceptedSample {
    #[serde(default)]
    pub quote_id: Option<String>,
    pub amount: f64,
    pub signal: SignalType,
    pub at: DateTime<Utc>,
}

/// Discrete confidence label
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceTier {
    #[default]
    Learning,
    Low,
    Medium,
    High,
}

impl ConfidenceTier {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.75 {
            ConfidenceTier::High
        } else if score >= 0.50 {
            ConfidenceTier::Medium
        } else if score >= 0.25 {
            ConfidenceTier::Low
        } else {
            ConfidenceTier::Learning
        }
    }
}

impl std::fmt::Display for ConfidenceTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfidenceTier::Learning => write!(f, "learning"),
            ConfidenceTier::Low => write!(f, "low"),
            ConfidenceTier::Medium => write!(f, "medium"),
            ConfidenceTier::High => write!(f, "high"),
        }
    }
}

/// Cached output of the confidence calibrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ConfidenceDimensions {
    pub data: f64,
    pub accuracy: f64,
    pub recency: f64,
    pub coverage: f64,
    pub overall: f64,
    pub tier: ConfidenceTier,
    pub computed_at: Option<DateTime<Utc>>,
}

/// Everything learned about one contractor in one job category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryKnowledge {
    pub category: JobCategory,
    pub learned_statements: Vec<LearningStatement>,
    pub quote_count: u64,
    pub acceptance_count: u64,
    pub correction_count: u64,

    /// Signed percentage change of the quote total, newest last
    pub correction_magnitudes: VecDeque<f64>,
    pub complexity_distribution: BTreeMap<Complexity, u64>,
    pub accepted_samples: VecDeque<AcceptedSample>,

    /// Quotes already counted as acceptances, newest last
    pub accepted_quote_ids: VecDeque<String>,
    pub last_quote_at: Option<DateTime<Utc>>,

    /// Increment-driven confidence, always finalized through the ceiling
    pub confidence: f64,
    pub confidence_dimensions: ConfidenceDimensions,

    /// Category-level guidance written by the contractor
    pub tailored_guidance: Option<String>,
    pub last_updated: DateTime<Utc>,
}

impl Default for CategoryKnowledge {
    fn default() -> Self {
        Self {
            category: JobCategory::default(),
            learned_statements: Vec::new(),
            quote_count: 0,
            acceptance_count: 0,
            correction_count: 0,
            correction_magnitudes: VecDeque::new(),
            complexity_distribution: BTreeMap::new(),
            accepted_samples: VecDeque::new(),
            accepted_quote_ids: VecDeque::new(),
            last_quote_at: None,
            confidence: 0.5,
            confidence_dimensions: ConfidenceDimensions::default(),
            tailored_guidance: None,
            last_updated: Utc::now(),
        }
    }
}

impl CategoryKnowledge {
    pub fn new(category: JobCategory, seed_confidence: f64) -> Self {
        Self {
            category,
            confidence: seed_confidence,
            ..Default::default()
        }
    }

    /// Acceptances plus corrections
    pub fn total_signals(&self) -> u64 {
        self.acceptance_count + self.correction_count
    }

    pub fn acceptance_rate(&self) -> Option<f64> {
        let total = self.total_signals();
        if total == 0 {
            None
        } else {
            Some(self.acceptance_count as f64 / total as f64)
        }
    }

    /// Mean absolute correction magnitude, in percent
    pub fn avg_abs_magnitude(&self) -> Option<f64> {
        if self.correction_magnitudes.is_empty() {
            return None;
        }
        let sum: f64 = self.correction_magnitudes.iter().map(|m| m.abs()).sum();
        Some(sum / self.correction_magnitudes.len() as f64)
    }

    pub fn push_magnitude(&mut self, delta_percent: f64, window: usize) {
        push_capped(&mut self.correction_magnitudes, delta_percent, window);
    }

    pub fn push_sample(&mut self, sample: AcceptedSample, window: usize) {
        push_capped(&mut self.accepted_samples, sample, window);
    }

    pub fn has_accepted_quote(&self, quote_id: &str) -> bool {
        self.accepted_quote_ids.iter().any(|id| id == quote_id)
    }

    pub fn remember_accepted_quote(&mut self, quote_id: String, window: usize) {
        push_capped(&mut self.accepted_quote_ids, quote_id, window);
    }

    /// Record a generated quote
    pub fn record_quote(&mut self, complexity: Complexity, at: DateTime<Utc>) {
        self.quote_count += 1;
        *self.complexity_distribution.entry(complexity).or_insert(0) += 1;
        self.last_quote_at = Some(match self.last_quote_at {
            Some(prev) if prev > at => prev,
            _ => at,
        });
        self.last_updated = Utc::now();
    }

    pub fn contains_statement(&self, text: &str) -> bool {
        let needle = normalize_statement(text);
        self.learned_statements
            .iter()
            .any(|s| s.normalized() == needle)
    }

    /// Most recent activity of any kind, used when no quote was recorded
    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        self.last_quote_at
            .or_else(|| self.accepted_samples.back().map(|s| s.at))
    }
}

fn push_capped<T>(buffer: &mut VecDeque<T>, item: T, cap: usize) {
    buffer.push_back(item);
    while buffer.len() > cap {
        buffer.pop_front();
    }
}

/// The persisted aggregate: one per contractor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeDocument {
    pub schema_version: u32,
    pub contractor_id: ContractorId,
    pub categories: BTreeMap<JobCategory, CategoryKnowledge>,

    /// Created on the first correction
    pub dna: Option<ContractorDna>,

    /// Contractor-wide pricing philosophy
    pub philosophy: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Default for KnowledgeDocument {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            contractor_id: ContractorId::default(),
            categories: BTreeMap::new(),
            dna: None,
            philosophy: None,
            updated_at: Utc::now(),
        }
    }
}

impl KnowledgeDocument {
    pub fn new(contractor_id: ContractorId) -> Self {
        Self {
            contractor_id,
            ..Default::default()
        }
    }

    /// Default-fill step applied on every load
    ///
    /// Returns the number of repairs made.
    pub fn normalize(&mut self, config: &LearningConfig) -> usize {
        let mut repairs = 0;

        if self.schema_version < SCHEMA_VERSION {
            self.schema_version = SCHEMA_VERSION;
            repairs += 1;
        }

        for (key, record) in self.categories.iter_mut() {
            if record.category != *key {
                record.category = key.clone();
                repairs += 1;
            }
            if !record.confidence.is_finite() || !(0.0..=1.0).contains(&record.confidence) {
                record.confidence = if record.confidence.is_finite() {
                    record.confidence.clamp(0.0, 1.0)
                } else {
                    config.confidence.seed
                };
                repairs += 1;
            }
            while record.correction_magnitudes.len() > config.knowledge.magnitude_window {
                record.correction_magnitudes.pop_front();
                repairs += 1;
            }
            while record.accepted_samples.len() > config.knowledge.accepted_sample_window {
                record.accepted_samples.pop_front();
                repairs += 1;
            }
            while record.accepted_quote_ids.len() > config.knowledge.accepted_quote_window {
                record.accepted_quote_ids.pop_front();
                repairs += 1;
            }
            for statement in record.learned_statements.iter_mut() {
                if statement.category.is_empty() {
                    statement.category = key.clone();
                    repairs += 1;
                }
            }
        }

        if let Some(dna) = self.dna.as_mut() {
            repairs += dna.normalize();
        }

        repairs
    }
}
