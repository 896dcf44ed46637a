// Learning Configuration
//
// Every tunable constant of the learning engine lives here: signal
// increments, the accuracy ceiling, calibration weights, quality thresholds,
// relevance weights and pattern-transfer rates. Loaded from TOML; every
// section falls back to its defaults when absent.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main learning configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningConfig {
    pub confidence: ConfidenceConfig,
    pub knowledge: KnowledgeConfig,
    pub quality: QualityConfig,
    pub relevance: RelevanceConfig,
    pub transfer: TransferConfig,
    pub extraction: ExtractionConfig,
}

/// Confidence increments, ceiling and calibration weights
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceConfig {
    /// Confidence of a freshly created category record
    pub seed: f64,

    /// Proposal step applied after a correction
    pub correction_increment: f64,

    /// Proposal step applied after an acceptance
    pub acceptance_increment: f64,

    /// Added to the acceptance rate to form the ceiling
    pub ceiling_offset: f64,

    /// Absolute ceiling, regardless of acceptance rate
    pub ceiling_max: f64,

    /// Signals required before the accuracy ceiling applies
    pub ceiling_min_signals: u64,

    pub weight_data: f64,
    pub weight_accuracy: f64,
    pub weight_recency: f64,
    pub weight_coverage: f64,

    /// Quote count at which the data dimension saturates
    pub data_saturation_quotes: u64,

    /// Signals below which accuracy falls back to `insufficient_accuracy`
    pub accuracy_min_signals: u64,
    pub insufficient_accuracy: f64,

    pub recency_half_life_days: f64,

    pub stale_after_days: f64,
    pub high_correction_rate: f64,
    pub thin_sample_quotes: u64,
    pub min_complex_share: f64,
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            seed: 0.5,
            correction_increment: 0.02,
            acceptance_increment: 0.05,
            ceiling_offset: 0.15,
            ceiling_max: 0.95,
            ceiling_min_signals: 5,
            weight_data: 0.20,
            weight_accuracy: 0.40,
            weight_recency: 0.25,
            weight_coverage: 0.15,
            data_saturation_quotes: 100,
            accuracy_min_signals: 3,
            insufficient_accuracy: 0.3,
            recency_half_life_days: 30.0,
            stale_after_days: 45.0,
            high_correction_rate: 0.4,
            thin_sample_quotes: 5,
            min_complex_share: 0.1,
        }
    }
}

/// Capacity limits of a category record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeConfig {
    pub max_statements: usize,
    pub magnitude_window: usize,
    pub accepted_sample_window: usize,

    /// Quote ids remembered per category so one quote counts once
    pub accepted_quote_window: usize,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            max_statements: 20,
            magnitude_window: 20,
            accepted_sample_window: 10,
            accepted_quote_window: 500,
        }
    }
}

/// Statement quality thresholds (0-100 scale)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    pub accept_threshold: u32,
    pub log_threshold: u32,
    pub retry_threshold: u32,

    /// Extraction attempts per correction event, including the first
    pub max_attempts: u32,

    /// Candidates kept when every attempt failed the quality bar
    pub max_fallback_statements: usize,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            accept_threshold: 60,
            log_threshold: 40,
            retry_threshold: 20,
            max_attempts: 2,
            max_fallback_statements: 3,
        }
    }
}

/// Relevance scoring weights and selection bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelevanceConfig {
    pub weight_keyword: f64,
    pub weight_recency: f64,
    pub weight_specificity: f64,
    pub weight_foundational: f64,
    pub min_relevance: f64,
    pub min_selected: usize,
    pub max_selected: usize,

    /// Relative difference above which two numeric rules conflict
    pub conflict_tolerance: f64,
}

impl Default for RelevanceConfig {
    fn default() -> Self {
        Self {
            weight_keyword: 0.40,
            weight_recency: 0.30,
            weight_specificity: 0.20,
            weight_foundational: 0.10,
            min_relevance: 0.25,
            min_selected: 3,
            max_selected: 10,
            conflict_tolerance: 0.05,
        }
    }
}

/// Cross-category pattern transfer rates
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    pub universal_base_rate: f64,
    pub partial_base_rate: f64,
    pub low_validation_penalty: f64,
    pub high_validation_boost: f64,
    pub low_validation_threshold: u64,
    pub high_validation_threshold: u64,
    pub min_inherited_confidence: f64,
    pub max_inherited_confidence: f64,

    /// Hard cap per DNA pattern list
    pub max_patterns: usize,

    /// Categories with fewer quotes than this receive DNA bootstrap
    pub bootstrap_max_quotes: u64,
    pub max_bootstrap_statements: usize,

    /// Shared keywords needed before a pattern is compared to a new rule
    pub min_keyword_overlap: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            universal_base_rate: 0.60,
            partial_base_rate: 0.40,
            low_validation_penalty: 0.7,
            high_validation_boost: 1.1,
            low_validation_threshold: 3,
            high_validation_threshold: 10,
            min_inherited_confidence: 0.30,
            max_inherited_confidence: 0.70,
            max_patterns: 50,
            bootstrap_max_quotes: 3,
            max_bootstrap_statements: 5,
            min_keyword_overlap: 2,
        }
    }
}

/// External extraction call limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    #[serde(with = "serde_duration")]
    pub timeout: Duration,

    /// Retries after a failed or timed-out call
    pub retries: u32,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            retries: 1,
        }
    }
}

// Custom serde module for Duration (serialize/deserialize as seconds)
mod serde_duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

impl LearningConfig {
    /// Load configuration from TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: LearningConfig = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let toml_str = self.to_toml()?;
        std::fs::write(path, toml_str)?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ValidationError(e.to_string()))
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        let c = &self.confidence;
        check_weights(
            "confidence",
            &[c.weight_data, c.weight_accuracy, c.weight_recency, c.weight_coverage],
        )?;
        for (name, value) in [
            ("confidence.seed", c.seed),
            ("confidence.correction_increment", c.correction_increment),
            ("confidence.acceptance_increment", c.acceptance_increment),
            ("confidence.ceiling_offset", c.ceiling_offset),
            ("confidence.ceiling_max", c.ceiling_max),
            ("confidence.insufficient_accuracy", c.insufficient_accuracy),
        ] {
            check_unit(name, value)?;
        }
        if c.recency_half_life_days <= 0.0 {
            return Err(ConfigError::ValidationError(
                "confidence.recency_half_life_days must be positive".to_string(),
            ));
        }
        if c.data_saturation_quotes == 0 {
            return Err(ConfigError::ValidationError(
                "confidence.data_saturation_quotes must be at least 1".to_string(),
            ));
        }

        let k = &self.knowledge;
        if k.max_statements == 0
            || k.magnitude_window == 0
            || k.accepted_sample_window == 0
            || k.accepted_quote_window == 0
        {
            return Err(ConfigError::ValidationError(
                "knowledge capacities must be at least 1".to_string(),
            ));
        }

        let q = &self.quality;
        if !(q.retry_threshold <= q.log_threshold
            && q.log_threshold <= q.accept_threshold
            && q.accept_threshold <= 100)
        {
            return Err(ConfigError::ValidationError(
                "quality thresholds must satisfy retry <= log <= accept <= 100".to_string(),
            ));
        }
        if q.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "quality.max_attempts must be at least 1".to_string(),
            ));
        }

        let r = &self.relevance;
        check_weights(
            "relevance",
            &[
                r.weight_keyword,
                r.weight_recency,
                r.weight_specificity,
                r.weight_foundational,
            ],
        )?;
        if r.min_selected == 0 || r.min_selected > r.max_selected {
            return Err(ConfigError::ValidationError(
                "relevance selection bounds must satisfy 1 <= min_selected <= max_selected"
                    .to_string(),
            ));
        }
        check_unit("relevance.min_relevance", r.min_relevance)?;

        let t = &self.transfer;
        check_unit("transfer.universal_base_rate", t.universal_base_rate)?;
        check_unit("transfer.partial_base_rate", t.partial_base_rate)?;
        if t.min_inherited_confidence > t.max_inherited_confidence {
            return Err(ConfigError::ValidationError(
                "transfer inherited confidence range is empty".to_string(),
            ));
        }
        if t.max_patterns == 0 {
            return Err(ConfigError::ValidationError(
                "transfer.max_patterns must be at least 1".to_string(),
            ));
        }

        if self.extraction.timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "extraction.timeout must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

fn check_weights(section: &str, weights: &[f64]) -> Result<(), ConfigError> {
    if weights.iter().any(|w| *w < 0.0) {
        return Err(ConfigError::ValidationError(format!(
            "{}: weights must be non-negative",
            section
        )));
    }
    let sum: f64 = weights.iter().sum();
    if (sum - 1.0).abs() > 1e-6 {
        return Err(ConfigError::ValidationError(format!(
            "{}: weights must sum to 1.0 (got {:.4})",
            section, sum
        )));
    }
    Ok(())
}

fn check_unit(name: &str, value: f64) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::ValidationError(format!(
            "{} must be within [0, 1] (got {})",
            name, value
        )));
    }
    Ok(())
}
