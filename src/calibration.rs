// Confidence Calibration
//
// Recomputes a category's confidence from four independent dimensions:
// - Data (20%): log of quote volume, saturating near 100 quotes
// - Accuracy (40%): acceptance rate damped by average correction size
// - Recency (25%): exponential decay with a 30-day half-life
// - Coverage (15%): normalized entropy of the complexity distribution
//
// Increment-based updates (+0.02 per correction, +0.05 per acceptance) are
// proposals; `finalize` passes them through the accuracy ceiling
// min(0.95, acceptance_rate + 0.15) before anything is stored.

use crate::config::ConfidenceConfig;
use crate::types::{CategoryKnowledge, Complexity, ConfidenceDimensions, ConfidenceTier};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Threshold-derived caveat about a category's confidence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CalibrationWarning {
    StaleData { days_since_last_quote: f64 },
    LowComplexCoverage { complex_share: f64 },
    HighCorrectionRate { correction_rate: f64 },
    ThinSample { quote_count: u64 },
}

impl std::fmt::Display for CalibrationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CalibrationWarning::StaleData {
                days_since_last_quote,
            } => write!(
                f,
                "Stale data: last quote was {:.0} days ago, prices may have moved",
                days_since_last_quote
            ),
            CalibrationWarning::LowComplexCoverage { complex_share } => write!(
                f,
                "Low complex-job coverage: only {:.0}% of quotes were complex jobs",
                complex_share * 100.0
            ),
            CalibrationWarning::HighCorrectionRate { correction_rate } => write!(
                f,
                "High correction rate: {:.0}% of quotes needed edits",
                correction_rate * 100.0
            ),
            CalibrationWarning::ThinSample { quote_count } => write!(
                f,
                "Thin sample: only {} quotes in this category",
                quote_count
            ),
        }
    }
}

/// Output of one calibration pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationReport {
    pub dimensions: ConfidenceDimensions,

    /// Upper bound that applied to this record
    pub ceiling: f64,
    pub warnings: Vec<CalibrationWarning>,
}

/// Pure calibration over a category record
#[derive(Debug, Clone, Default)]
pub struct ConfidenceCalibrator {
    config: ConfidenceConfig,
}

impl ConfidenceCalibrator {
    pub fn new(config: ConfidenceConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ConfidenceConfig {
        &self.config
    }

    /// Compute all dimensions, the ceiling-bounded overall score and warnings
    pub fn calibrate(&self, record: &CategoryKnowledge, now: DateTime<Utc>) -> CalibrationReport {
        let data = self.data_dimension(record.quote_count);
        let accuracy = self.accuracy_dimension(record);
        let recency = self.recency_dimension(record, now);
        let coverage = self.coverage_dimension(record);

        let weighted = data * self.config.weight_data
            + accuracy * self.config.weight_accuracy
            + recency * self.config.weight_recency
            + coverage * self.config.weight_coverage;

        let ceiling = self.ceiling(record);
        let overall = self.bound(weighted, ceiling, record);

        CalibrationReport {
            dimensions: ConfidenceDimensions {
                data,
                accuracy,
                recency,
                coverage,
                overall,
                tier: ConfidenceTier::from_score(overall),
                computed_at: Some(now),
            },
            ceiling,
            warnings: self.warnings(record, now),
        }
    }

    /// Raw increment step, before any ceiling
    pub fn propose(&self, current: f64, increment: f64) -> f64 {
        current + increment
    }

    /// Apply an increment proposal to the record and recalibrate
    ///
    /// Stores both the ceiling-bounded incremental confidence and the
    /// recomputed dimension cache.
    pub fn finalize(
        &self,
        record: &mut CategoryKnowledge,
        increment: f64,
        now: DateTime<Utc>,
    ) -> CalibrationReport {
        let proposal = self.propose(record.confidence, increment);
        let report = self.calibrate(record, now);
        record.confidence = self.bound(proposal, report.ceiling, record);
        record.confidence_dimensions = report.dimensions.clone();
        report
    }

    /// Logarithmic in quote count, 1.0 at `data_saturation_quotes`
    pub fn data_dimension(&self, quote_count: u64) -> f64 {
        let saturation = (1.0 + self.config.data_saturation_quotes as f64).ln();
        ((1.0 + quote_count as f64).ln() / saturation).min(1.0)
    }

    /// Acceptance rate times a correction-magnitude penalty
    ///
    /// Falls back to `insufficient_accuracy` below `accuracy_min_signals`.
    pub fn accuracy_dimension(&self, record: &CategoryKnowledge) -> f64 {
        if record.total_signals() < self.config.accuracy_min_signals {
            return self.config.insufficient_accuracy;
        }
        let rate = record.acceptance_rate().unwrap_or(0.0);
        // 15% average correction -> x0.87
        let penalty = 1.0 / (1.0 + record.avg_abs_magnitude().unwrap_or(0.0) / 100.0);
        (rate * penalty).clamp(0.0, 1.0)
    }

    /// 0.5 ^ (days / half-life); 0 when the category has no activity
    pub fn recency_dimension(&self, record: &CategoryKnowledge, now: DateTime<Utc>) -> f64 {
        match days_since(record.last_activity(), now) {
            Some(days) => 0.5_f64
                .powf(days / self.config.recency_half_life_days)
                .clamp(0.0, 1.0),
            None => 0.0,
        }
    }

    /// Shannon entropy of the complexity mix, normalized to [0, 1]
    pub fn coverage_dimension(&self, record: &CategoryKnowledge) -> f64 {
        let total: u64 = record.complexity_distribution.values().sum();
        if total == 0 {
            return 0.0;
        }
        let entropy: f64 = Complexity::ALL
            .iter()
            .filter_map(|c| record.complexity_distribution.get(c))
            .filter(|count| **count > 0)
            .map(|count| {
                let p = *count as f64 / total as f64;
                -p * p.ln()
            })
            .sum();
        (entropy / (Complexity::ALL.len() as f64).ln()).clamp(0.0, 1.0)
    }

    /// min(ceiling_max, acceptance_rate + offset) once enough signals exist
    pub fn ceiling(&self, record: &CategoryKnowledge) -> f64 {
        match record.acceptance_rate() {
            Some(rate) if record.total_signals() >= self.config.ceiling_min_signals => self
                .config
                .ceiling_max
                .min(rate + self.config.ceiling_offset),
            _ => self.config.ceiling_max,
        }
    }

    pub fn warnings(&self, record: &CategoryKnowledge, now: DateTime<Utc>) -> Vec<CalibrationWarning> {
        let mut warnings = Vec::new();

        if let Some(days) = days_since(record.last_activity(), now) {
            if days > self.config.stale_after_days {
                warnings.push(CalibrationWarning::StaleData {
                    days_since_last_quote: days,
                });
            }
        }

        let total: u64 = record.complexity_distribution.values().sum();
        if total >= 10 {
            let complex = record
                .complexity_distribution
                .get(&Complexity::Complex)
                .copied()
                .unwrap_or(0);
            let share = complex as f64 / total as f64;
            if share < self.config.min_complex_share {
                warnings.push(CalibrationWarning::LowComplexCoverage {
                    complex_share: share,
                });
            }
        }

        if record.total_signals() >= self.config.ceiling_min_signals {
            let rate = record.correction_count as f64 / record.total_signals() as f64;
            if rate > self.config.high_correction_rate {
                warnings.push(CalibrationWarning::HighCorrectionRate {
                    correction_rate: rate,
                });
            }
        }

        if record.quote_count < self.config.thin_sample_quotes {
            warnings.push(CalibrationWarning::ThinSample {
                quote_count: record.quote_count,
            });
        }

        warnings
    }

    /// Clamp into [0, ceiling], logging anything that needed clamping
    fn bound(&self, value: f64, ceiling: f64, record: &CategoryKnowledge) -> f64 {
        if !value.is_finite() {
            warn!(
                category = %record.category,
                "Calibration anomaly: non-finite confidence, resetting to 0"
            );
            return 0.0;
        }
        if value < 0.0 || value > 1.0 {
            warn!(
                category = %record.category,
                value,
                "Calibration anomaly: confidence outside [0, 1], clamping"
            );
        } else if value > ceiling {
            tracing::debug!(
                category = %record.category,
                value,
                ceiling,
                "Confidence held at accuracy ceiling"
            );
        }
        value.clamp(0.0, ceiling.clamp(0.0, 1.0))
    }
}

fn days_since(then: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Option<f64> {
    then.map(|t| (now.signed_duration_since(t).num_seconds() as f64 / 86400.0).max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::JobCategory;
    use chrono::Duration as ChronoDuration;

    fn calibrator() -> ConfidenceCalibrator {
        ConfidenceCalibrator::default()
    }

    fn record_with(
        quotes: u64,
        acceptances: u64,
        corrections: u64,
        magnitude: f64,
        days_since_quote: i64,
    ) -> CategoryKnowledge {
        let now = Utc::now();
        let mut record = CategoryKnowledge::new(JobCategory::new("deck"), 0.5);
        record.quote_count = quotes;
        record.acceptance_count = acceptances;
        record.correction_count = corrections;
        for _ in 0..corrections.min(20) {
            record.push_magnitude(magnitude, 20);
        }
        record.last_quote_at = Some(now - ChronoDuration::days(days_since_quote));
        record
    }

    #[test]
    fn test_data_dimension_saturates() {
        let c = calibrator();
        assert_eq!(c.data_dimension(0), 0.0);
        assert!(c.data_dimension(10) < c.data_dimension(50));
        assert!((c.data_dimension(100) - 1.0).abs() < 1e-9);
        assert_eq!(c.data_dimension(10_000), 1.0);
        // Diminishing returns
        let early = c.data_dimension(10) - c.data_dimension(0);
        let late = c.data_dimension(100) - c.data_dimension(90);
        assert!(early > late * 10.0);
    }

    #[test]
    fn test_accuracy_insufficient_evidence() {
        let record = record_with(2, 1, 1, 5.0, 0);
        assert_eq!(calibrator().accuracy_dimension(&record), 0.3);
    }

    #[test]
    fn test_high_volume_low_accuracy_lands_medium() {
        // 100 quotes, 50 acceptances, 50 corrections averaging 15%
        let mut record = record_with(100, 50, 50, 15.0, 0);
        record.complexity_distribution.insert(Complexity::Simple, 40);
        record.complexity_distribution.insert(Complexity::Medium, 40);
        record.complexity_distribution.insert(Complexity::Complex, 20);

        let report = calibrator().calibrate(&record, Utc::now());
        assert!((report.dimensions.accuracy - 0.43).abs() < 0.01);
        assert_eq!(report.dimensions.tier, ConfidenceTier::Medium);
        assert!(report
            .warnings
            .iter()
            .any(|w| matches!(w, CalibrationWarning::HighCorrectionRate { .. })));
    }

    #[test]
    fn test_recency_two_half_lives() {
        let now = Utc::now();
        let record = record_with(30, 20, 2, 3.0, 60);
        let recency = calibrator().recency_dimension(&record, now);
        assert!((recency - 0.25).abs() < 0.01);

        let report = calibrator().calibrate(&record, now);
        assert!(report
            .warnings
            .iter()
            .any(|w| matches!(w, CalibrationWarning::StaleData { .. })));
    }

    #[test]
    fn test_coverage_single_level_is_zero() {
        let mut record = record_with(50, 0, 0, 0.0, 0);
        record.complexity_distribution.insert(Complexity::Simple, 50);
        assert_eq!(calibrator().coverage_dimension(&record), 0.0);

        record.complexity_distribution.insert(Complexity::Medium, 50);
        record.complexity_distribution.insert(Complexity::Complex, 50);
        assert!((calibrator().coverage_dimension(&record) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_ceiling_applies_after_five_signals() {
        let c = calibrator();
        let few = record_with(4, 1, 3, 10.0, 0);
        assert_eq!(c.ceiling(&few), 0.95);

        let enough = record_with(10, 2, 3, 10.0, 0);
        assert!((c.ceiling(&enough) - 0.55).abs() < 1e-9);
    }

    #[test]
    fn test_finalize_clamps_runaway_increments() {
        let c = calibrator();
        let mut record = record_with(10, 2, 8, 10.0, 0);
        record.confidence = 0.9;

        c.finalize(&mut record, 0.05, Utc::now());
        // ceiling = 0.2 + 0.15
        assert!((record.confidence - 0.35).abs() < 1e-9);
        assert!(record.confidence_dimensions.overall <= 0.35 + 1e-9);
    }

    #[test]
    fn test_propose_and_finalize_are_distinct_steps() {
        let c = calibrator();
        let mut record = record_with(1, 0, 0, 0.0, 0);
        assert!((c.propose(0.5, 0.05) - 0.55).abs() < 1e-9);

        c.finalize(&mut record, 0.05, Utc::now());
        assert!((record.confidence - 0.55).abs() < 1e-9);
    }

    #[test]
    fn test_thin_sample_warning() {
        let record = record_with(2, 0, 0, 0.0, 0);
        let warnings = calibrator().warnings(&record, Utc::now());
        assert!(warnings
            .iter()
            .any(|w| matches!(w, CalibrationWarning::ThinSample { quote_count: 2 })));
    }

    #[test]
    fn test_no_activity_has_zero_recency() {
        let record = CategoryKnowledge::new(JobCategory::new("deck"), 0.5);
        assert_eq!(calibrator().recency_dimension(&record, Utc::now()), 0.0);
    }
}
