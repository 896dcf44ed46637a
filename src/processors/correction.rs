//! Correction processing
//!
//! Turns a contractor's edit of a generated quote into learned statements:
//! diff the quotes, ask the extraction service for candidate rules, filter
//! them through quality scoring with one feedback retry, append the
//! survivors (evicting by relevance when full), record the correction signal
//! and recalibrate, then hand the accepted rules to pattern transfer.

use crate::calibration::ConfidenceCalibrator;
use crate::config::LearningConfig;
use crate::error::{QuotewiseError, Result};
use crate::quality::{QualityScore, QualityScorer};
use crate::quote::{Quote, QuoteDiff};
use crate::relevance::RelevanceScorer;
use crate::services::{ExtractionRequest, ExtractionService, RejectionFeedback};
use crate::storage::KnowledgeStore;
use crate::transfer::{PatternTransferEngine, TransferReport};
use crate::types::{
    normalize_statement, ConfidenceTier, ContractorId, JobCategory, LearningStatement,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// One contractor edit
#[derive(Debug, Clone)]
pub struct CorrectionInput {
    pub contractor_id: ContractorId,
    pub category: JobCategory,
    pub original: Quote,
    pub edited: Quote,
    pub notes: Option<String>,
    pub job_description: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CorrectionOutcome {
    /// The edit changed nothing
    NoChanges,
    Learned(CorrectionReport),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionReport {
    pub magnitude_percent: f64,
    pub added: Vec<LearningStatement>,

    /// Accepted candidates already known to the category
    pub duplicates: usize,
    pub evicted: Vec<LearningStatement>,
    pub rejected: Vec<RejectionFeedback>,

    /// No candidate passed quality scoring; best ones kept anyway
    pub fallback_used: bool,
    pub attempts: u32,

    /// Set when extraction failed and only the signal was recorded
    pub extraction_error: Option<String>,
    pub confidence: f64,
    pub tier: ConfidenceTier,
    pub transfer: Option<TransferReport>,
}

/// Result of the extract-score-retry loop
#[derive(Debug, Default)]
struct QualityLoop {
    accepted: Vec<(String, QualityScore)>,
    rejected: Vec<RejectionFeedback>,
    fallback_used: bool,
    attempts: u32,
}

pub struct CorrectionProcessor {
    store: Arc<KnowledgeStore>,
    extractor: Arc<dyn ExtractionService>,
    transfer: Arc<PatternTransferEngine>,
    quality: QualityScorer,
    relevance: RelevanceScorer,
    calibrator: ConfidenceCalibrator,
    config: Arc<LearningConfig>,
}

impl CorrectionProcessor {
    pub fn new(
        store: Arc<KnowledgeStore>,
        extractor: Arc<dyn ExtractionService>,
        transfer: Arc<PatternTransferEngine>,
        config: Arc<LearningConfig>,
    ) -> Self {
        Self {
            store,
            extractor,
            transfer,
            quality: QualityScorer::new(config.quality.clone()),
            relevance: RelevanceScorer::new(config.relevance.clone()),
            calibrator: ConfidenceCalibrator::new(config.confidence.clone()),
            config,
        }
    }

    pub async fn process(&self, input: CorrectionInput) -> Result<CorrectionOutcome> {
        let diff = QuoteDiff::between(&input.original, &input.edited);
        if diff.is_noop() {
            debug!(
                contractor = %input.contractor_id,
                category = %input.category,
                "Edit changed nothing, skipping"
            );
            return Ok(CorrectionOutcome::NoChanges);
        }
        let magnitude = diff.magnitude_percent;

        let existing = self
            .store
            .get_category(&input.contractor_id, &input.category)
            .await?;
        let request = ExtractionRequest {
            contractor_id: input.contractor_id.clone(),
            category: input.category.clone(),
            diff,
            job_description: input.job_description.clone(),
            contractor_notes: input.notes.clone(),
            existing_statements: existing
                .learned_statements
                .iter()
                .map(|s| s.text.clone())
                .collect(),
            tailored_guidance: existing.tailored_guidance.clone(),
            philosophy: self.store.philosophy(&input.contractor_id).await?,
            rejection_feedback: Vec::new(),
            attempt: 1,
        };

        let quality_loop = match self.run_quality_loop(request).await {
            Ok(result) => result,
            Err(e) => {
                warn!(
                    contractor = %input.contractor_id,
                    category = %input.category,
                    "Extraction failed, learning skipped for this correction: {}",
                    e
                );
                return self.record_signal_only(&input, magnitude, e).await;
            }
        };

        let query = input.job_description.clone().unwrap_or_default();
        let category = input.category.clone();
        let max_statements = self.config.knowledge.max_statements;
        let magnitude_window = self.config.knowledge.magnitude_window;
        let increment = self.config.confidence.correction_increment;
        let candidates = quality_loop.accepted.clone();

        let (added, duplicates, dropped, evicted, confidence, tier) = self
            .store
            .update_category(&input.contractor_id, &input.category, |record| {
                let mut duplicates = 0;
                let mut seen: HashSet<String> =
                    record.learned_statements.iter().map(|s| s.normalized()).collect();
                let mut fresh = Vec::new();
                for (text, score) in candidates {
                    if seen.insert(normalize_statement(&text)) {
                        fresh.push((text, score));
                    } else {
                        duplicates += 1;
                    }
                }

                // A single correction never adds more than the category can hold
                fresh.sort_by(|a, b| b.1.total.cmp(&a.1.total));
                let dropped: Vec<String> = fresh
                    .split_off(fresh.len().min(max_statements))
                    .into_iter()
                    .map(|(text, _)| text)
                    .collect();

                let mut added = Vec::new();
                for (text, score) in fresh {
                    let statement = LearningStatement::new(text, score.total, category.clone());
                    record.learned_statements.push(statement.clone());
                    added.push(statement);
                }

                let protected: HashSet<Uuid> = added.iter().map(|s| s.id).collect();
                let evicted = self.relevance.evict_to_cap(
                    &mut record.learned_statements,
                    max_statements,
                    &query,
                    &protected,
                );

                record.correction_count += 1;
                record.push_magnitude(magnitude, magnitude_window);
                let report = self.calibrator.finalize(record, increment, Utc::now());
                (added, duplicates, dropped, evicted, record.confidence, report.dimensions.tier)
            })
            .await?;

        for statement in &added {
            info!(
                contractor = %input.contractor_id,
                category = %input.category,
                score = statement.quality_score,
                statement = %statement.text,
                "Learned statement"
            );
        }
        if !dropped.is_empty() {
            warn!(
                contractor = %input.contractor_id,
                category = %input.category,
                kept = added.len(),
                dropped = dropped.len(),
                "Correction produced more statements than the category holds"
            );
        }
        for statement in &evicted {
            info!(
                contractor = %input.contractor_id,
                category = %input.category,
                statement = %statement.text,
                "Evicted lowest-relevance statement"
            );
        }

        let accepted_texts: Vec<String> = quality_loop
            .accepted
            .iter()
            .filter(|(text, _)| !dropped.contains(text))
            .map(|(text, _)| text.clone())
            .collect();
        let transfer = if accepted_texts.is_empty() {
            None
        } else {
            match self
                .transfer
                .process_correction(&input.contractor_id, &input.category, &accepted_texts)
                .await
            {
                Ok(report) => Some(report),
                Err(e) => {
                    warn!(
                        contractor = %input.contractor_id,
                        category = %input.category,
                        "Pattern transfer failed: {}",
                        e
                    );
                    None
                }
            }
        };

        Ok(CorrectionOutcome::Learned(CorrectionReport {
            magnitude_percent: magnitude,
            added,
            duplicates,
            evicted,
            rejected: quality_loop.rejected,
            fallback_used: quality_loop.fallback_used,
            attempts: quality_loop.attempts,
            extraction_error: None,
            confidence,
            tier,
            transfer,
        }))
    }

    /// Keep the correction signal when no statements could be extracted
    async fn record_signal_only(
        &self,
        input: &CorrectionInput,
        magnitude: f64,
        error: QuotewiseError,
    ) -> Result<CorrectionOutcome> {
        let magnitude_window = self.config.knowledge.magnitude_window;
        let increment = self.config.confidence.correction_increment;
        let (confidence, tier) = self
            .store
            .update_category(&input.contractor_id, &input.category, |record| {
                record.correction_count += 1;
                record.push_magnitude(magnitude, magnitude_window);
                let report = self.calibrator.finalize(record, increment, Utc::now());
                (record.confidence, report.dimensions.tier)
            })
            .await?;

        Ok(CorrectionOutcome::Learned(CorrectionReport {
            magnitude_percent: magnitude,
            added: Vec::new(),
            duplicates: 0,
            evicted: Vec::new(),
            rejected: Vec::new(),
            fallback_used: false,
            attempts: 0,
            extraction_error: Some(error.to_string()),
            confidence,
            tier,
            transfer: None,
        }))
    }

    /// Extract, score, and retry once with feedback if anything was rejected
    async fn run_quality_loop(&self, mut request: ExtractionRequest) -> Result<QualityLoop> {
        let mut result = QualityLoop::default();
        let mut accepted_keys = HashSet::new();
        let mut pool: Vec<(String, QualityScore)> = Vec::new();
        let max_attempts = self.config.quality.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            request.attempt = attempt;
            let candidates = match self.extract_with_retry(&request).await {
                Ok(candidates) => candidates,
                // A failed retry still leaves the first attempt's candidates
                Err(e) if attempt > 1 => {
                    warn!(category = %request.category, attempt, "Retry extraction failed: {}", e);
                    break;
                }
                Err(e) => return Err(e),
            };
            result.attempts = attempt;

            let mut feedback = Vec::new();
            for candidate in candidates {
                let score = self.quality.score(&candidate);
                if score.tier.is_accepted() {
                    if score.total < self.config.quality.accept_threshold {
                        info!(
                            category = %request.category,
                            score = score.total,
                            statement = %candidate,
                            "Accepted statement with borderline quality"
                        );
                    }
                    if accepted_keys.insert(normalize_statement(&candidate)) {
                        result.accepted.push((candidate, score));
                    }
                } else {
                    debug!(
                        category = %request.category,
                        score = score.total,
                        statement = %candidate,
                        "Rejected candidate statement"
                    );
                    feedback.push(RejectionFeedback {
                        statement: candidate.clone(),
                        score: score.total,
                        issues: score.issues.clone(),
                    });
                    pool.push((candidate, score));
                }
            }

            if feedback.is_empty() {
                break;
            }
            result.rejected.extend(feedback.iter().cloned());
            request.rejection_feedback = feedback;
        }

        if result.accepted.is_empty() && !pool.is_empty() {
            pool.sort_by(|a, b| b.1.total.cmp(&a.1.total));
            let mut seen = HashSet::new();
            pool.retain(|(text, _)| seen.insert(normalize_statement(text)));
            pool.truncate(self.config.quality.max_fallback_statements);
            warn!(
                category = %request.category,
                attempts = result.attempts,
                kept = pool.len(),
                best_score = pool.first().map(|(_, s)| s.total).unwrap_or(0),
                "No candidate passed quality scoring, keeping best available"
            );
            result.accepted = pool;
            result.fallback_used = true;
        }

        Ok(result)
    }

    /// One extraction call under the configured timeout, retried on transient errors
    async fn extract_with_retry(&self, request: &ExtractionRequest) -> Result<Vec<String>> {
        let timeout = self.config.extraction.timeout;
        let mut last_error = None;

        for call in 0..=self.config.extraction.retries {
            match tokio::time::timeout(timeout, self.extractor.extract(request)).await {
                Ok(Ok(statements)) => return Ok(statements),
                Ok(Err(e)) => {
                    warn!(category = %request.category, call, "Extraction call failed: {}", e);
                    if !e.is_transient() {
                        return Err(e);
                    }
                    last_error = Some(e);
                }
                Err(_) => {
                    warn!(category = %request.category, call, "Extraction call timed out after {:?}", timeout);
                    last_error = Some(QuotewiseError::ExtractionTimeout(timeout));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| QuotewiseError::Extraction("no extraction attempted".to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quote::LineItem;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Returns one scripted batch per call, then empty batches
    struct Scripted {
        batches: Mutex<Vec<Vec<String>>>,
        requests: Mutex<Vec<ExtractionRequest>>,
    }

    impl Scripted {
        fn new(batches: &[&[&str]]) -> Arc<Self> {
            Arc::new(Self {
                batches: Mutex::new(
                    batches
                        .iter()
                        .rev()
                        .map(|b| b.iter().map(|s| s.to_string()).collect())
                        .collect(),
                ),
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ExtractionService for Scripted {
        async fn extract(&self, request: &ExtractionRequest) -> Result<Vec<String>> {
            self.requests.lock().unwrap().push(request.clone());
            Ok(self.batches.lock().unwrap().pop().unwrap_or_default())
        }
    }

    fn processor(extractor: Arc<Scripted>) -> (Arc<KnowledgeStore>, CorrectionProcessor) {
        let config = Arc::new(LearningConfig::default());
        let store = Arc::new(KnowledgeStore::in_memory(config.clone()));
        let transfer = Arc::new(PatternTransferEngine::new(store.clone(), config.clone()));
        let processor = CorrectionProcessor::new(store.clone(), extractor, transfer, config);
        (store, processor)
    }

    fn input(edited_total: f64) -> CorrectionInput {
        CorrectionInput {
            contractor_id: ContractorId::new("c-1"),
            category: JobCategory::new("deck"),
            original: Quote::new(vec![LineItem::new("Labor", 1000.0)]),
            edited: Quote::new(vec![LineItem::new("Labor", edited_total)]),
            notes: None,
            job_description: None,
            occurred_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_noop_edit_has_no_side_effects() {
        let extractor = Scripted::new(&[&["Add 15% for second story access"]]);
        let (store, processor) = processor(extractor.clone());

        let outcome = processor.process(input(1000.0)).await.unwrap();
        assert_eq!(outcome, CorrectionOutcome::NoChanges);
        assert!(extractor.requests.lock().unwrap().is_empty());
        let record = store
            .get_category(&ContractorId::new("c-1"), &JobCategory::new("deck"))
            .await
            .unwrap();
        assert_eq!(record.correction_count, 0);
    }

    #[tokio::test]
    async fn test_rejected_candidates_trigger_one_retry_with_feedback() {
        let extractor = Scripted::new(&[
            &["Maybe be careful with pricing"],
            &["Add 15% for second story access"],
        ]);
        let (_, processor) = processor(extractor.clone());

        let CorrectionOutcome::Learned(report) = processor.process(input(1150.0)).await.unwrap() else {
            panic!("expected learning");
        };
        assert_eq!(report.attempts, 2);
        assert_eq!(report.added.len(), 1);
        assert!(!report.fallback_used);
        assert!((report.magnitude_percent - 15.0).abs() < 1e-9);

        let requests = extractor.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].rejection_feedback.is_empty());
        assert_eq!(requests[1].rejection_feedback.len(), 1);
        assert_eq!(requests[1].attempt, 2);
    }

    #[tokio::test]
    async fn test_fallback_after_two_failed_attempts() {
        let extractor = Scripted::new(&[
            &["Maybe be careful with pricing"],
            &["Probably charge more for decks sometimes"],
        ]);
        let (_, processor) = processor(extractor);

        let CorrectionOutcome::Learned(report) = processor.process(input(1150.0)).await.unwrap() else {
            panic!("expected learning");
        };
        assert!(report.fallback_used);
        assert_eq!(report.added.len(), 2);
        assert_eq!(report.rejected.len(), 2);
    }

    #[tokio::test]
    async fn test_full_category_evicts_lowest_relevance_not_oldest() {
        let extractor = Scripted::new(&[&["Charge $8 per sqft for composite boards"]]);
        let (store, processor) = processor(extractor);
        let id = ContractorId::new("c-1");
        let deck = JobCategory::new("deck");

        let aged = |text: &str, days: i64| {
            let mut statement = LearningStatement::new(text, 80, deck.clone());
            statement.created_at = Utc::now() - chrono::Duration::days(days);
            statement
        };
        let mut seeded = vec![
            aged("Always charge a minimum of $300 per job", 400),
            aged("Use stainless screws near saltwater", 100),
        ];
        seeded.extend((0..18).map(|i| aged(&format!("Add {}% for railing style {}", i + 2, i), 18 - i)));
        store
            .update_category(&id, &deck, |record| record.learned_statements = seeded)
            .await
            .unwrap();

        let CorrectionOutcome::Learned(report) = processor.process(input(1150.0)).await.unwrap() else {
            panic!("expected learning");
        };
        assert_eq!(report.added.len(), 1);
        assert_eq!(report.evicted.len(), 1);
        assert_eq!(report.evicted[0].text, "Use stainless screws near saltwater");

        let record = store.get_category(&id, &deck).await.unwrap();
        assert_eq!(record.learned_statements.len(), 20);
        assert!(record
            .learned_statements
            .iter()
            .any(|s| s.text == "Always charge a minimum of $300 per job"));
        assert!(record
            .learned_statements
            .iter()
            .any(|s| s.text == "Charge $8 per sqft for composite boards"));
    }

    #[tokio::test]
    async fn test_oversized_batch_is_capped_to_category_limit() {
        let texts: Vec<String> = (0..25)
            .map(|i| format!("Add {}% for second story access", 10 + i))
            .collect();
        let batch: Vec<&str> = texts.iter().map(String::as_str).collect();
        let extractor = Scripted::new(&[batch.as_slice()]);
        let (store, processor) = processor(extractor);

        let CorrectionOutcome::Learned(report) = processor.process(input(1150.0)).await.unwrap() else {
            panic!("expected learning");
        };
        assert_eq!(report.added.len(), 20);
        assert!(report.evicted.is_empty());

        let record = store
            .get_category(&ContractorId::new("c-1"), &JobCategory::new("deck"))
            .await
            .unwrap();
        assert_eq!(record.learned_statements.len(), 20);
    }
}
