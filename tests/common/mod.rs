//! Common test utilities and helpers

#![allow(dead_code)]

use async_trait::async_trait;
use quotewise_core::{
    error::{QuotewiseError, Result},
    ContractorId, ExtractionRequest, ExtractionService, InMemoryBackend, LearningConfig,
    LearningEngine, LifecycleTransition, LineItem, Quote, QuoteLifecycleEvent,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Returns one scripted batch per call, then empty batches
pub struct ScriptedExtractor {
    batches: Mutex<VecDeque<Vec<String>>>,
    requests: Mutex<Vec<ExtractionRequest>>,
}

impl ScriptedExtractor {
    pub fn new(batches: &[&[&str]]) -> Arc<Self> {
        Arc::new(Self {
            batches: Mutex::new(
                batches
                    .iter()
                    .map(|b| b.iter().map(|s| s.to_string()).collect())
                    .collect(),
            ),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Queue another batch after construction
    pub fn push(&self, batch: &[&str]) {
        self.batches
            .lock()
            .unwrap()
            .push_back(batch.iter().map(|s| s.to_string()).collect());
    }

    pub fn requests(&self) -> Vec<ExtractionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExtractionService for ScriptedExtractor {
    async fn extract(&self, request: &ExtractionRequest) -> Result<Vec<String>> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(self.batches.lock().unwrap().pop_front().unwrap_or_default())
    }
}

/// Always fails; transient failures are retried by the processor
pub struct FailingExtractor {
    transient: bool,
    calls: AtomicU32,
}

impl FailingExtractor {
    pub fn transient() -> Arc<Self> {
        Arc::new(Self {
            transient: true,
            calls: AtomicU32::new(0),
        })
    }

    pub fn permanent() -> Arc<Self> {
        Arc::new(Self {
            transient: false,
            calls: AtomicU32::new(0),
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExtractionService for FailingExtractor {
    async fn extract(&self, _request: &ExtractionRequest) -> Result<Vec<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.transient {
            Err(QuotewiseError::LlmApi("503 overloaded".to_string()))
        } else {
            Err(QuotewiseError::Extraction("malformed response".to_string()))
        }
    }
}

/// Answers only after `delay`
pub struct SlowExtractor {
    delay: Duration,
}

impl SlowExtractor {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self { delay })
    }
}

#[async_trait]
impl ExtractionService for SlowExtractor {
    async fn extract(&self, _request: &ExtractionRequest) -> Result<Vec<String>> {
        tokio::time::sleep(self.delay).await;
        Ok(vec!["Add 15% for second story access".to_string()])
    }
}

/// Default config with a short extraction timeout
pub fn test_config() -> LearningConfig {
    let mut config = LearningConfig::default();
    config.extraction.timeout = Duration::from_millis(200);
    config
}

/// Engine over an in-memory backend
pub fn create_test_engine(extractor: Arc<dyn ExtractionService>) -> Arc<LearningEngine> {
    Arc::new(LearningEngine::new(
        Arc::new(InMemoryBackend::new()),
        extractor,
        test_config(),
    ))
}

pub fn quote(total: f64) -> Quote {
    Quote::new(vec![
        LineItem::new("Labor", total * 0.6),
        LineItem::new("Materials", total * 0.4),
    ])
}

pub fn generated(contractor: &str, quote_id: &str, category: &str, total: f64) -> QuoteLifecycleEvent {
    QuoteLifecycleEvent::new(
        ContractorId::new(contractor),
        quote_id,
        Some(category),
        quote(total),
        LifecycleTransition::Generated,
    )
}

pub fn edited(
    contractor: &str,
    quote_id: &str,
    category: &str,
    original: f64,
    edited: f64,
) -> QuoteLifecycleEvent {
    let mut event = QuoteLifecycleEvent::new(
        ContractorId::new(contractor),
        quote_id,
        Some(category),
        quote(original),
        LifecycleTransition::Edited,
    );
    event.final_quote = Some(quote(edited));
    event.was_edited = true;
    event
}

pub fn sent(contractor: &str, quote_id: &str, category: &str, total: f64) -> QuoteLifecycleEvent {
    QuoteLifecycleEvent::new(
        ContractorId::new(contractor),
        quote_id,
        Some(category),
        quote(total),
        LifecycleTransition::Sent,
    )
}

pub fn customer_accepted(
    contractor: &str,
    quote_id: &str,
    category: &str,
    total: f64,
) -> QuoteLifecycleEvent {
    let mut event = sent(contractor, quote_id, category, total);
    event.transition = LifecycleTransition::CustomerAccepted;
    event
}
