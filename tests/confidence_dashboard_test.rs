//! Confidence calibration as seen through the dashboard

mod common;

use chrono::{Duration as ChronoDuration, Utc};
use common::*;
use quotewise_core::{CalibrationWarning, ConfidenceTier, ContractorId, JobCategory};

#[tokio::test]
async fn test_high_volume_with_frequent_corrections_stays_medium() {
    let engine = create_test_engine(ScriptedExtractor::new(&[]));

    for i in 0..100 {
        engine
            .process(generated("c-1", &format!("q-{i}"), "deck", 1000.0))
            .await;
    }
    for i in 0..50 {
        engine.process(sent("c-1", &format!("q-{i}"), "deck", 1000.0)).await;
    }
    for i in 50..100 {
        engine
            .process(edited("c-1", &format!("q-{i}"), "deck", 1000.0, 1150.0))
            .await;
    }

    let report = engine.dashboard(&ContractorId::new("c-1")).await.unwrap();
    assert_eq!(report.categories.len(), 1);
    let deck = &report.categories[0];
    assert_eq!(deck.quote_count, 100);
    assert_eq!(deck.acceptance_count, 50);
    assert_eq!(deck.correction_count, 50);

    assert!((deck.dimensions.accuracy - 0.43).abs() < 0.01);
    assert!((deck.ceiling - 0.65).abs() < 1e-9);
    assert!(deck.dimensions.overall <= deck.ceiling);
    assert_eq!(deck.dimensions.tier, ConfidenceTier::Medium);
    assert!(deck.confidence <= deck.ceiling + 1e-9);
    assert!(deck
        .warnings
        .iter()
        .any(|w| matches!(w, CalibrationWarning::HighCorrectionRate { .. })));
}

#[tokio::test]
async fn test_quiet_category_reports_stale_data() {
    let engine = create_test_engine(ScriptedExtractor::new(&[]));
    let sixty_days_ago = Utc::now() - ChronoDuration::days(60);

    for i in 0..10 {
        let mut quote = generated("c-1", &format!("q-{i}"), "fence", 3000.0);
        quote.occurred_at = sixty_days_ago;
        engine.process(quote).await;

        let mut accepted = sent("c-1", &format!("q-{i}"), "fence", 3000.0);
        accepted.occurred_at = sixty_days_ago;
        engine.process(accepted).await;
    }

    let report = engine.dashboard(&ContractorId::new("c-1")).await.unwrap();
    let fence = &report.categories[0];
    assert!((fence.dimensions.recency - 0.25).abs() < 0.01);
    // Every quote was accepted, yet staleness is flagged
    assert!(fence.dimensions.accuracy > 0.9);
    assert!(fence
        .warnings
        .iter()
        .any(|w| matches!(w, CalibrationWarning::StaleData { .. })));
}

#[tokio::test]
async fn test_dashboard_includes_dna_and_layers() {
    let extractor = ScriptedExtractor::new(&[&[
        "Add 15% for second story access",
        "Give repeat customers a 5% discount on labor",
    ]]);
    let engine = create_test_engine(extractor);
    let id = ContractorId::new("c-1");

    engine
        .process(edited("c-1", "q-1", "deck", 1000.0, 1150.0))
        .await;
    engine
        .store()
        .set_guidance(&id, &JobCategory::new("deck"), Some("Quote composite by default".into()))
        .await
        .unwrap();
    engine
        .store()
        .set_philosophy(&id, Some("Price for quality, not volume".into()))
        .await
        .unwrap();

    let report = engine.dashboard(&id).await.unwrap();
    assert_eq!(report.philosophy.as_deref(), Some("Price for quality, not volume"));
    assert!(report.categories[0].has_guidance);
    assert_eq!(report.categories[0].statement_count, 2);

    let dna = report.dna.expect("dna created by correction");
    assert_eq!(dna.universal_patterns, 2);
    assert_eq!(dna.overridden_patterns, 0);
    assert!(dna.dna_confidence > 0.0 && dna.dna_confidence < 1.0);

    let context = engine
        .build_context(&id, &JobCategory::new("deck"), "Second story deck")
        .await
        .unwrap();
    assert_eq!(context.tailored_guidance.as_deref(), Some("Quote composite by default"));
    assert_eq!(context.philosophy.as_deref(), Some("Price for quality, not volume"));
}

#[tokio::test]
async fn test_unknown_contractor_has_empty_dashboard() {
    let engine = create_test_engine(ScriptedExtractor::new(&[]));
    let report = engine.dashboard(&ContractorId::new("nobody")).await.unwrap();
    assert!(report.categories.is_empty());
    assert!(report.dna.is_none());
    assert!(report.philosophy.is_none());
}
