//! Cross-category transfer through contractor DNA

mod common;

use common::*;
use quotewise_core::{
    ContractorId, JobCategory, LearningOutcome, LearningStatement, Transferability,
};

#[tokio::test]
async fn test_established_rule_bootstraps_first_roofing_quote() {
    let engine = create_test_engine(ScriptedExtractor::new(&[]));
    let id = ContractorId::new("c-1");
    let deck = JobCategory::new("deck");

    // 20 deck quotes at 0.85 confidence with one universal rule
    let statement = LearningStatement::new("Add 15% for second story access", 90, deck.clone());
    engine
        .store()
        .update_category(&id, &deck, |record| {
            record.quote_count = 20;
            record.acceptance_count = 5;
            record.confidence = 0.85;
            record.learned_statements.push(statement);
        })
        .await
        .unwrap();
    engine.migration().backfill_dna(&id).await.unwrap();

    let context = engine
        .build_context(&id, &JobCategory::new("roofing"), "Replace roof on a two story house")
        .await
        .unwrap();

    assert!(context.selected_statements.is_empty());
    assert_eq!(context.dna_bootstrap_statements.len(), 1);
    let inherited = &context.dna_bootstrap_statements[0];
    assert_eq!(inherited.text, "Add 15% for second story access");
    assert_eq!(inherited.source_category, deck);
    assert_eq!(inherited.transferability, Transferability::Universal);
    assert!((inherited.inherited_confidence - 0.51).abs() < 1e-9);
}

#[tokio::test]
async fn test_bootstrap_stops_once_category_has_history() {
    let extractor = ScriptedExtractor::new(&[&["Add 15% for second story access"]]);
    let engine = create_test_engine(extractor);
    let id = ContractorId::new("c-1");

    engine
        .process(edited("c-1", "q-1", "deck", 1000.0, 1150.0))
        .await;
    for i in 0..3 {
        engine
            .process(generated("c-1", &format!("r-{i}"), "roofing", 9000.0))
            .await;
    }

    let context = engine
        .build_context(&id, &JobCategory::new("roofing"), "Reroof")
        .await
        .unwrap();
    assert!(context.dna_bootstrap_statements.is_empty());
}

#[tokio::test]
async fn test_partial_rules_only_reach_related_categories() {
    let extractor = ScriptedExtractor::new(&[&["Minimum charge of $500 for any fence job"]]);
    let engine = create_test_engine(extractor);
    let id = ContractorId::new("c-1");

    engine
        .process(edited("c-1", "q-1", "fence", 400.0, 500.0))
        .await;
    let dna = engine.store().get_dna(&id).await.unwrap();
    assert_eq!(dna.partial_patterns.len(), 1);

    let deck = engine
        .build_context(&id, &JobCategory::new("deck"), "New deck")
        .await
        .unwrap();
    assert_eq!(deck.dna_bootstrap_statements.len(), 1);

    let bathroom = engine
        .build_context(&id, &JobCategory::new("bathroom"), "Bathroom remodel")
        .await
        .unwrap();
    assert!(bathroom.dna_bootstrap_statements.is_empty());
}

#[tokio::test]
async fn test_category_statement_overrides_inherited_rule() {
    let extractor = ScriptedExtractor::new(&[
        &["Add 15% for second story access"],
        &["Add only 10% for second story access on roofing jobs"],
    ]);
    let engine = create_test_engine(extractor);
    let id = ContractorId::new("c-1");
    let deck = JobCategory::new("deck");
    let roofing = JobCategory::new("roofing");

    engine
        .process(edited("c-1", "q-1", "deck", 1000.0, 1150.0))
        .await;
    let deck_before = engine.store().get_category(&id, &deck).await.unwrap();

    let outcome = engine
        .process(edited("c-1", "q-2", "roofing", 8000.0, 8800.0))
        .await;
    let LearningOutcome::Correction { .. } = outcome else {
        panic!("expected a correction outcome");
    };

    // Roofing's own rule is selected; the deck rule is no longer inherited
    let context = engine
        .build_context(&id, &roofing, "Second story roof replacement")
        .await
        .unwrap();
    assert_eq!(context.selected_statements.len(), 1);
    assert_eq!(
        context.selected_statements[0].statement.text,
        "Add only 10% for second story access on roofing jobs"
    );
    assert!(context
        .dna_bootstrap_statements
        .iter()
        .all(|b| b.source_category != deck));

    // The DNA still holds the deck rule, marked overridden for roofing only
    let dna = engine.store().get_dna(&id).await.unwrap();
    let deck_pattern = dna
        .patterns()
        .find(|p| p.source_category == deck)
        .expect("deck pattern kept");
    assert!(deck_pattern.is_overridden_in(&roofing));
    assert!(!deck_pattern.is_overridden_in(&JobCategory::new("siding")));

    // Deck knowledge is untouched
    let deck_after = engine.store().get_category(&id, &deck).await.unwrap();
    assert_eq!(deck_before.learned_statements, deck_after.learned_statements);
    assert_eq!(deck_before.confidence, deck_after.confidence);

    // Siding still inherits the deck rule
    let siding = engine
        .build_context(&id, &JobCategory::new("siding"), "Second story siding")
        .await
        .unwrap();
    assert!(siding
        .dna_bootstrap_statements
        .iter()
        .any(|b| b.source_category == deck));
}

#[tokio::test]
async fn test_backfill_all_matches_live_processing() {
    let id = ContractorId::new("c-1");
    let statements = [
        ("deck", "Add 15% for second story access"),
        ("fence", "Minimum charge of $500 for any fence job"),
        ("deck", "Charge $8 per sqft for composite boards"),
    ];

    // Live
    let live = create_test_engine(ScriptedExtractor::new(&[
        &[statements[0].1],
        &[statements[1].1],
        &[statements[2].1],
    ]));
    for (i, (category, _)) in statements.iter().enumerate() {
        live.process(edited("c-1", &format!("q-{i}"), category, 1000.0, 1100.0))
            .await;
    }
    let live_dna = live.store().get_dna(&id).await.unwrap();

    // Backfilled from the same category knowledge
    let migrated = create_test_engine(ScriptedExtractor::new(&[]));
    for (category, text) in statements {
        let category = JobCategory::new(category);
        let statement = LearningStatement::new(text, 90, category.clone());
        migrated
            .store()
            .update_category(&id, &category, |r| r.learned_statements.push(statement))
            .await
            .unwrap();
    }
    let results = migrated.migration().backfill_all().await.unwrap();
    assert_eq!(results.len(), 1);
    assert!(results[0].error.is_none());
    let migrated_dna = migrated.store().get_dna(&id).await.unwrap();

    let texts = |dna: &quotewise_core::ContractorDna| {
        let mut texts: Vec<String> = dna.patterns().map(|p| p.statement.clone()).collect();
        texts.sort();
        texts
    };
    assert_eq!(texts(&live_dna), texts(&migrated_dna));
    assert!(migrated_dna
        .patterns()
        .all(|p| p.transferability != Transferability::Specific));
}
