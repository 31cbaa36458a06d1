mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;

use casebase::embedding::{EmbeddingCache, EmbeddingProvider, HashedEmbeddings};
use casebase::{Decision, TestCase};
use common::{IDENTICAL, ScriptedGenerator};

fn hashed() -> Arc<EmbeddingProvider> {
    Arc::new(EmbeddingProvider::new(
        Arc::new(HashedEmbeddings::new(256)),
        Arc::new(EmbeddingCache::new()),
        8000,
        16,
    ))
}

fn checkout() -> TestCase {
    TestCase::new("Checkout with saved card", "Customer pays with a stored card")
        .with_business_rule("Saved cards can be charged without re-entry")
        .with_step("Open the cart", "Cart is listed")
        .with_step("Pay with the saved card", "Order is confirmed")
}

#[test]
fn test_identical_cases_are_same() {
    let generator = Arc::new(ScriptedGenerator::new(IDENTICAL));
    let engine = common::engine(hashed(), Arc::clone(&generator));

    let existing = checkout();
    let candidate = checkout().with_id("candidate-1");
    let result = engine.compare(&candidate, &existing).unwrap();

    assert_eq!(result.decision(), Decision::Same);
    assert!(result.embedding_similarity() > 0.99);
    assert_eq!(result.analysis_similarity(), 1.0);
    assert_eq!(result.candidate_id(), "candidate-1");
    assert_eq!(result.existing_id(), Some(existing.id.as_str()));
    assert!(result.confidence() <= 1.0);
    assert!(result.reasoning().starts_with("Decision: SAME"));
    assert_eq!(generator.analysis_calls.load(Ordering::SeqCst), 1);
    // Parsed analyses become precedent for later prompts
    assert_eq!(engine.history().len(), 1);
}

#[test]
fn test_similar_with_rule_match_but_no_coverage_is_new() {
    let reply = r#"{"business_rule_match": true, "behavior_match": false,
        "coverage_expansion": [], "relationship": "similar",
        "reasoning": "Same rule, other wording."}"#;
    let engine = common::engine(hashed(), Arc::new(ScriptedGenerator::new(reply)));

    let candidate = TestCase::new("Login with valid password", "User signs in");
    let existing = TestCase::new("Login with correct credentials", "User signs in");
    // analysis 0.60 + 0.15 = 0.75; fused 0.6 * 0.78 + 0.4 * 0.75 = 0.768
    let result = engine
        .compare_with_similarity(&candidate, &existing, 0.78)
        .unwrap();
    assert!((result.analysis_similarity() - 0.75).abs() < 1e-6);
    assert!((result.similarity() - 0.768).abs() < 1e-4);
    assert!(result.business_rule_match());
    assert_eq!(result.decision(), Decision::New);
}

#[test]
fn test_unparsable_reply_degrades_to_new() {
    let engine = common::engine(
        hashed(),
        Arc::new(ScriptedGenerator::new("Sorry, I can only answer in prose today.")),
    );

    let result = engine
        .compare_with_similarity(&checkout().with_id("c"), &checkout(), 0.95)
        .unwrap();
    assert_eq!(result.decision(), Decision::New);
    assert!(!result.business_rule_match());
    assert!(result.coverage_expansion().is_empty());
    assert!(result.reasoning().contains("Error in analysis"));
    // analysis 0.20; fused 0.6 * 0.95 + 0.4 * 0.20 = 0.65; agreement bonus 0.025
    assert!((result.analysis_similarity() - 0.2).abs() < 1e-6);
    assert!((result.similarity() - 0.65).abs() < 1e-4);
    assert!((result.confidence() - 0.675).abs() < 1e-4);
    assert!(engine.history().is_empty());
}

#[test]
fn test_explainer_phrases_rationale_and_falls_back_to_template() {
    let generator = Arc::new(
        ScriptedGenerator::new(IDENTICAL).explaining("  Both cases pay with a stored card.  "),
    );
    let engine =
        common::engine(hashed(), Arc::clone(&generator)).with_explainer(generator.clone());
    let result = engine
        .compare_with_similarity(&checkout().with_id("c"), &checkout(), 0.97)
        .unwrap();
    assert_eq!(result.reasoning(), "Both cases pay with a stored card.");
    assert_eq!(generator.explain_calls.load(Ordering::SeqCst), 1);

    // No explanation scripted: the generator errors and the template is used
    let silent = Arc::new(ScriptedGenerator::new(IDENTICAL));
    let engine = common::engine(hashed(), Arc::clone(&silent)).with_explainer(silent.clone());
    let result = engine
        .compare_with_similarity(&checkout().with_id("c"), &checkout(), 0.97)
        .unwrap();
    assert!(result.reasoning().starts_with("Decision: SAME"));
    assert!(result.reasoning().ends_with("Same checks."));
}

#[test]
fn test_service_failure_is_an_error() {
    let generator = Arc::new(ScriptedGenerator::new(IDENTICAL).failing_on("Checkout"));
    let engine = common::engine(hashed(), generator);
    let err = engine
        .compare_with_similarity(&checkout().with_id("c"), &checkout(), 0.9)
        .unwrap_err();
    assert!(err.to_string().contains("503"));
}
