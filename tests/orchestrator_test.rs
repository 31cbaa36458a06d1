mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use casebase::orchestrator::{AppliedChange, OrchestratorError, ReconcileRequest};
use casebase::{Decision, Orchestrator, TestCase};
use common::{DIFFERENT, EXPANDED, IDENTICAL, NeedleBackend, ScriptedGenerator};

const SUITE: &str = "Login";
const TIMEOUT: Duration = Duration::from_secs(5);

fn existing() -> TestCase {
    TestCase::new("Valid login", "User signs in with valid credentials")
        .with_business_rule("Only registered users can sign in")
        .with_step("Open the login page", "Form is shown")
        .with_step("Submit valid credentials", "Dashboard is shown")
}

/// `Valid login` sits at [1, 0]; other titles are placed relative to it.
fn backend() -> Arc<NeedleBackend> {
    Arc::new(
        NeedleBackend::new(vec![0.0, 1.0])
            .rule("Title: Valid login", vec![1.0, 0.0])
            .rule("Title: Login twin", vec![1.0, 0.0])
            // cos 0.8 -> similarity 0.9
            .rule("Title: Login lockout", vec![0.8, 0.6])
            .rule("Title: Slow lockout", vec![0.8, 0.6])
            .rule("Title: Broken lockout", vec![0.8, 0.6])
            .rule("Title: Alpha lockout", vec![0.8, 0.6])
            .rule("Title: Beta lockout", vec![0.8, 0.6]),
    )
}

fn seeded(generator: Arc<ScriptedGenerator>) -> (Orchestrator, TestCase) {
    let orchestrator = common::orchestrator(backend(), generator, TIMEOUT);
    let report = orchestrator.import(SUITE, vec![existing()]).unwrap();
    assert_eq!(report.added.len(), 1);
    let stored = orchestrator.knowledge_base().list(SUITE).remove(0);
    (orchestrator, stored)
}

fn merged_reply() -> &'static str {
    r#"```json
{"title": "Valid login with lockout", "description": "Signs in, locks after repeated failures",
 "business_rule": "Only registered users can sign in",
 "test_steps": [
   {"action": "Open the login page", "expected_result": "Form is shown"},
   {"action": "Submit valid credentials", "expected_result": "Dashboard is shown"},
   {"action": "Submit a wrong password five times", "expected_result": "Account is locked"}],
 "priority": "High"}
```"#
}

#[test]
fn test_empty_suite_yields_new_without_analysis() {
    let generator = Arc::new(ScriptedGenerator::new(IDENTICAL));
    let orchestrator = common::orchestrator(backend(), Arc::clone(&generator), TIMEOUT);

    let report = orchestrator
        .reconcile(ReconcileRequest::new(SUITE, vec![existing()]))
        .unwrap();

    assert_eq!(report.outcomes.len(), 1);
    let result = &report.outcomes[0].result;
    assert_eq!(result.decision(), Decision::New);
    assert_eq!(result.confidence(), 1.0);
    assert_eq!(result.similarity(), 0.0);
    assert!(result.existing_id().is_none());
    assert!(result.reasoning().contains("No similar test cases"));
    assert_eq!(generator.analysis_calls.load(Ordering::SeqCst), 0);
    assert!(report.outcomes[0].applied.is_none());
}

#[test]
fn test_below_threshold_is_new_without_analysis() {
    let generator = Arc::new(ScriptedGenerator::new(IDENTICAL));
    let (orchestrator, stored) = seeded(Arc::clone(&generator));

    // Falls back to [0, 1]: orthogonal, similarity 0.5
    let candidate = TestCase::new("Export monthly report", "Report is downloaded as CSV");
    let report = orchestrator
        .reconcile(ReconcileRequest::new(SUITE, vec![candidate]))
        .unwrap();

    let result = &report.outcomes[0].result;
    assert_eq!(result.decision(), Decision::New);
    assert!((result.similarity() - 0.5).abs() < 1e-4);
    assert_eq!(result.confidence(), 0.9);
    assert_eq!(result.existing_id(), Some(stored.id.as_str()));
    assert_eq!(generator.analysis_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_addon_apply_merges_into_existing_record() {
    let generator = Arc::new(ScriptedGenerator::new(EXPANDED).merging(merged_reply()));
    let (orchestrator, stored) = seeded(Arc::clone(&generator));

    let candidate = TestCase::new("Login lockout", "Account locks after five failed attempts")
        .with_step("Submit a wrong password five times", "Account is locked");
    let report = orchestrator
        .reconcile(ReconcileRequest::new(SUITE, vec![candidate.clone()]).applying())
        .unwrap();

    assert!(report.failures.is_empty());
    let outcome = &report.outcomes[0];
    assert_eq!(outcome.result.decision(), Decision::AddOn);
    assert_eq!(outcome.result.existing_id(), Some(stored.id.as_str()));
    assert!(outcome.recommendation.contains("account lockout"));
    assert_eq!(
        outcome.applied,
        Some(AppliedChange::Merged {
            id: stored.id.clone(),
            version: stored.version + 1
        })
    );

    let kb = orchestrator.knowledge_base();
    let merged = kb.get(SUITE, &stored.id).unwrap();
    assert_eq!(merged.version, stored.version + 1);
    assert_eq!(merged.created_at, stored.created_at);
    assert_eq!(merged.title, "Valid login with lockout");
    assert_eq!(merged.steps.len(), 3);
    assert!(kb.get(SUITE, &candidate.id).is_none());
    assert_eq!(kb.list(SUITE).len(), 1);

    let check = orchestrator.check_consistency(SUITE).unwrap();
    assert!(check.is_consistent());
    let collection = orchestrator.vectors().collection(SUITE).unwrap();
    let record = collection.get(&stored.id).unwrap();
    assert!(record.document.contains("Valid login with lockout"));
    assert_eq!(generator.merge_calls.load(Ordering::SeqCst), 1);
}

/// Merge reply that keeps the existing record and tags its description
/// with the candidate it came from.
fn tag_existing_description(user: &str) -> String {
    const EXISTING: &str = "EXISTING test case:\n";
    let start = user.find(EXISTING).unwrap() + EXISTING.len();
    let end = user.find("\n\nNEW test case:").unwrap();
    let existing: serde_json::Value = serde_json::from_str(&user[start..end]).unwrap();
    let tag = if user.contains("Alpha lockout") {
        "+ALPHA"
    } else {
        "+BETA"
    };
    serde_json::json!({
        "title": existing["title"],
        "description": format!("{} {tag}", existing["description"].as_str().unwrap()),
        "business_rule": existing["business_rule"],
        "test_steps": existing["test_steps"],
        "priority": "Medium",
    })
    .to_string()
}

#[test]
fn test_concurrent_addons_on_one_target_both_land() {
    let generator = Arc::new(
        ScriptedGenerator::new(EXPANDED)
            .merging_with(tag_existing_description)
            // Both merges are in flight at the same time
            .slow_on("Coverage to add", Duration::from_millis(200)),
    );
    let (orchestrator, stored) = seeded(Arc::clone(&generator));

    let batch = vec![
        TestCase::new("Alpha lockout", "Locks after five failed attempts"),
        TestCase::new("Beta lockout", "Locks after three failed attempts"),
    ];
    let report = orchestrator
        .reconcile(ReconcileRequest::new(SUITE, batch).applying())
        .unwrap();

    assert!(report.failures.is_empty());
    let mut versions: Vec<u32> = report
        .outcomes
        .iter()
        .map(|outcome| match &outcome.applied {
            Some(AppliedChange::Merged { id, version }) if *id == stored.id => *version,
            other => panic!("unexpected change {other:?}"),
        })
        .collect();
    versions.sort_unstable();
    assert_eq!(versions, vec![2, 3]);

    let merged = orchestrator.knowledge_base().get(SUITE, &stored.id).unwrap();
    assert_eq!(merged.version, 3);
    assert!(merged.description.contains("+ALPHA"));
    assert!(merged.description.contains("+BETA"));
    assert_eq!(generator.merge_calls.load(Ordering::SeqCst), 2);

    let record = orchestrator
        .vectors()
        .collection(SUITE)
        .unwrap()
        .get(&stored.id)
        .unwrap();
    assert_eq!(record.document, merged.canonical_text());
}

#[test]
fn test_unparsable_analysis_counts_as_new() {
    let generator = Arc::new(ScriptedGenerator::new("Both look fine to me, no JSON today."));
    let (orchestrator, _) = seeded(Arc::clone(&generator));

    let candidate = TestCase::new("Login lockout", "Account locks after five failed attempts");
    let report = orchestrator
        .reconcile(ReconcileRequest::new(SUITE, vec![candidate]))
        .unwrap();

    assert!(report.failures.is_empty());
    assert_eq!(report.summary.succeeded, 1);
    assert_eq!(report.summary.new, 1);
    let result = &report.outcomes[0].result;
    assert_eq!(result.decision(), Decision::New);
    // embedding 0.9, analysis 0.2: fused 0.62, agreement bonus 0.03
    assert!((result.similarity() - 0.62).abs() < 1e-4);
    assert!((result.confidence() - 0.65).abs() < 1e-4);
    assert!(result.reasoning().contains("Error in analysis"));
    assert_eq!(generator.analysis_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_delete_removes_record_and_vector() {
    let generator = Arc::new(ScriptedGenerator::new(IDENTICAL));
    let (orchestrator, stored) = seeded(generator);
    let logout = TestCase::new("Logout", "User signs out");
    orchestrator.import(SUITE, vec![logout.clone()]).unwrap();

    assert!(orchestrator.delete(SUITE, &stored.id).unwrap());
    assert!(orchestrator.knowledge_base().get(SUITE, &stored.id).is_none());
    assert_eq!(orchestrator.vectors().count(SUITE).unwrap(), 1);
    let check = orchestrator.check_consistency(SUITE).unwrap();
    assert!(check.is_consistent());
    assert_eq!(check.knowledge_base_count, 1);

    // Already gone from both stores
    assert!(!orchestrator.delete(SUITE, &stored.id).unwrap());

    // A vector without a record is cleaned up too
    let collection = orchestrator.vectors().collection(SUITE).unwrap();
    collection
        .upsert("orphan", vec![1.0, 0.0], "Title: Orphan", Default::default())
        .unwrap();
    assert!(orchestrator.delete(SUITE, "orphan").unwrap());
    assert!(orchestrator.check_consistency(SUITE).unwrap().is_consistent());

    assert!(orchestrator.delete("Unknown", &logout.id).is_err());
}

#[test]
fn test_merge_failure_keeps_existing_unchanged() {
    let generator = Arc::new(ScriptedGenerator::new(EXPANDED).merging("I cannot merge these."));
    let (orchestrator, stored) = seeded(generator);

    let candidate = TestCase::new("Login lockout", "Account locks after five failed attempts");
    let report = orchestrator
        .reconcile(ReconcileRequest::new(SUITE, vec![candidate]).applying())
        .unwrap();

    let outcome = &report.outcomes[0];
    assert_eq!(outcome.result.decision(), Decision::AddOn);
    assert!(matches!(
        outcome.applied,
        Some(AppliedChange::MergeFailed { ref existing_id, .. }) if *existing_id == stored.id
    ));
    assert_eq!(report.anomalies().count(), 1);

    let kept = orchestrator.knowledge_base().get(SUITE, &stored.id).unwrap();
    assert_eq!(kept, stored);
    assert_eq!(orchestrator.knowledge_base().list(SUITE).len(), 1);
}

#[test]
fn test_addon_with_missing_record_is_inserted_as_new() {
    let generator = Arc::new(ScriptedGenerator::new(EXPANDED).merging(merged_reply()));
    let (orchestrator, stored) = seeded(generator);
    // Vector stays behind, record goes
    assert!(orchestrator.knowledge_base().delete(SUITE, &stored.id).unwrap());

    let candidate = TestCase::new("Login lockout", "Account locks after five failed attempts");
    let report = orchestrator
        .reconcile(ReconcileRequest::new(SUITE, vec![candidate.clone()]).applying())
        .unwrap();

    let outcome = &report.outcomes[0];
    assert_eq!(outcome.result.decision(), Decision::AddOn);
    assert_eq!(
        outcome.applied,
        Some(AppliedChange::InsertedMissingTarget {
            id: candidate.id.clone(),
            missing: stored.id.clone(),
        })
    );
    assert!(orchestrator.knowledge_base().get(SUITE, &candidate.id).is_some());
    assert_eq!(report.anomalies().count(), 1);
}

#[test]
fn test_same_and_new_apply() {
    let generator = Arc::new(ScriptedGenerator::new(IDENTICAL));
    let (orchestrator, stored) = seeded(generator);

    let twin = TestCase::new("Login twin", "User signs in with valid credentials");
    let report = orchestrator
        .reconcile(ReconcileRequest::new(SUITE, vec![twin.clone()]).applying())
        .unwrap();
    assert_eq!(report.outcomes[0].result.decision(), Decision::Same);
    assert_eq!(report.outcomes[0].applied, Some(AppliedChange::Unchanged));
    assert!(orchestrator.knowledge_base().get(SUITE, &twin.id).is_none());
    assert_eq!(
        orchestrator.knowledge_base().get(SUITE, &stored.id).unwrap().version,
        1
    );

    let generator = Arc::new(ScriptedGenerator::new(DIFFERENT));
    let (orchestrator, _) = seeded(generator);
    let lockout = TestCase::new("Login lockout", "Account locks after five failed attempts");
    let report = orchestrator
        .reconcile(ReconcileRequest::new(SUITE, vec![lockout.clone()]).applying())
        .unwrap();
    let outcome = &report.outcomes[0];
    // fused 0.6 * 0.9 + 0.4 * 0.2 = 0.62, no rule match
    assert_eq!(outcome.result.decision(), Decision::New);
    assert_eq!(
        outcome.applied,
        Some(AppliedChange::Inserted {
            id: lockout.id.clone()
        })
    );
    assert_eq!(orchestrator.knowledge_base().list(SUITE).len(), 2);
    assert_eq!(orchestrator.vectors().count(SUITE).unwrap(), 2);
}

#[test]
fn test_dry_run_writes_nothing() {
    let generator = Arc::new(ScriptedGenerator::new(DIFFERENT));
    let (orchestrator, _) = seeded(generator);

    let report = orchestrator
        .reconcile(ReconcileRequest::new(
            SUITE,
            vec![TestCase::new("Login lockout", "Account locks")],
        ))
        .unwrap();
    assert!(!report.applied);
    assert_eq!(report.outcomes[0].result.decision(), Decision::New);
    assert_eq!(orchestrator.knowledge_base().list(SUITE).len(), 1);
    assert_eq!(orchestrator.vectors().count(SUITE).unwrap(), 1);
}

#[test]
fn test_timed_out_unit_is_excluded_and_never_applied() {
    let generator = Arc::new(
        ScriptedGenerator::new(DIFFERENT).slow_on("Slow lockout", Duration::from_millis(800)),
    );
    let orchestrator = common::orchestrator(backend(), generator, Duration::from_millis(100));
    orchestrator.import(SUITE, vec![existing()]).unwrap();

    let slow = TestCase::new("Slow lockout", "Locks slowly");
    let fast = TestCase::new("Login lockout", "Locks quickly");
    let report = orchestrator
        .reconcile(ReconcileRequest::new(SUITE, vec![slow.clone(), fast.clone()]).applying())
        .unwrap();

    assert_eq!(report.summary.total, 2);
    assert_eq!(report.summary.failed, 1);
    assert_eq!(report.summary.new, 1);
    assert_eq!(report.summary.new_pct, 100.0);
    assert_eq!(report.failures[0].candidate_id, slow.id);
    assert_eq!(report.failures[0].index, 0);
    assert!(report.failures[0].error.contains("timed out"));
    assert_eq!(report.outcomes[0].candidate_id, fast.id);

    // Let the abandoned analysis finish; its result must still go nowhere
    std::thread::sleep(Duration::from_millis(1200));
    let kb = orchestrator.knowledge_base();
    assert!(kb.get(SUITE, &slow.id).is_none());
    assert!(kb.get(SUITE, &fast.id).is_some());
}

#[test]
fn test_failed_analysis_is_reported_and_batch_continues() {
    let generator = Arc::new(ScriptedGenerator::new(EXPANDED).failing_on("Broken lockout"));
    let (orchestrator, _) = seeded(generator);

    let broken = TestCase::new("Broken lockout", "Service falls over");
    let batch = vec![
        broken.clone(),
        TestCase::new("Login lockout", "Locks"),
        TestCase::new("Export monthly report", "CSV download"),
    ];
    let report = orchestrator
        .reconcile(ReconcileRequest::new(SUITE, batch))
        .unwrap();

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].title, "Broken lockout");
    assert_eq!(report.failures[0].candidate_id, broken.id);
    assert!(report.failures[0].error.contains("503"));
    assert_eq!(report.summary.succeeded, 2);
    assert_eq!(report.summary.add_on, 1);
    assert_eq!(report.summary.new, 1);
    assert_eq!(report.summary.add_on_pct, 50.0);
    // Order follows the submitted batch
    let indices: Vec<usize> = report.outcomes.iter().map(|o| o.index).collect();
    assert_eq!(indices, vec![1, 2]);
}

#[test]
fn test_threshold_override_is_validated() {
    let generator = Arc::new(ScriptedGenerator::new(IDENTICAL));
    let (orchestrator, _) = seeded(generator);

    let mut request = ReconcileRequest::new(SUITE, vec![TestCase::new("Login twin", "x")]);
    request.same_threshold = Some(1.5);
    assert!(matches!(
        orchestrator.reconcile(request),
        Err(OrchestratorError::Comparison(_))
    ));

    // Raising the add-on floor above 0.9 turns the lockout candidate into NEW
    let mut request = ReconcileRequest::new(SUITE, vec![TestCase::new("Login lockout", "x")]);
    request.same_threshold = Some(0.99);
    request.addon_min_threshold = Some(0.95);
    let report = orchestrator.reconcile(request).unwrap();
    assert_eq!(report.outcomes[0].result.decision(), Decision::New);
    assert_eq!(report.outcomes[0].result.confidence(), 0.9);
}

#[test]
fn test_reconcile_requires_comparison_services() {
    let backend = backend();
    let orchestrator = Orchestrator::new(
        Arc::new(casebase::KnowledgeBase::in_memory()),
        Arc::new(casebase::VectorStore::in_memory(casebase::DistanceMetric::Cosine)),
        common::provider(backend),
        common::options(TIMEOUT),
    );
    assert!(matches!(
        orchestrator.reconcile(ReconcileRequest::new(SUITE, vec![existing()])),
        Err(OrchestratorError::ComparisonUnavailable)
    ));
}

#[test]
fn test_import_skips_duplicates_and_reindex_repairs_index() {
    let generator = Arc::new(ScriptedGenerator::new(IDENTICAL));
    let (orchestrator, stored) = seeded(generator);

    let extra = TestCase::new("Logout", "User signs out");
    let report = orchestrator
        .import(SUITE, vec![existing(), extra.clone()])
        .unwrap();
    assert_eq!(report.added, vec![extra.id.clone()]);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].candidate_id, stored.id);

    let collection = orchestrator.vectors().collection(SUITE).unwrap();
    assert!(collection.delete(&extra.id).unwrap());
    collection
        .upsert("orphan", vec![1.0, 0.0], "Title: Orphan", Default::default())
        .unwrap();

    let check = orchestrator.check_consistency(SUITE).unwrap();
    assert_eq!(check.missing_from_index, vec![extra.id.clone()]);
    assert_eq!(check.missing_from_knowledge_base, vec!["orphan".to_string()]);

    assert_eq!(orchestrator.reindex(SUITE).unwrap(), 2);
    assert!(orchestrator.check_consistency(SUITE).unwrap().is_consistent());
    assert!(orchestrator.reindex("Unknown").is_err());

    let stats = orchestrator.stats().unwrap();
    assert_eq!(stats.suites.len(), 1);
    assert_eq!(stats.suites[0].test_cases, 2);
    assert_eq!(stats.suites[0].vectors, 2);
    assert_eq!(stats.embedding_backend, "needle");
}
