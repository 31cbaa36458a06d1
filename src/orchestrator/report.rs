//! Per-candidate outcomes and batch aggregates.

use serde::Serialize;

use crate::embedding::CacheStats;
use crate::types::{ComparisonResult, Decision, TestCase};
use crate::utils::truncate_chars;

const MAX_ERROR_CHARS: usize = 200;

/// What applying a decision did to the knowledge base.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AppliedChange {
    /// SAME: nothing written.
    Unchanged,
    /// NEW: candidate stored under its own id.
    Inserted { id: String },
    /// ADD-ON: existing record replaced by the merge.
    Merged { id: String, version: u32 },
    /// ADD-ON whose target no longer exists; candidate stored as new.
    InsertedMissingTarget { id: String, missing: String },
    /// ADD-ON whose merge failed; existing record left as it was.
    MergeFailed { existing_id: String, reason: String },
}

impl AppliedChange {
    /// Anomalies worth surfacing next to the decision.
    pub fn anomaly(&self) -> Option<String> {
        match self {
            AppliedChange::InsertedMissingTarget { id, missing } => Some(format!(
                "ADD-ON target '{missing}' is missing from the knowledge base; stored '{id}' as new"
            )),
            AppliedChange::MergeFailed { existing_id, reason } => Some(format!(
                "Merge into '{existing_id}' failed, existing test case kept: {reason}"
            )),
            _ => None,
        }
    }
}

/// A successfully decided candidate.
#[derive(Debug, Clone, Serialize)]
pub struct UnitOutcome {
    /// Position in the submitted batch
    pub index: usize,
    pub candidate_id: String,
    pub title: String,
    pub result: ComparisonResult,
    pub recommendation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applied: Option<AppliedChange>,
}

/// A candidate that produced no decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitFailure {
    pub index: usize,
    pub candidate_id: String,
    pub title: String,
    pub error: String,
}

impl UnitFailure {
    pub fn new(index: usize, candidate: &TestCase, error: impl std::fmt::Display) -> Self {
        let error = error.to_string();
        let short = truncate_chars(&error, MAX_ERROR_CHARS);
        Self {
            index,
            candidate_id: candidate.id.clone(),
            title: candidate.title.clone(),
            error: if short.len() < error.len() {
                format!("{short}...")
            } else {
                error
            },
        }
    }
}

/// Counts over one batch. Percentages are over succeeded units.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub same: usize,
    pub add_on: usize,
    pub new: usize,
    pub same_pct: f64,
    pub add_on_pct: f64,
    pub new_pct: f64,
}

impl BatchSummary {
    pub fn from_outcomes(outcomes: &[UnitOutcome], failed: usize) -> Self {
        let count = |d: Decision| outcomes.iter().filter(|o| o.result.decision() == d).count();
        let succeeded = outcomes.len();
        let pct = |n: usize| {
            if succeeded == 0 {
                0.0
            } else {
                n as f64 * 100.0 / succeeded as f64
            }
        };

        let (same, add_on, new) = (
            count(Decision::Same),
            count(Decision::AddOn),
            count(Decision::New),
        );
        Self {
            total: succeeded + failed,
            succeeded,
            failed,
            same,
            add_on,
            new,
            same_pct: pct(same),
            add_on_pct: pct(add_on),
            new_pct: pct(new),
        }
    }
}

/// Everything one `reconcile` call produced.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub suite: String,
    pub applied: bool,
    pub summary: BatchSummary,
    pub outcomes: Vec<UnitOutcome>,
    pub failures: Vec<UnitFailure>,
    pub elapsed_ms: u128,
}

impl BatchReport {
    pub fn anomalies(&self) -> impl Iterator<Item = (&UnitOutcome, String)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.applied.as_ref().and_then(|a| a.anomaly()).map(|msg| (o, msg)))
    }
}

/// Human advice for a decision.
pub fn recommendation(candidate: &TestCase, result: &ComparisonResult) -> String {
    let existing = result.existing_id().unwrap_or("unknown");
    match result.decision() {
        Decision::Same => format!(
            "Keep existing test case '{existing}'; the candidate adds no new coverage."
        ),
        Decision::AddOn if result.coverage_expansion().is_empty() => format!(
            "Modify existing test case '{existing}' to include the candidate's additional steps."
        ),
        Decision::AddOn => format!(
            "Modify existing test case '{existing}' to cover: {}.",
            result.coverage_expansion().join("; ")
        ),
        Decision::New => format!("Create new test case '{}'.", candidate.title),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportReport {
    pub suite: String,
    pub added: Vec<String>,
    pub skipped: Vec<UnitFailure>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsistencyReport {
    pub suite: String,
    pub knowledge_base_count: usize,
    pub index_count: usize,
    /// Ids stored in the knowledge base without a vector
    pub missing_from_index: Vec<String>,
    /// Vectors whose test case is gone
    pub missing_from_knowledge_base: Vec<String>,
}

impl ConsistencyReport {
    pub fn is_consistent(&self) -> bool {
        self.missing_from_index.is_empty() && self.missing_from_knowledge_base.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuiteStats {
    pub name: String,
    pub test_cases: usize,
    pub vectors: usize,
    pub version: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stats {
    pub suites: Vec<SuiteStats>,
    pub embedding_backend: String,
    pub dimension: usize,
    pub cache: CacheStats,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ComparisonParts;

    fn result(decision: Decision, coverage: Vec<String>) -> ComparisonResult {
        ComparisonResult::from_parts(ComparisonParts {
            candidate_id: "c".into(),
            existing_id: Some("e".into()),
            similarity: 0.8,
            embedding_similarity: 0.8,
            analysis_similarity: 0.8,
            decision,
            reasoning: String::new(),
            business_rule_match: true,
            behavior_match: true,
            coverage_expansion: coverage,
            confidence: 0.8,
        })
    }

    fn outcome(decision: Decision) -> UnitOutcome {
        let tc = TestCase::new("Case", "body");
        let result = result(decision, Vec::new());
        UnitOutcome {
            index: 0,
            candidate_id: tc.id.clone(),
            title: tc.title.clone(),
            recommendation: recommendation(&tc, &result),
            result,
            applied: None,
        }
    }

    #[test]
    fn test_summary_percentages_exclude_failures() {
        let outcomes = vec![
            outcome(Decision::Same),
            outcome(Decision::New),
            outcome(Decision::New),
            outcome(Decision::AddOn),
        ];
        let summary = BatchSummary::from_outcomes(&outcomes, 1);
        assert_eq!(summary.total, 5);
        assert_eq!(summary.succeeded, 4);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.new, 2);
        assert_eq!(summary.new_pct, 50.0);
        assert_eq!(summary.same_pct, 25.0);
    }

    #[test]
    fn test_empty_summary() {
        let summary = BatchSummary::from_outcomes(&[], 0);
        assert_eq!(summary, BatchSummary::default());
    }

    #[test]
    fn test_recommendations() {
        let tc = TestCase::new("Lockout", "body");
        assert!(recommendation(&tc, &result(Decision::Same, vec![])).starts_with("Keep"));
        let addon = recommendation(&tc, &result(Decision::AddOn, vec!["lockout".into()]));
        assert!(addon.contains("cover: lockout"));
        assert_eq!(
            recommendation(&tc, &result(Decision::New, vec![])),
            "Create new test case 'Lockout'."
        );
    }

    #[test]
    fn test_failure_error_is_shortened() {
        let tc = TestCase::new("Case", "body");
        let failure = UnitFailure::new(3, &tc, "x".repeat(500));
        assert_eq!(failure.error.chars().count(), MAX_ERROR_CHARS + 3);
        assert_eq!(failure.index, 3);
    }
}
