//! Prompt templates for analysis, rationale and merge calls.

use super::PromptRequest;
use crate::types::{Decision, TestCase};
use crate::utils::truncate_chars;

const ANALYSIS_SYSTEM: &str = "You are a senior QA engineer reviewing a test suite for duplicates. \
Compare a NEW test case against an EXISTING one and judge how they relate. \
Respond with a single JSON object and nothing else, using exactly these keys:\n\
{\n  \"business_rule_match\": true|false,\n  \"behavior_match\": true|false,\n  \
\"coverage_expansion\": \
[\"scenario the new test covers that the existing one does not\", ...],\n  \
\"relationship\": \
\"identical\"|\"expanded\"|\"similar\"|\"related\"|\"different\",\n  \
\"reasoning\": \"one or two sentences\"\n}\n\
identical: same rule, same behavior, nothing new. \
expanded: same rule, new scenarios on top of the existing ones. \
similar: same area, overlapping intent. related: same feature, different purpose. \
different: unrelated.";

const EXPLAIN_SYSTEM: &str = "You explain test reconciliation decisions to QA engineers. \
Write one or two plain sentences. No lists, no JSON.";

const MERGE_SYSTEM: &str = "You are a senior QA engineer. \
Merge two test cases for the same business rule \
into ONE test case that keeps every scenario of the existing test and adds the new coverage. \
Respond with a single JSON object and nothing else, with keys: title, description, business_rule, \
preconditions (array), test_steps (array of {\"action\", \"expected_result\"}), expected_outcome, \
postconditions (array), tags (array), priority (Low|Medium|High|Critical), \
test_type (Frontend|Backend), \
boundary_conditions (array), side_effects (array). Do not number the step actions.";

/// Compact JSON view of a test case for prompts (no ids or timestamps).
fn prompt_view(tc: &TestCase) -> String {
    let steps: Vec<serde_json::Value> = tc
        .steps
        .iter()
        .map(|s| serde_json::json!({ "action": s.action, "expected_result": s.expected_result }))
        .collect();
    let view = serde_json::json!({
        "title": tc.title,
        "description": tc.description,
        "business_rule": tc.business_rule,
        "preconditions": tc.preconditions,
        "test_steps": steps,
        "expected_outcome": tc.expected_outcome,
        "postconditions": tc.postconditions,
        "tags": tc.tags,
        "priority": tc.priority,
        "test_type": tc.test_type,
        "boundary_conditions": tc.boundary_conditions,
        "side_effects": tc.side_effects,
    });
    serde_json::to_string_pretty(&view).unwrap_or_else(|_| tc.canonical_text())
}

/// A decision reached earlier, shown to the analysis prompt as precedent.
#[derive(Debug, Clone, PartialEq)]
pub struct PriorDecision {
    pub similarity: f32,
    pub decision: Decision,
    pub reasoning: String,
}

/// Verbal label for an embedding similarity score.
pub fn similarity_band(similarity: f32) -> &'static str {
    if similarity >= 0.85 {
        "very high"
    } else if similarity >= 0.70 {
        "high"
    } else if similarity >= 0.60 {
        "moderate"
    } else {
        "low"
    }
}

const ANALYSIS_STEPS: &str = "Work through these steps before answering:\n\
1. Business rule: do both tests validate the same business logic or requirement?\n\
2. Behavior: would both catch the same defects, with the same expected outcome?\n\
3. Coverage: which scenarios, boundary conditions or preconditions does the NEW test \
add that the EXISTING one lacks?\n\
4. Relationship: same rule, same behavior and nothing new is identical. \
Same rule plus new coverage is expanded. Otherwise choose similar, related or different.";

/// Relationship judgment between a candidate and an existing test case.
///
/// At most two prior decisions are included.
pub fn analysis(
    candidate: &TestCase,
    existing: &TestCase,
    embedding_similarity: f32,
    history: &[PriorDecision],
) -> PromptRequest {
    let mut user = format!(
        "NEW test case:\n{}\n\nEXISTING test case:\n{}\n\n\
Embedding similarity: {:.1}% ({})\n\n{ANALYSIS_STEPS}\n",
        prompt_view(candidate),
        prompt_view(existing),
        embedding_similarity * 100.0,
        similarity_band(embedding_similarity)
    );
    if !history.is_empty() {
        user.push_str("\nPast decisions at comparable similarity:\n");
        for prior in history.iter().take(2) {
            user.push_str(&format!(
                "- {:.0}%: {} because {}\n",
                prior.similarity * 100.0,
                prior.decision,
                truncate_chars(&prior.reasoning, 100)
            ));
        }
    }
    user.push_str("\nReturn the JSON analysis.");

    PromptRequest::new(ANALYSIS_SYSTEM, user)
        .with_temperature(0.1)
        .with_max_tokens(800)
}

/// Inputs for the rationale prompt.
pub struct ExplainInput<'a> {
    pub decision: &'a str,
    pub fused: f32,
    pub embedding: f32,
    pub analysis: f32,
    pub business_rule_match: bool,
    pub behavior_match: bool,
    pub coverage_expansion: &'a [String],
}

/// Short human-readable rationale for a decision.
pub fn explanation(input: &ExplainInput<'_>) -> PromptRequest {
    let coverage = if input.coverage_expansion.is_empty() {
        "none".to_string()
    } else {
        input.coverage_expansion.join(", ")
    };
    let user = format!(
        "Decision: {}\nSimilarity: {:.1}% (embedding {:.1}%, analysis {:.1}%)\n\
Business rule match: {}\nBehavior match: {}\nNew coverage: {coverage}\n\n\
Explain why this decision was made.",
        input.decision,
        input.fused * 100.0,
        input.embedding * 100.0,
        input.analysis * 100.0,
        input.business_rule_match,
        input.behavior_match,
    );
    PromptRequest::new(EXPLAIN_SYSTEM, user)
        .with_temperature(0.3)
        .with_max_tokens(150)
}

const MERGE_STEPS: &str = "Merge in this order:\n\
1. Business rule: write one rule that covers both tests.\n\
2. Preconditions: keep every unique precondition, drop duplicates.\n\
3. Steps: keep every EXISTING step. Add NEW steps that check something not yet covered, \
parameterizing where two steps differ only in data.\n\
4. Coverage: add each coverage item as a step, boundary condition or postcondition.\n\
5. Metadata: keep the tags of both and the higher priority.";

/// Merge a candidate into an existing test case.
pub fn merge(existing: &TestCase, candidate: &TestCase, coverage: &[String]) -> PromptRequest {
    let coverage = if coverage.is_empty() {
        "(not specified, infer from the NEW test case)".to_string()
    } else {
        coverage
            .iter()
            .map(|c| format!("- {c}"))
            .collect::<Vec<_>>()
            .join("\n")
    };
    let user = format!(
        "EXISTING test case:\n{}\n\nNEW test case:\n{}\n\nCoverage to add:\n{coverage}\n\n\
{MERGE_STEPS}\n\nReturn the merged test case as JSON.",
        prompt_view(existing),
        prompt_view(candidate)
    );
    PromptRequest::new(MERGE_SYSTEM, user)
        .with_temperature(0.4)
        .with_max_tokens(1500)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_parameters() {
        let a = TestCase::new("A", "a");
        let b = TestCase::new("B", "b");

        let req = analysis(&a, &b, 0.5, &[]);
        assert_eq!(req.max_tokens, 800);
        assert!((req.temperature - 0.1).abs() < f32::EPSILON);
        assert!(req.user.contains("\"title\": \"A\""));
        assert!(!req.user.contains("Past decisions"));

        let req = merge(&a, &b, &["expired session".to_string()]);
        assert_eq!(req.max_tokens, 1500);
        assert!(req.user.contains("- expired session"));
        assert!(req.user.contains("Merge in this order"));
        assert!(req.user.contains("higher priority"));

        let req = explanation(&ExplainInput {
            decision: "NEW",
            fused: 0.5,
            embedding: 0.4,
            analysis: 0.65,
            business_rule_match: false,
            behavior_match: false,
            coverage_expansion: &[],
        });
        assert_eq!(req.max_tokens, 150);
        assert!(req.user.contains("Similarity: 50.0%"));
    }

    #[test]
    fn test_analysis_carries_similarity_band_and_two_precedents() {
        let a = TestCase::new("A", "a");
        let b = TestCase::new("B", "b");
        let prior = |similarity, decision| PriorDecision {
            similarity,
            decision,
            reasoning: "x".repeat(300),
        };
        let history = [
            prior(0.91, Decision::AddOn),
            prior(0.88, Decision::Same),
            prior(0.80, Decision::New),
        ];

        let req = analysis(&a, &b, 0.9, &history);
        assert!(req.user.contains("Embedding similarity: 90.0% (very high)"));
        assert!(req.user.contains("1. Business rule"));
        assert!(req.user.contains("- 91%: ADD-ON because"));
        assert!(req.user.contains("- 88%: SAME because"));
        assert!(!req.user.contains("- 80%"));
        assert!(!req.user.contains(&"x".repeat(101)));
        assert!(req.user.ends_with("Return the JSON analysis."));
    }

    #[test]
    fn test_similarity_bands() {
        assert_eq!(similarity_band(0.85), "very high");
        assert_eq!(similarity_band(0.75), "high");
        assert_eq!(similarity_band(0.60), "moderate");
        assert_eq!(similarity_band(0.59), "low");
    }
}
