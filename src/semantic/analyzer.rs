use std::sync::Arc;

use super::{Analysis, AnalysisOutcome};
use crate::llm::prompts::{self, PriorDecision};
use crate::llm::{JsonExtraction, LlmResult, TextGenerator, extract_json};
use crate::types::TestCase;

/// Pairwise relationship judgment through one structured prompt.
pub struct SemanticAnalyzer {
    generator: Arc<dyn TextGenerator>,
}

impl SemanticAnalyzer {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Judge how `candidate` relates to `existing`.
    ///
    /// The prompt carries the pair's embedding similarity and up to two
    /// `history` entries as precedent. Service failures are returned as
    /// errors. An unusable reply is not an error: it yields
    /// [`AnalysisOutcome::Fallback`] carrying [`Analysis::conservative`].
    pub fn analyze(
        &self,
        candidate: &TestCase,
        existing: &TestCase,
        embedding_similarity: f32,
        history: &[PriorDecision],
    ) -> LlmResult<AnalysisOutcome> {
        let request = prompts::analysis(candidate, existing, embedding_similarity, history);
        let raw = self.generator.generate(&request)?;

        let outcome = match extract_json(&raw) {
            JsonExtraction::Parsed(value) => match Analysis::from_value(&value) {
                Some(analysis) => AnalysisOutcome::Parsed(analysis),
                None => AnalysisOutcome::Fallback(Analysis::conservative(
                    "response JSON is not an object",
                )),
            },
            JsonExtraction::Fallback { reason } => {
                AnalysisOutcome::Fallback(Analysis::conservative(&reason))
            }
        };

        match &outcome {
            AnalysisOutcome::Parsed(a) => tracing::debug!(
                target: "semantic",
                "{} vs {}: {} (rule={}, behavior={}, +{} coverage)",
                candidate.id,
                existing.id,
                a.relationship,
                a.business_rule_match,
                a.behavior_match,
                a.coverage_expansion.len()
            ),
            AnalysisOutcome::Fallback(a) => tracing::warn!(
                target: "semantic",
                "{} vs {}: unusable analysis reply, using conservative default ({})",
                candidate.id,
                existing.id,
                a.reasoning
            ),
        }

        Ok(outcome)
    }
}
