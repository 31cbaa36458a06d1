use std::sync::Arc;

use super::{CompareResult, DecisionHistory, DecisionPolicy};
use crate::embedding::{EmbeddingProvider, similarity};
use crate::llm::prompts::{self, PriorDecision};
use crate::llm::TextGenerator;
use crate::semantic::{Analysis, SemanticAnalyzer};
use crate::types::{ComparisonParts, ComparisonResult, Decision, TestCase};

/// Decisions kept as precedent for later analysis prompts.
const HISTORY_CAPACITY: usize = 32;
const PRECEDENTS_PER_PROMPT: usize = 2;

/// Runs one pairwise comparison. Cheap to clone; all services are shared.
#[derive(Clone)]
pub struct ComparisonEngine {
    embeddings: Arc<EmbeddingProvider>,
    analyzer: Arc<SemanticAnalyzer>,
    explainer: Option<Arc<dyn TextGenerator>>,
    history: Arc<DecisionHistory>,
    policy: DecisionPolicy,
}

impl ComparisonEngine {
    pub fn new(
        embeddings: Arc<EmbeddingProvider>,
        analyzer: Arc<SemanticAnalyzer>,
        policy: DecisionPolicy,
    ) -> Self {
        Self {
            embeddings,
            analyzer,
            explainer: None,
            history: Arc::new(DecisionHistory::new(HISTORY_CAPACITY)),
            policy,
        }
    }

    /// Phrase rationales through the generative service instead of the template.
    pub fn with_explainer(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.explainer = Some(generator);
        self
    }

    /// Same services, different thresholds.
    pub fn with_policy(&self, policy: DecisionPolicy) -> Self {
        Self {
            policy,
            ..self.clone()
        }
    }

    pub fn policy(&self) -> &DecisionPolicy {
        &self.policy
    }

    pub fn embeddings(&self) -> &Arc<EmbeddingProvider> {
        &self.embeddings
    }

    pub fn history(&self) -> &DecisionHistory {
        &self.history
    }

    /// Full comparison: embed both sides, analyze, fuse, classify.
    pub fn compare(
        &self,
        candidate: &TestCase,
        existing: &TestCase,
    ) -> CompareResult<ComparisonResult> {
        let texts = [candidate.canonical_text(), existing.canonical_text()];
        let vectors = self.embeddings.embed_batch(&texts)?;
        let embedding_similarity = similarity(&vectors[0], &vectors[1]);
        self.compare_with_similarity(candidate, existing, embedding_similarity)
    }

    /// Comparison with a precomputed embedding similarity.
    pub fn compare_with_similarity(
        &self,
        candidate: &TestCase,
        existing: &TestCase,
        embedding_similarity: f32,
    ) -> CompareResult<ComparisonResult> {
        let precedents = self
            .history
            .closest(embedding_similarity, PRECEDENTS_PER_PROMPT);
        let outcome = self.analyzer.analyze(
            candidate,
            existing,
            embedding_similarity,
            &precedents,
        )?;
        let parsed = !outcome.is_fallback();
        let analysis = outcome.into_analysis();

        let analysis_similarity = self.policy.analysis_similarity(&analysis);
        let fused = self.policy.fuse(embedding_similarity, analysis_similarity);
        let decision = self.policy.classify(fused, embedding_similarity, &analysis);
        let confidence =
            self.policy
                .confidence(fused, embedding_similarity, analysis_similarity, &analysis);
        let reasoning = self.rationale(
            decision,
            fused,
            embedding_similarity,
            analysis_similarity,
            &analysis,
        );

        tracing::info!(
            target: "comparison",
            "{} vs {}: {decision} (fused {fused:.3}, embedding {embedding_similarity:.3}, \
             analysis {analysis_similarity:.3}, confidence {confidence:.3})",
            candidate.id,
            existing.id
        );

        // Fallback analyses carry no judgment worth repeating
        if parsed {
            self.history.record(PriorDecision {
                similarity: embedding_similarity,
                decision,
                reasoning: analysis.reasoning.clone(),
            });
        }

        Ok(ComparisonResult::from_parts(ComparisonParts {
            candidate_id: candidate.id.clone(),
            existing_id: Some(existing.id.clone()),
            similarity: fused,
            embedding_similarity,
            analysis_similarity,
            decision,
            reasoning,
            business_rule_match: analysis.business_rule_match,
            behavior_match: analysis.behavior_match,
            coverage_expansion: analysis.coverage_expansion,
            confidence,
        }))
    }

    fn rationale(
        &self,
        decision: Decision,
        fused: f32,
        embedding_similarity: f32,
        analysis_similarity: f32,
        analysis: &Analysis,
    ) -> String {
        let template = || {
            self.policy.fallback_rationale(
                decision,
                fused,
                embedding_similarity,
                analysis_similarity,
                analysis,
            )
        };
        let Some(explainer) = &self.explainer else {
            return template();
        };

        let request = prompts::explanation(&prompts::ExplainInput {
            decision: decision.as_str(),
            fused,
            embedding: embedding_similarity,
            analysis: analysis_similarity,
            business_rule_match: analysis.business_rule_match,
            behavior_match: analysis.behavior_match,
            coverage_expansion: &analysis.coverage_expansion,
        });
        match explainer.generate(&request) {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => template(),
            Err(e) => {
                tracing::debug!(
                    target: "comparison",
                    "Rationale generation failed, using template: {e}"
                );
                template()
            }
        }
    }
}
