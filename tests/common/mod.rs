//! Scripted service doubles shared by the integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use casebase::comparison::{ComparisonEngine, DecisionPolicy};
use casebase::embedding::{EmbeddingBackend, EmbeddingCache, EmbeddingProvider, EmbeddingResult};
use casebase::knowledge::KnowledgeBase;
use casebase::llm::{LlmError, LlmResult, PromptRequest, TextGenerator};
use casebase::merge::Merger;
use casebase::orchestrator::{Orchestrator, OrchestratorOptions};
use casebase::semantic::SemanticAnalyzer;
use casebase::vector::{DistanceMetric, VectorStore};

/// Embeds by substring lookup: the first rule whose needle occurs in the
/// text decides the vector. Counts backend calls and embedded texts.
pub struct NeedleBackend {
    rules: Vec<(String, Vec<f32>)>,
    fallback: Vec<f32>,
    pub calls: AtomicUsize,
    pub texts: AtomicUsize,
}

impl NeedleBackend {
    pub fn new(fallback: Vec<f32>) -> Self {
        Self {
            rules: Vec::new(),
            fallback,
            calls: AtomicUsize::new(0),
            texts: AtomicUsize::new(0),
        }
    }

    pub fn rule(mut self, needle: &str, vector: Vec<f32>) -> Self {
        self.rules.push((needle.to_string(), vector));
        self
    }
}

impl EmbeddingBackend for NeedleBackend {
    fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.texts.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(texts
            .iter()
            .map(|text| {
                self.rules
                    .iter()
                    .find(|(needle, _)| text.contains(needle.as_str()))
                    .map(|(_, v)| v.clone())
                    .unwrap_or_else(|| self.fallback.clone())
            })
            .collect())
    }

    fn dimension(&self) -> usize {
        self.fallback.len()
    }

    fn name(&self) -> &str {
        "needle"
    }
}

type ReplyFn = Box<dyn Fn(&str) -> String + Send + Sync>;

/// Answers analysis, explanation and merge prompts from fixed replies.
///
/// Prompts whose user text contains a `slow` needle sleep first; prompts
/// containing a `failing` needle return a service error. A merge reply
/// built from the prompt's user text takes precedence over the fixed one.
pub struct ScriptedGenerator {
    pub analysis_reply: String,
    pub merge_reply: String,
    pub merge_with: Option<ReplyFn>,
    pub explain_reply: Option<String>,
    pub slow: Vec<(String, Duration)>,
    pub failing: Vec<String>,
    pub analysis_calls: AtomicUsize,
    pub merge_calls: AtomicUsize,
    pub explain_calls: AtomicUsize,
}

impl ScriptedGenerator {
    pub fn new(analysis_reply: &str) -> Self {
        Self {
            analysis_reply: analysis_reply.to_string(),
            merge_reply: String::new(),
            merge_with: None,
            explain_reply: None,
            slow: Vec::new(),
            failing: Vec::new(),
            analysis_calls: AtomicUsize::new(0),
            merge_calls: AtomicUsize::new(0),
            explain_calls: AtomicUsize::new(0),
        }
    }

    pub fn merging(mut self, reply: &str) -> Self {
        self.merge_reply = reply.to_string();
        self
    }

    pub fn merging_with(mut self, reply: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        self.merge_with = Some(Box::new(reply));
        self
    }

    pub fn explaining(mut self, reply: &str) -> Self {
        self.explain_reply = Some(reply.to_string());
        self
    }

    pub fn slow_on(mut self, needle: &str, delay: Duration) -> Self {
        self.slow.push((needle.to_string(), delay));
        self
    }

    pub fn failing_on(mut self, needle: &str) -> Self {
        self.failing.push(needle.to_string());
        self
    }
}

impl TextGenerator for ScriptedGenerator {
    fn generate(&self, request: &PromptRequest) -> LlmResult<String> {
        for (needle, delay) in &self.slow {
            if request.user.contains(needle.as_str()) {
                std::thread::sleep(*delay);
            }
        }
        if self.failing.iter().any(|n| request.user.contains(n.as_str())) {
            return Err(LlmError::Api {
                status: 503,
                message: "service unavailable".to_string(),
            });
        }

        if request.system.contains("Merge two test cases") {
            self.merge_calls.fetch_add(1, Ordering::SeqCst);
            Ok(match &self.merge_with {
                Some(reply) => reply(&request.user),
                None => self.merge_reply.clone(),
            })
        } else if request.system.contains("explain test reconciliation") {
            self.explain_calls.fetch_add(1, Ordering::SeqCst);
            self.explain_reply
                .clone()
                .ok_or_else(|| LlmError::InvalidResponse("no explanation scripted".to_string()))
        } else {
            self.analysis_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.analysis_reply.clone())
        }
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

pub const IDENTICAL: &str = r#"{"business_rule_match": true, "behavior_match": true,
  "coverage_expansion": [], "relationship": "identical", "reasoning": "Same checks."}"#;

pub const EXPANDED: &str = r#"{"business_rule_match": true, "behavior_match": false,
  "coverage_expansion": ["account lockout after failed attempts"],
  "relationship": "expanded", "reasoning": "Adds lockout."}"#;

pub const DIFFERENT: &str = r#"{"business_rule_match": false, "behavior_match": false,
  "coverage_expansion": [], "relationship": "different", "reasoning": "Unrelated."}"#;

pub fn provider(backend: Arc<dyn EmbeddingBackend>) -> Arc<EmbeddingProvider> {
    Arc::new(EmbeddingProvider::new(
        backend,
        Arc::new(EmbeddingCache::new()),
        8000,
        16,
    ))
}

pub fn engine(
    embeddings: Arc<EmbeddingProvider>,
    generator: Arc<ScriptedGenerator>,
) -> ComparisonEngine {
    ComparisonEngine::new(
        embeddings,
        Arc::new(SemanticAnalyzer::new(generator)),
        DecisionPolicy::default(),
    )
}

pub fn options(timeout: Duration) -> OrchestratorOptions {
    OrchestratorOptions {
        workers: 4,
        unit_timeout: timeout,
        top_k: 5,
    }
}

/// In-memory orchestrator wired to the given doubles, merging through the generator.
pub fn orchestrator(
    backend: Arc<dyn EmbeddingBackend>,
    generator: Arc<ScriptedGenerator>,
    timeout: Duration,
) -> Orchestrator {
    let embeddings = provider(backend);
    let engine = engine(Arc::clone(&embeddings), Arc::clone(&generator));
    Orchestrator::new(
        Arc::new(KnowledgeBase::in_memory()),
        Arc::new(VectorStore::in_memory(DistanceMetric::Cosine)),
        embeddings,
        options(timeout),
    )
    .with_comparison(engine, Merger::llm(generator))
}
