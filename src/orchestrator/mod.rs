//! Batch reconciliation of candidate test cases against a suite.
//!
//! Each candidate is one unit of work: embed, retrieve neighbors from the
//! suite's collection, compare against the best match, and optionally apply
//! the decision to the knowledge base and the index. Units run on a bounded
//! rayon pool; a unit that fails or exceeds its deadline is reported and
//! skipped, the rest of the batch carries on.
//!
//! Writes go to the knowledge base first and the index second. A crash in
//! between leaves a record without a vector, which
//! [`Orchestrator::check_consistency`] reports and [`Orchestrator::reindex`]
//! repairs.

mod locks;
mod pool;
mod records;
mod report;
mod unit;

pub use pool::{MAX_WORKERS, clamp_workers};
pub use records::{reconstruct, vector_metadata, vector_record};
pub use report::{
    AppliedChange, BatchReport, BatchSummary, ConsistencyReport, ImportReport, Stats, SuiteStats,
    UnitFailure, UnitOutcome, recommendation,
};

use rayon::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::comparison::{ComparisonEngine, ComparisonError, DecisionPolicy};
use crate::config::Settings;
use crate::embedding::{EmbeddingError, EmbeddingProvider};
use crate::knowledge::{KnowledgeBase, KnowledgeBaseError};
use crate::llm::{ChatClient, LlmError, TextGenerator};
use crate::merge::{MergeStrategy, Merger};
use crate::semantic::SemanticAnalyzer;
use crate::types::TestCase;
use crate::vector::{VectorError, VectorStore};
use crate::{debug_event, log_event};

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Knowledge base error: {0}")]
    KnowledgeBase(#[from] KnowledgeBaseError),

    #[error("Vector index error: {0}")]
    Vector(#[from] VectorError),

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Comparison error: {0}")]
    Comparison(#[from] ComparisonError),

    #[error("Generation client error: {0}")]
    Generation(#[from] LlmError),

    #[error("Failed to start worker pool: {0}")]
    Pool(String),

    #[error("Reconciliation needs a generation client; none is configured")]
    ComparisonUnavailable,
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

/// Why a single unit produced no decision.
#[derive(Error, Debug)]
pub enum UnitError {
    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("index error: {0}")]
    Vector(#[from] VectorError),

    #[error("{0}")]
    Comparison(#[from] ComparisonError),

    #[error("knowledge base error: {0}")]
    KnowledgeBase(#[from] KnowledgeBaseError),

    #[error("analysis timed out after {0:?}")]
    Timeout(Duration),

    #[error("analysis worker exited without a result")]
    WorkerLost,

    #[error("failed to start analysis worker: {0}")]
    Spawn(std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrchestratorOptions {
    pub workers: usize,
    pub unit_timeout: Duration,
    pub top_k: usize,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            workers: 4,
            unit_timeout: Duration::from_secs(120),
            top_k: 10,
        }
    }
}

impl OrchestratorOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            workers: clamp_workers(settings.orchestrator.workers),
            unit_timeout: Duration::from_secs(settings.orchestrator.unit_timeout_secs),
            top_k: settings.retrieval.top_k,
        }
    }
}

/// One batch to reconcile.
#[derive(Debug, Clone, Default)]
pub struct ReconcileRequest {
    pub suite: String,
    pub candidates: Vec<TestCase>,
    /// Neighbors per candidate; configured default when `None`
    pub top_k: Option<usize>,
    pub same_threshold: Option<f32>,
    pub addon_min_threshold: Option<f32>,
    /// Write decisions to the knowledge base and index
    pub apply: bool,
}

impl ReconcileRequest {
    pub fn new(suite: impl Into<String>, candidates: Vec<TestCase>) -> Self {
        Self {
            suite: suite.into(),
            candidates,
            ..Default::default()
        }
    }

    pub fn applying(mut self) -> Self {
        self.apply = true;
        self
    }
}

pub struct Orchestrator {
    kb: Arc<KnowledgeBase>,
    vectors: Arc<VectorStore>,
    embeddings: Arc<EmbeddingProvider>,
    engine: Option<ComparisonEngine>,
    merger: Option<Arc<Merger>>,
    locks: locks::RecordLocks,
    options: OrchestratorOptions,
}

impl Orchestrator {
    pub fn new(
        kb: Arc<KnowledgeBase>,
        vectors: Arc<VectorStore>,
        embeddings: Arc<EmbeddingProvider>,
        options: OrchestratorOptions,
    ) -> Self {
        Self {
            kb,
            vectors,
            embeddings,
            engine: None,
            merger: None,
            locks: locks::RecordLocks::new(),
            options: OrchestratorOptions {
                workers: clamp_workers(options.workers),
                top_k: options.top_k.max(1),
                ..options
            },
        }
    }

    /// Storage and embeddings from settings. Enough for import, reindex,
    /// consistency checks and stats; reconciliation also needs
    /// [`Orchestrator::with_generation`].
    pub fn open(settings: &Settings) -> OrchestratorResult<Self> {
        let kb = KnowledgeBase::open(&settings.storage.suites_dir())?;
        let vectors = VectorStore::open(&settings.storage.vectors_dir(), settings.retrieval.metric);
        let embeddings = EmbeddingProvider::from_config(&settings.embedding)?;
        Ok(Self::new(
            Arc::new(kb),
            Arc::new(vectors),
            Arc::new(embeddings),
            OrchestratorOptions::from_settings(settings),
        ))
    }

    /// Attach the configured generation client for analysis, rationales and merges.
    pub fn with_generation(self, settings: &Settings) -> OrchestratorResult<Self> {
        let client: Arc<dyn TextGenerator> =
            Arc::new(ChatClient::from_config(&settings.generation)?);
        let policy = DecisionPolicy::from_config(&settings.decision)?;

        let mut engine = ComparisonEngine::new(
            Arc::clone(&self.embeddings),
            Arc::new(SemanticAnalyzer::new(Arc::clone(&client))),
            policy,
        );
        if settings.generation.explain {
            engine = engine.with_explainer(Arc::clone(&client));
        }
        let merger = match settings.merge.strategy {
            MergeStrategy::Llm => Merger::llm(client),
            MergeStrategy::Union => Merger::union(),
        };
        Ok(self.with_comparison(engine, merger))
    }

    pub fn with_comparison(mut self, engine: ComparisonEngine, merger: Merger) -> Self {
        self.engine = Some(engine);
        self.merger = Some(Arc::new(merger));
        self
    }

    pub fn knowledge_base(&self) -> &Arc<KnowledgeBase> {
        &self.kb
    }

    pub fn vectors(&self) -> &Arc<VectorStore> {
        &self.vectors
    }

    pub fn embeddings(&self) -> &Arc<EmbeddingProvider> {
        &self.embeddings
    }

    pub fn options(&self) -> &OrchestratorOptions {
        &self.options
    }

    /// Decide SAME / ADD-ON / NEW for every candidate, applying when asked.
    ///
    /// Only setup problems (bad threshold override, pool creation) fail the
    /// call; per-candidate problems land in [`BatchReport::failures`].
    pub fn reconcile(&self, request: ReconcileRequest) -> OrchestratorResult<BatchReport> {
        let (engine, merger) = match (&self.engine, &self.merger) {
            (Some(engine), Some(merger)) => (engine, merger),
            _ => return Err(OrchestratorError::ComparisonUnavailable),
        };
        let policy = engine
            .policy()
            .with_thresholds(request.same_threshold, request.addon_min_threshold)?;
        let engine = engine.with_policy(policy);

        let started = Instant::now();
        let collection = self.vectors.collection(&request.suite)?;
        let ctx = unit::UnitContext {
            suite: &request.suite,
            kb: &self.kb,
            collection: &collection,
            embeddings: &self.embeddings,
            engine: &engine,
            merger,
            locks: &self.locks,
            top_k: request.top_k.unwrap_or(self.options.top_k).max(1),
            timeout: self.options.unit_timeout,
            apply: request.apply,
        };

        log_event!(
            "reconcile",
            "started",
            "suite='{}' candidates={} workers={} apply={}",
            request.suite,
            request.candidates.len(),
            self.options.workers,
            request.apply
        );

        let results: Vec<Result<UnitOutcome, UnitFailure>> = if request.candidates.is_empty() {
            Vec::new()
        } else {
            let pool = pool::build_pool(self.options.workers)?;
            pool.install(|| {
                request
                    .candidates
                    .par_iter()
                    .enumerate()
                    .map(|(index, candidate)| unit::run(&ctx, index, candidate))
                    .collect()
            })
        };

        let mut outcomes = Vec::new();
        let mut failures = Vec::new();
        for result in results {
            match result {
                Ok(outcome) => outcomes.push(outcome),
                Err(failure) => {
                    tracing::warn!(
                        target: "orchestrator",
                        "Candidate {} '{}' failed: {}",
                        failure.index,
                        failure.title,
                        failure.error
                    );
                    failures.push(failure);
                }
            }
        }

        let summary = BatchSummary::from_outcomes(&outcomes, failures.len());
        log_event!(
            "reconcile",
            "finished",
            "suite='{}' same={} add-on={} new={} failed={}",
            request.suite,
            summary.same,
            summary.add_on,
            summary.new,
            summary.failed
        );

        Ok(BatchReport {
            suite: request.suite,
            applied: request.apply,
            summary,
            outcomes,
            failures,
            elapsed_ms: started.elapsed().as_millis(),
        })
    }

    /// Store test cases without comparing them, then index them in one batch.
    ///
    /// Duplicate ids are skipped and reported.
    pub fn import(
        &self,
        suite: &str,
        test_cases: Vec<TestCase>,
    ) -> OrchestratorResult<ImportReport> {
        self.kb.get_or_create_suite(suite, "")?;
        let mut report = ImportReport {
            suite: suite.to_string(),
            ..Default::default()
        };

        let mut stored = Vec::with_capacity(test_cases.len());
        for (index, tc) in test_cases.into_iter().enumerate() {
            match self.kb.add(suite, tc.clone()) {
                Ok(added) => stored.push(added),
                Err(e @ KnowledgeBaseError::DuplicateId { .. }) => {
                    report.skipped.push(UnitFailure::new(index, &tc, e));
                }
                Err(e) => return Err(e.into()),
            }
        }

        self.index_records(suite, &stored)?;
        report.added = stored.into_iter().map(|tc| tc.id).collect();
        log_event!(
            "import",
            "finished",
            "suite='{suite}' added={} skipped={}",
            report.added.len(),
            report.skipped.len()
        );
        Ok(report)
    }

    /// Rebuild a suite's collection from the knowledge base.
    ///
    /// Embeddings are computed before the collection is cleared, so a
    /// failing provider leaves the old index untouched.
    pub fn reindex(&self, suite: &str) -> OrchestratorResult<usize> {
        if !self.kb.has_suite(suite) {
            return Err(KnowledgeBaseError::SuiteNotFound(suite.to_string()).into());
        }
        let test_cases = self.kb.list(suite);
        let texts: Vec<String> = test_cases.iter().map(TestCase::canonical_text).collect();
        let vectors = self.embeddings.embed_batch(&texts)?;

        let collection = self.vectors.collection(suite)?;
        collection.reset()?;
        let records = test_cases
            .iter()
            .zip(vectors)
            .map(|(tc, v)| vector_record(tc, v))
            .collect();
        collection.upsert_batch(records)?;

        log_event!("reindex", "finished", "suite='{suite}' records={}", test_cases.len());
        Ok(test_cases.len())
    }

    /// Remove a test case from the knowledge base and the suite's collection.
    ///
    /// Returns whether either store held it. A vector left behind by an
    /// earlier partial write is removed too.
    pub fn delete(&self, suite: &str, id: &str) -> OrchestratorResult<bool> {
        let lock = self.locks.get(suite, id);
        let _guard = lock.lock();

        let in_kb = self.kb.delete(suite, id)?;
        let in_index = self.vectors.collection(suite)?.delete(id)?;
        if in_kb != in_index {
            tracing::warn!(
                target: "orchestrator",
                "'{id}' was only in the {} of suite '{suite}'",
                if in_kb { "knowledge base" } else { "index" }
            );
        }
        let found = in_kb || in_index;
        debug_event!("delete", "finished", "suite='{suite}' id='{id}' found={found}");
        Ok(found)
    }

    /// Compare ids between a suite and its collection.
    pub fn check_consistency(&self, suite: &str) -> OrchestratorResult<ConsistencyReport> {
        let kb_ids: Vec<String> = self.kb.list(suite).into_iter().map(|tc| tc.id).collect();
        let collection = self.vectors.collection(suite)?;
        let index_ids = collection.ids();

        let in_kb: HashSet<&str> = kb_ids.iter().map(String::as_str).collect();
        let in_index: HashSet<&str> = index_ids.iter().map(String::as_str).collect();

        let report = ConsistencyReport {
            suite: suite.to_string(),
            knowledge_base_count: kb_ids.len(),
            index_count: index_ids.len(),
            missing_from_index: kb_ids
                .iter()
                .filter(|id| !in_index.contains(id.as_str()))
                .cloned()
                .collect(),
            missing_from_knowledge_base: index_ids
                .iter()
                .filter(|id| !in_kb.contains(id.as_str()))
                .cloned()
                .collect(),
        };
        if !report.is_consistent() {
            tracing::warn!(
                target: "orchestrator",
                "Suite '{suite}' is out of sync: {} without vectors, {} orphaned vectors",
                report.missing_from_index.len(),
                report.missing_from_knowledge_base.len()
            );
        }
        Ok(report)
    }

    pub fn stats(&self) -> OrchestratorResult<Stats> {
        let mut suites = Vec::new();
        for info in self.kb.list_suites() {
            suites.push(SuiteStats {
                vectors: self.vectors.count(&info.name)?,
                name: info.name,
                test_cases: info.test_cases,
                version: info.version,
            });
        }
        Ok(Stats {
            suites,
            embedding_backend: self.embeddings.backend_name().to_string(),
            dimension: self.embeddings.dimension(),
            cache: self.embeddings.cache_stats(),
        })
    }

    fn index_records(&self, suite: &str, test_cases: &[TestCase]) -> OrchestratorResult<()> {
        if test_cases.is_empty() {
            return Ok(());
        }
        let texts: Vec<String> = test_cases.iter().map(TestCase::canonical_text).collect();
        let vectors = self.embeddings.embed_batch(&texts)?;
        let records = test_cases
            .iter()
            .zip(vectors)
            .map(|(tc, v)| vector_record(tc, v))
            .collect();
        self.vectors.collection(suite)?.upsert_batch(records)?;
        debug_event!("index", "upserted", "suite='{suite}' records={}", test_cases.len());
        Ok(())
    }
}
