//! One candidate: retrieve, decide, apply.

use std::cmp::Ordering;
use std::time::Duration;

use super::locks::RecordLocks;
use super::pool::compare_with_deadline;
use super::records::{reconstruct, vector_record};
use super::report::{AppliedChange, UnitFailure, UnitOutcome, recommendation};
use super::UnitError;
use crate::comparison::ComparisonEngine;
use crate::debug_event;
use crate::embedding::{EmbeddingProvider, similarity};
use crate::knowledge::KnowledgeBase;
use crate::merge::Merger;
use crate::types::{ComparisonResult, Decision, TestCase};
use crate::vector::{QueryHit, VectorIndex};

pub(super) struct UnitContext<'a> {
    pub suite: &'a str,
    pub kb: &'a KnowledgeBase,
    pub collection: &'a VectorIndex,
    pub embeddings: &'a EmbeddingProvider,
    pub engine: &'a ComparisonEngine,
    pub merger: &'a Merger,
    pub locks: &'a RecordLocks,
    pub top_k: usize,
    pub timeout: Duration,
    pub apply: bool,
}

pub(super) fn run(
    ctx: &UnitContext<'_>,
    index: usize,
    candidate: &TestCase,
) -> Result<UnitOutcome, UnitFailure> {
    let (result, existing) =
        decide(ctx, candidate).map_err(|e| UnitFailure::new(index, candidate, e))?;

    let applied = if ctx.apply {
        let change = apply(ctx, candidate, &result, existing)
            .map_err(|e| UnitFailure::new(index, candidate, e))?;
        Some(change)
    } else {
        None
    };

    debug_event!(
        "unit",
        "decided",
        "#{index} '{}' -> {} (similarity {:.3})",
        candidate.title,
        result.decision(),
        result.similarity()
    );

    Ok(UnitOutcome {
        index,
        candidate_id: candidate.id.clone(),
        title: candidate.title.clone(),
        recommendation: recommendation(candidate, &result),
        result,
        applied,
    })
}

/// The comparison result, plus the existing test case it was made against.
fn decide(
    ctx: &UnitContext<'_>,
    candidate: &TestCase,
) -> Result<(ComparisonResult, Option<TestCase>), UnitError> {
    let vector = ctx.embeddings.embed(&candidate.canonical_text())?;
    let hits = ctx.collection.query(&vector, ctx.top_k)?;

    let Some((best, best_similarity)) = best_hit(&vector, &hits) else {
        return Ok((ComparisonResult::no_candidates(&candidate.id), None));
    };

    let addon_min = ctx.engine.policy().addon_min_threshold();
    if best_similarity < addon_min {
        return Ok((
            ComparisonResult::below_threshold(&candidate.id, &best.id, best_similarity, addon_min),
            None,
        ));
    }

    let existing = match ctx.kb.get(ctx.suite, &best.id) {
        Some(tc) => tc,
        None => {
            tracing::warn!(
                target: "orchestrator",
                "Index entry '{}' has no knowledge base record in '{}'; \
                 comparing against its metadata",
                best.id,
                ctx.suite
            );
            reconstruct(best)
        }
    };

    let result = compare_with_deadline(
        ctx.engine,
        candidate,
        existing.clone(),
        best_similarity,
        ctx.timeout,
    )?;
    Ok((result, Some(existing)))
}

/// Rank hits by the provider's similarity over the stored vectors.
///
/// The index orders by its native metric; rescoring here keeps the number
/// compared against thresholds identical to what a direct comparison gives.
fn best_hit<'h>(vector: &[f32], hits: &'h [QueryHit]) -> Option<(&'h QueryHit, f32)> {
    hits.iter()
        .map(|hit| (hit, similarity(vector, &hit.embedding)))
        .fold(None, |best: Option<(&QueryHit, f32)>, (hit, score)| match best {
            Some((_, best_score))
                if best_score.partial_cmp(&score).unwrap_or(Ordering::Equal) != Ordering::Less =>
            {
                best
            }
            _ => Some((hit, score)),
        })
}

fn apply(
    ctx: &UnitContext<'_>,
    candidate: &TestCase,
    result: &ComparisonResult,
    compared: Option<TestCase>,
) -> Result<AppliedChange, UnitError> {
    match result.decision() {
        Decision::Same => Ok(AppliedChange::Unchanged),
        Decision::New => {
            let stored = insert(ctx, candidate)?;
            Ok(AppliedChange::Inserted { id: stored.id })
        }
        Decision::AddOn => {
            let target_id = result
                .existing_id()
                .or(compared.as_ref().map(|tc| tc.id.as_str()))
                .unwrap_or_default()
                .to_string();

            // Held until the merged record is re-indexed. The re-read below then
            // sees any merge another unit finished into the same target.
            let lock = ctx.locks.get(ctx.suite, &target_id);
            let _guard = lock.lock();

            let Some(existing) = ctx.kb.get(ctx.suite, &target_id) else {
                tracing::warn!(
                    target: "orchestrator",
                    "ADD-ON target '{target_id}' missing from suite '{}'; \
                     storing candidate as new",
                    ctx.suite
                );
                let stored = insert(ctx, candidate)?;
                return Ok(AppliedChange::InsertedMissingTarget {
                    id: stored.id,
                    missing: target_id,
                });
            };

            let coverage = result.coverage_expansion();
            let merged = match ctx.merger.merge(&existing, candidate, coverage) {
                Ok(merged) => merged,
                Err(e) => {
                    tracing::warn!(
                        target: "orchestrator",
                        "Merge into '{}' failed, keeping existing: {e}",
                        existing.id
                    );
                    return Ok(AppliedChange::MergeFailed {
                        existing_id: existing.id,
                        reason: e.to_string(),
                    });
                }
            };

            let updated = ctx.kb.update(ctx.suite, merged)?;
            upsert(ctx, &updated)?;
            Ok(AppliedChange::Merged {
                id: updated.id,
                version: updated.version,
            })
        }
    }
}

fn insert(ctx: &UnitContext<'_>, candidate: &TestCase) -> Result<TestCase, UnitError> {
    let stored = ctx.kb.add(ctx.suite, candidate.clone())?;
    upsert(ctx, &stored)?;
    Ok(stored)
}

fn upsert(ctx: &UnitContext<'_>, tc: &TestCase) -> Result<(), UnitError> {
    let vector = ctx.embeddings.embed(&tc.canonical_text())?;
    ctx.collection.upsert_batch(vec![vector_record(tc, vector)])?;
    Ok(())
}
