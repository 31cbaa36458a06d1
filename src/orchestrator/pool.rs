//! Bounded worker pool and per-unit analysis deadline.

use crossbeam_channel::{RecvTimeoutError, bounded};
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::time::Duration;

use super::{OrchestratorError, OrchestratorResult, UnitError};
use crate::comparison::ComparisonEngine;
use crate::types::{ComparisonResult, TestCase};

/// Upper bound on concurrent reconciliation units.
pub const MAX_WORKERS: usize = 10;

pub fn clamp_workers(workers: usize) -> usize {
    workers.clamp(1, MAX_WORKERS)
}

pub fn build_pool(workers: usize) -> OrchestratorResult<ThreadPool> {
    ThreadPoolBuilder::new()
        .num_threads(clamp_workers(workers))
        .thread_name(|i| format!("reconcile-{i}"))
        .build()
        .map_err(|e| OrchestratorError::Pool(e.to_string()))
}

/// Run the pairwise comparison on a helper thread and wait at most `timeout`.
///
/// On timeout the helper is abandoned: it finishes on its own and its result
/// is dropped with the channel, so nothing it computed is ever applied.
pub fn compare_with_deadline(
    engine: &ComparisonEngine,
    candidate: &TestCase,
    existing: TestCase,
    embedding_similarity: f32,
    timeout: Duration,
) -> Result<ComparisonResult, UnitError> {
    let (tx, rx) = bounded(1);
    let engine = engine.clone();
    let candidate = candidate.clone();

    std::thread::Builder::new()
        .name("reconcile-analysis".to_string())
        .spawn(move || {
            let result =
                engine.compare_with_similarity(&candidate, &existing, embedding_similarity);
            // Receiver is gone when the unit already timed out
            let _ = tx.send(result);
        })
        .map_err(UnitError::Spawn)?;

    match rx.recv_timeout(timeout) {
        Ok(result) => result.map_err(UnitError::from),
        Err(RecvTimeoutError::Timeout) => Err(UnitError::Timeout(timeout)),
        Err(RecvTimeoutError::Disconnected) => Err(UnitError::WorkerLost),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_workers() {
        assert_eq!(clamp_workers(0), 1);
        assert_eq!(clamp_workers(4), 4);
        assert_eq!(clamp_workers(64), MAX_WORKERS);
    }

    #[test]
    fn test_pool_size_is_bounded() {
        let pool = build_pool(32).unwrap();
        assert_eq!(pool.current_num_threads(), MAX_WORKERS);
    }
}
