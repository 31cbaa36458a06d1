//! Caching, truncating, batching front for an [`EmbeddingBackend`].

use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::{EmbeddingBackend, EmbeddingError, EmbeddingResult, create_backend};
use crate::config::EmbeddingConfig;
use crate::utils::{content_hash, truncate_chars};

/// Content-addressed embedding cache.
///
/// Keys are SHA-256 digests of the exact (already truncated) text. Entries
/// are inserted whole, so two workers racing on the same miss both call the
/// backend and the second insert simply overwrites an identical vector.
#[derive(Default)]
pub struct EmbeddingCache {
    entries: DashMap<String, Arc<Vec<f32>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

impl EmbeddingCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn get(&self, key: &str) -> Option<Arc<Vec<f32>>> {
        let found = self.entries.get(key).map(|entry| Arc::clone(entry.value()));
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    fn insert(&self, key: String, vector: Arc<Vec<f32>>) {
        self.entries.insert(key, vector);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

pub struct EmbeddingProvider {
    backend: Arc<dyn EmbeddingBackend>,
    cache: Arc<EmbeddingCache>,
    max_chars: usize,
    batch_size: usize,
}

impl EmbeddingProvider {
    pub fn new(
        backend: Arc<dyn EmbeddingBackend>,
        cache: Arc<EmbeddingCache>,
        max_chars: usize,
        batch_size: usize,
    ) -> Self {
        Self {
            backend,
            cache,
            max_chars: max_chars.max(1),
            batch_size: batch_size.max(1),
        }
    }

    /// Build the configured backend with a fresh cache.
    pub fn from_config(config: &EmbeddingConfig) -> EmbeddingResult<Self> {
        let backend = create_backend(config)?;
        tracing::info!(
            target: "embedding",
            "Embedding backend '{}' ready ({} dimensions)",
            backend.name(),
            backend.dimension()
        );
        Ok(Self::new(
            backend,
            Arc::new(EmbeddingCache::new()),
            config.max_chars,
            config.batch_size,
        ))
    }

    pub fn dimension(&self) -> usize {
        self.backend.dimension()
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn cache(&self) -> &Arc<EmbeddingCache> {
        &self.cache
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Embed one text. Served from cache when the truncated text was seen before.
    pub fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
        self.embed_batch(&[text])?
            .pop()
            .ok_or_else(|| EmbeddingError::InvalidResponse("no embedding returned".to_string()))
    }

    /// Embed many texts, preserving input order.
    ///
    /// Cached texts are answered locally; the remaining distinct texts go to
    /// the backend in sub-batches of at most `batch_size`.
    pub fn embed_batch<S: AsRef<str>>(&self, texts: &[S]) -> EmbeddingResult<Vec<Vec<f32>>> {
        let mut results: Vec<Option<Arc<Vec<f32>>>> = vec![None; texts.len()];
        // key -> (truncated text, positions waiting on it)
        let mut pending: Vec<(String, &str, Vec<usize>)> = Vec::new();
        let mut pending_index: HashMap<String, usize> = HashMap::new();

        for (pos, text) in texts.iter().enumerate() {
            let truncated = truncate_chars(text.as_ref(), self.max_chars);
            let key = content_hash(truncated);

            if let Some(&slot) = pending_index.get(&key) {
                pending[slot].2.push(pos);
                continue;
            }
            match self.cache.get(&key) {
                Some(vector) => results[pos] = Some(vector),
                None => {
                    pending_index.insert(key.clone(), pending.len());
                    pending.push((key, truncated, vec![pos]));
                }
            }
        }

        if !pending.is_empty() {
            tracing::debug!(
                target: "embedding",
                "Cache served {} of {} texts, embedding {} via '{}'",
                texts.len() - pending.iter().map(|p| p.2.len()).sum::<usize>(),
                texts.len(),
                pending.len(),
                self.backend.name()
            );
        }

        for chunk in pending.chunks(self.batch_size) {
            let inputs: Vec<&str> = chunk.iter().map(|(_, text, _)| *text).collect();
            let vectors = self.backend.embed_batch(&inputs)?;

            if vectors.len() != inputs.len() {
                return Err(EmbeddingError::InvalidResponse(format!(
                    "expected {} embeddings, got {}",
                    inputs.len(),
                    vectors.len()
                )));
            }

            for ((key, _, positions), vector) in chunk.iter().zip(vectors) {
                let vector = Arc::new(vector);
                self.cache.insert(key.clone(), Arc::clone(&vector));
                for &pos in positions {
                    results[pos] = Some(Arc::clone(&vector));
                }
            }
        }

        results
            .into_iter()
            .map(|slot| {
                slot.map(|v| v.as_ref().clone()).ok_or_else(|| {
                    EmbeddingError::InvalidResponse("embedding missing for input".to_string())
                })
            })
            .collect()
    }
}
