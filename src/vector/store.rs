//! Suite name to collection mapping.

use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{DistanceMetric, VectorIndex, VectorResult};
use crate::utils::suite_file_stem;

/// Lazily opened collections under one directory, one file per suite.
pub struct VectorStore {
    root: Option<PathBuf>,
    metric: DistanceMetric,
    collections: DashMap<String, Arc<VectorIndex>>,
}

impl VectorStore {
    pub fn open(root: &Path, metric: DistanceMetric) -> Self {
        Self {
            root: Some(root.to_path_buf()),
            metric,
            collections: DashMap::new(),
        }
    }

    /// Store that never touches disk.
    pub fn in_memory(metric: DistanceMetric) -> Self {
        Self {
            root: None,
            metric,
            collections: DashMap::new(),
        }
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    fn path_for(&self, suite: &str) -> Option<PathBuf> {
        self.root
            .as_ref()
            .map(|root| root.join(format!("{}.json", suite_file_stem(suite))))
    }

    /// Collection for `suite`, opened from disk on first use.
    pub fn collection(&self, suite: &str) -> VectorResult<Arc<VectorIndex>> {
        if let Some(existing) = self.collections.get(suite) {
            return Ok(Arc::clone(existing.value()));
        }

        let index = match self.path_for(suite) {
            Some(path) => VectorIndex::open(suite, &path, self.metric)?,
            None => VectorIndex::in_memory(suite, self.metric),
        };

        // Another thread may have opened it meanwhile; keep whichever landed first.
        let entry = self
            .collections
            .entry(suite.to_string())
            .or_insert_with(|| Arc::new(index));
        Ok(Arc::clone(entry.value()))
    }

    /// Record count of a suite's collection.
    pub fn count(&self, suite: &str) -> VectorResult<usize> {
        Ok(self.collection(suite)?.count())
    }
}
