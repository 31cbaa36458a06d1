//! A single persisted vector collection.

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use super::{DistanceMetric, Metadata, VectorError, VectorResult};
use crate::utils::write_atomic;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub embedding: Vec<f32>,
    pub document: String,
    #[serde(default)]
    pub metadata: Metadata,
}

/// One search result.
///
/// `similarity` is `1 - distance` under the collection metric. Callers that
/// need the provider's `[0, 1]` similarity recompute it from `embedding`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryHit {
    pub id: String,
    pub document: String,
    pub metadata: Metadata,
    pub similarity: f32,
    #[serde(skip)]
    pub embedding: Vec<f32>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CollectionFile {
    name: String,
    metric: DistanceMetric,
    dimension: Option<usize>,
    records: Vec<VectorRecord>,
}

#[derive(Debug, Default)]
struct State {
    dimension: Option<usize>,
    records: IndexMap<String, VectorRecord>,
}

#[derive(Debug)]
pub struct VectorIndex {
    name: String,
    path: Option<PathBuf>,
    metric: DistanceMetric,
    state: RwLock<State>,
}

impl VectorIndex {
    /// Volatile collection, nothing written to disk.
    pub fn in_memory(name: impl Into<String>, metric: DistanceMetric) -> Self {
        Self {
            name: name.into(),
            path: None,
            metric,
            state: RwLock::new(State::default()),
        }
    }

    /// Open the collection stored at `path`, or start an empty one.
    ///
    /// The metric stored in an existing file wins over `metric`.
    pub fn open(
        name: impl Into<String>,
        path: &Path,
        metric: DistanceMetric,
    ) -> VectorResult<Self> {
        let name = name.into();
        if !path.exists() {
            return Ok(Self {
                name,
                path: Some(path.to_path_buf()),
                metric,
                state: RwLock::new(State::default()),
            });
        }

        let json = std::fs::read_to_string(path).map_err(|source| VectorError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        let file: CollectionFile =
            serde_json::from_str(&json).map_err(|source| VectorError::Corrupt {
                path: path.to_path_buf(),
                source,
            })?;
        if file.name != name {
            return Err(VectorError::NameMismatch {
                path: path.to_path_buf(),
                expected: name,
                found: file.name,
            });
        }

        tracing::debug!(
            target: "vector",
            "Opened collection '{name}' with {} records ({})",
            file.records.len(),
            file.metric
        );

        let records = file
            .records
            .into_iter()
            .map(|r| (r.id.clone(), r))
            .collect();

        Ok(Self {
            name,
            path: Some(path.to_path_buf()),
            metric: file.metric,
            state: RwLock::new(State {
                dimension: file.dimension,
                records,
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    pub fn dimension(&self) -> Option<usize> {
        self.state.read().dimension
    }

    /// Insert or replace one record.
    pub fn upsert(
        &self,
        id: &str,
        embedding: Vec<f32>,
        document: &str,
        metadata: Metadata,
    ) -> VectorResult<()> {
        self.upsert_batch(vec![VectorRecord {
            id: id.to_string(),
            embedding,
            document: document.to_string(),
            metadata,
        }])
    }

    /// Insert or replace many records with a single file write.
    ///
    /// All records are validated before any is applied.
    pub fn upsert_batch(&self, records: Vec<VectorRecord>) -> VectorResult<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut state = self.state.write();
        let mut dimension = state.dimension;
        for record in &records {
            if record.embedding.is_empty() {
                return Err(VectorError::EmptyVector(record.id.clone()));
            }
            match dimension {
                Some(expected) if expected != record.embedding.len() => {
                    return Err(VectorError::DimensionMismatch {
                        expected,
                        actual: record.embedding.len(),
                    });
                }
                Some(_) => {}
                None => dimension = Some(record.embedding.len()),
            }
        }

        let count = records.len();
        state.dimension = dimension;
        for record in records {
            state.records.insert(record.id.clone(), record);
        }
        self.persist(&state)?;

        tracing::debug!(target: "vector", "Upserted {count} records into '{}'", self.name);
        Ok(())
    }

    /// Nearest neighbors of `vector`, best first.
    ///
    /// `k` is clamped to the population; an empty collection or `k == 0`
    /// yields an empty list. Equal similarities are ordered by id.
    pub fn query(&self, vector: &[f32], k: usize) -> VectorResult<Vec<QueryHit>> {
        let state = self.state.read();
        if state.records.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        if let Some(expected) = state.dimension {
            if expected != vector.len() {
                return Err(VectorError::DimensionMismatch {
                    expected,
                    actual: vector.len(),
                });
            }
        }

        let mut scored: Vec<(f32, &VectorRecord)> = state
            .records
            .values()
            .map(|record| (1.0 - self.metric.distance(vector, &record.embedding), record))
            .collect();

        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.1.id.cmp(&b.1.id))
        });
        scored.truncate(k.min(state.records.len()));

        Ok(scored
            .into_iter()
            .map(|(similarity, record)| QueryHit {
                id: record.id.clone(),
                document: record.document.clone(),
                metadata: record.metadata.clone(),
                similarity,
                embedding: record.embedding.clone(),
            })
            .collect())
    }

    pub fn get(&self, id: &str) -> Option<VectorRecord> {
        self.state.read().records.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.state.read().records.contains_key(id)
    }

    /// Remove a record. Returns whether it existed.
    pub fn delete(&self, id: &str) -> VectorResult<bool> {
        let mut state = self.state.write();
        let removed = state.records.shift_remove(id).is_some();
        if removed {
            self.persist(&state)?;
        }
        Ok(removed)
    }

    pub fn count(&self) -> usize {
        self.state.read().records.len()
    }

    pub fn ids(&self) -> Vec<String> {
        self.state.read().records.keys().cloned().collect()
    }

    /// Drop every record and forget the dimension.
    pub fn reset(&self) -> VectorResult<()> {
        let mut state = self.state.write();
        state.records.clear();
        state.dimension = None;
        self.persist(&state)?;
        tracing::info!(target: "vector", "Reset collection '{}'", self.name);
        Ok(())
    }

    /// Called with the write lock held, so file writes are serialized.
    fn persist(&self, state: &State) -> VectorResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let file = CollectionFile {
            name: self.name.clone(),
            metric: self.metric,
            dimension: state.dimension,
            records: state.records.values().cloned().collect(),
        };
        let json = serde_json::to_vec(&file)?;
        write_atomic(path, &json).map_err(|source| VectorError::FileWrite {
            path: path.clone(),
            source,
        })
    }
}
