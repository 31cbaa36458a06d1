//! Recent decisions, offered to the analysis prompt as precedent.

use parking_lot::Mutex;
use std::collections::VecDeque;

use crate::llm::prompts::PriorDecision;

/// Bounded log of the most recent decisions, oldest dropped first.
pub struct DecisionHistory {
    capacity: usize,
    entries: Mutex<VecDeque<PriorDecision>>,
}

impl DecisionHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn record(&self, decision: PriorDecision) {
        if self.capacity == 0 {
            return;
        }
        let mut entries = self.entries.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(decision);
    }

    /// Up to `limit` entries whose similarity is nearest to `similarity`, nearest first.
    pub fn closest(&self, similarity: f32, limit: usize) -> Vec<PriorDecision> {
        let mut nearest: Vec<PriorDecision> = self.entries.lock().iter().cloned().collect();
        nearest.sort_by(|a, b| {
            let da = (a.similarity - similarity).abs();
            let db = (b.similarity - similarity).abs();
            da.total_cmp(&db)
        });
        nearest.truncate(limit);
        nearest
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
