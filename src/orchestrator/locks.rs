//! Per-record write locks.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;

/// One mutex per (suite, id), created on first use.
///
/// Held across read-modify-write sequences on a single record (re-read,
/// merge, update, re-index) so two writers targeting the same record apply
/// one after the other instead of both starting from the same version.
#[derive(Default)]
pub(super) struct RecordLocks {
    locks: DashMap<(String, String), Arc<Mutex<()>>>,
}

impl RecordLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, suite: &str, id: &str) -> Arc<Mutex<()>> {
        let entry = self
            .locks
            .entry((suite.to_string(), id.to_string()))
            .or_insert_with(|| Arc::new(Mutex::new(())));
        Arc::clone(entry.value())
    }
}
