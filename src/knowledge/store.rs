use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{KbResult, KnowledgeBaseError, Suite, SuiteInfo, TestCaseFilter};
use crate::types::TestCase;
use crate::utils::{suite_file_stem, write_atomic};

/// Suites keyed by name, each behind its own lock.
pub struct KnowledgeBase {
    dir: Option<PathBuf>,
    suites: DashMap<String, Arc<Mutex<Suite>>>,
}

impl KnowledgeBase {
    /// Load every `*.json` suite under `dir`, creating the directory if needed.
    ///
    /// Files that cannot be read or parsed are skipped with a warning.
    pub fn open(dir: &Path) -> KbResult<Self> {
        std::fs::create_dir_all(dir).map_err(|source| KnowledgeBaseError::FileWrite {
            path: dir.to_path_buf(),
            source,
        })?;

        let entries = std::fs::read_dir(dir).map_err(|source| KnowledgeBaseError::FileRead {
            path: dir.to_path_buf(),
            source,
        })?;

        let suites = DashMap::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match read_suite(&path) {
                Ok(suite) if !owns_file(&path, &suite.name) => tracing::warn!(
                    target: "knowledge",
                    "Skipping {}: it holds suite '{}', expected file {}.json",
                    path.display(),
                    suite.name,
                    suite_file_stem(&suite.name)
                ),
                Ok(suite) => {
                    tracing::debug!(
                        target: "knowledge",
                        "Loaded suite '{}' ({} test cases)",
                        suite.name,
                        suite.test_cases.len()
                    );
                    suites.insert(suite.name.clone(), Arc::new(Mutex::new(suite)));
                }
                Err(e) => tracing::warn!(target: "knowledge", "Skipping suite file: {e}"),
            }
        }

        tracing::info!(target: "knowledge", "Knowledge base opened with {} suites", suites.len());
        Ok(Self {
            dir: Some(dir.to_path_buf()),
            suites,
        })
    }

    /// Knowledge base without persistence.
    pub fn in_memory() -> Self {
        Self {
            dir: None,
            suites: DashMap::new(),
        }
    }

    fn handle(&self, name: &str) -> KbResult<Arc<Mutex<Suite>>> {
        self.suites
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| KnowledgeBaseError::SuiteNotFound(name.to_string()))
    }

    fn handle_or_create(&self, name: &str, description: &str) -> KbResult<Arc<Mutex<Suite>>> {
        let mut created = false;
        let handle = Arc::clone(
            self.suites
                .entry(name.to_string())
                .or_insert_with(|| {
                    created = true;
                    Arc::new(Mutex::new(Suite::new(name, description)))
                })
                .value(),
        );
        if created {
            let suite = handle.lock();
            self.persist(&suite)?;
            tracing::info!(target: "knowledge", "Created suite '{name}'");
        }
        Ok(handle)
    }

    /// Existing suite, or a new empty one persisted immediately.
    pub fn get_or_create_suite(&self, name: &str, description: &str) -> KbResult<SuiteInfo> {
        let handle = self.handle_or_create(name, description)?;
        let info = handle.lock().info();
        Ok(info)
    }

    pub fn suite(&self, name: &str) -> Option<Suite> {
        self.suites.get(name).map(|entry| entry.value().lock().clone())
    }

    pub fn has_suite(&self, name: &str) -> bool {
        self.suites.contains_key(name)
    }

    /// Append a test case; the suite is created when missing.
    ///
    /// An id already present in the suite is rejected.
    pub fn add(&self, suite_name: &str, test_case: TestCase) -> KbResult<TestCase> {
        let handle = self.handle_or_create(suite_name, "")?;
        let mut suite = handle.lock();

        if suite.get(&test_case.id).is_some() {
            return Err(KnowledgeBaseError::DuplicateId {
                suite: suite_name.to_string(),
                id: test_case.id,
            });
        }

        let mut test_case = test_case;
        test_case.renumber_steps();
        suite.test_cases.push(test_case.clone());
        suite.updated_at = Utc::now();
        self.persist(&suite)?;

        tracing::debug!(target: "knowledge", "Added '{}' to suite '{suite_name}'", test_case.id);
        Ok(test_case)
    }

    /// Replace a test case by id.
    ///
    /// The stored version is incremented by exactly one regardless of the
    /// incoming value; `created_at` is kept from the stored record. The suite
    /// version is bumped as well.
    pub fn update(&self, suite_name: &str, test_case: TestCase) -> KbResult<TestCase> {
        let handle = self.handle(suite_name)?;
        let mut suite = handle.lock();

        let Some(pos) = suite.position(&test_case.id) else {
            return Err(KnowledgeBaseError::NotFound {
                suite: suite_name.to_string(),
                id: test_case.id,
            });
        };

        let now = Utc::now();
        let stored = &suite.test_cases[pos];
        let mut updated = test_case;
        updated.version = stored.version + 1;
        updated.created_at = stored.created_at;
        updated.updated_at = now;
        updated.renumber_steps();

        suite.test_cases[pos] = updated.clone();
        suite.version += 1;
        suite.updated_at = now;
        self.persist(&suite)?;

        tracing::debug!(
            target: "knowledge",
            "Updated '{}' in suite '{suite_name}' to version {}",
            updated.id,
            updated.version
        );
        Ok(updated)
    }

    pub fn get(&self, suite_name: &str, id: &str) -> Option<TestCase> {
        let handle = self.handle(suite_name).ok()?;
        let suite = handle.lock();
        suite.get(id).cloned()
    }

    /// All test cases of a suite in insertion order (empty for unknown suites).
    pub fn list(&self, suite_name: &str) -> Vec<TestCase> {
        match self.handle(suite_name) {
            Ok(handle) => handle.lock().test_cases.clone(),
            Err(_) => Vec::new(),
        }
    }

    pub fn filter(&self, suite_name: &str, filter: &TestCaseFilter) -> Vec<TestCase> {
        match self.handle(suite_name) {
            Ok(handle) => handle
                .lock()
                .test_cases
                .iter()
                .filter(|tc| filter.matches(tc))
                .cloned()
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Suite overviews sorted by name.
    pub fn list_suites(&self) -> Vec<SuiteInfo> {
        let mut infos: Vec<SuiteInfo> = self
            .suites
            .iter()
            .map(|entry| entry.value().lock().info())
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    /// Remove a test case. Returns whether it existed.
    pub fn delete(&self, suite_name: &str, id: &str) -> KbResult<bool> {
        let handle = self.handle(suite_name)?;
        let mut suite = handle.lock();
        let Some(pos) = suite.position(id) else {
            return Ok(false);
        };
        suite.test_cases.remove(pos);
        suite.updated_at = Utc::now();
        self.persist(&suite)?;
        tracing::debug!(target: "knowledge", "Deleted '{id}' from suite '{suite_name}'");
        Ok(true)
    }

    fn suite_path(&self, name: &str) -> Option<PathBuf> {
        self.dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.json", suite_file_stem(name))))
    }

    /// Caller holds the suite lock.
    fn persist(&self, suite: &Suite) -> KbResult<()> {
        let Some(path) = self.suite_path(&suite.name) else {
            return Ok(());
        };
        let json = serde_json::to_vec_pretty(suite)?;
        write_atomic(&path, &json).map_err(|source| KnowledgeBaseError::FileWrite { path, source })
    }
}

/// A suite file is only trusted when its stem matches the suite it holds.
fn owns_file(path: &Path, name: &str) -> bool {
    path.file_stem().and_then(|s| s.to_str()) == Some(suite_file_stem(name).as_str())
}

fn read_suite(path: &Path) -> KbResult<Suite> {
    let json = std::fs::read_to_string(path).map_err(|source| KnowledgeBaseError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&json).map_err(|source| KnowledgeBaseError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
