use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Priority, TestCase, TestType};

/// Named, ordered collection of test cases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suite {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub test_cases: Vec<TestCase>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
    #[serde(default = "default_version")]
    pub version: u32,
}

fn default_version() -> u32 {
    1
}

impl Suite {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            description: description.into(),
            test_cases: Vec::new(),
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }

    pub fn get(&self, id: &str) -> Option<&TestCase> {
        self.test_cases.iter().find(|tc| tc.id == id)
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.test_cases.iter().position(|tc| tc.id == id)
    }

    pub fn info(&self) -> SuiteInfo {
        SuiteInfo {
            name: self.name.clone(),
            description: self.description.clone(),
            test_cases: self.test_cases.len(),
            version: self.version,
            updated_at: self.updated_at,
        }
    }
}

/// Suite overview without the test cases.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuiteInfo {
    pub name: String,
    pub description: String,
    pub test_cases: usize,
    pub version: u32,
    pub updated_at: DateTime<Utc>,
}

/// Conjunction of optional criteria; empty criteria match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TestCaseFilter {
    pub priorities: Vec<Priority>,
    pub test_types: Vec<TestType>,
    /// Matches when the test case carries any of these tags (case-insensitive).
    pub tags: Vec<String>,
    pub is_regression: Option<bool>,
}

impl TestCaseFilter {
    pub fn is_empty(&self) -> bool {
        self.priorities.is_empty()
            && self.test_types.is_empty()
            && self.tags.is_empty()
            && self.is_regression.is_none()
    }

    pub fn matches(&self, tc: &TestCase) -> bool {
        if !self.priorities.is_empty() && !self.priorities.contains(&tc.priority) {
            return false;
        }
        if !self.test_types.is_empty() && !self.test_types.contains(&tc.test_type) {
            return false;
        }
        if !self.tags.is_empty()
            && !self
                .tags
                .iter()
                .any(|want| tc.tags.iter().any(|t| t.eq_ignore_ascii_case(want)))
        {
            return false;
        }
        if let Some(flag) = self.is_regression {
            if tc.is_regression != flag {
                return false;
            }
        }
        true
    }
}
