//! Knowledge base: named suites of test cases, one JSON record per suite.
//!
//! Every mutation of a suite happens under that suite's lock and ends with
//! an atomic rewrite of its file, so concurrent workers touching different
//! test cases of the same suite cannot lose each other's updates.

mod import;
mod store;
mod suite;

pub use import::{load_test_cases, parse_test_cases};
pub use store::KnowledgeBase;
pub use suite::{Suite, SuiteInfo, TestCaseFilter};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KnowledgeBaseError {
    #[error("Failed to read {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    FileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid JSON in {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Suite '{0}' not found")]
    SuiteNotFound(String),

    #[error("Test case '{id}' not found in suite '{suite}'")]
    NotFound { suite: String, id: String },

    #[error("Test case '{id}' already exists in suite '{suite}'")]
    DuplicateId { suite: String, id: String },

    #[error("Invalid import file: {0}")]
    InvalidImport(String),
}

pub type KbResult<T> = Result<T, KnowledgeBaseError>;
