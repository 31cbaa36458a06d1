//! Hybrid comparison: embedding similarity fused with semantic analysis.
//!
//! [`DecisionPolicy`] holds the scoring rules; [`ComparisonEngine`] gathers
//! the two signals for a pair and applies them.

mod engine;
mod history;
mod policy;

pub use engine::ComparisonEngine;
pub use history::DecisionHistory;
pub use policy::DecisionPolicy;

use thiserror::Error;

use crate::embedding::EmbeddingError;
use crate::llm::LlmError;

#[derive(Error, Debug)]
pub enum ComparisonError {
    #[error("Embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Semantic analysis failed: {0}")]
    Analysis(#[from] LlmError),

    #[error("Invalid decision policy: {0}")]
    InvalidPolicy(String),
}

pub type CompareResult<T> = Result<T, ComparisonError>;
