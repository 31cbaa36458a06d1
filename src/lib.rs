pub mod cli;
pub mod comparison;
pub mod config;
pub mod embedding;
pub mod io;
pub mod knowledge;
pub mod llm;
pub mod logging;
pub mod merge;
pub mod orchestrator;
pub mod semantic;
pub mod types;
pub mod utils;
pub mod vector;

pub use comparison::{ComparisonEngine, DecisionPolicy};
pub use config::Settings;
pub use embedding::{EmbeddingBackend, EmbeddingProvider};
pub use knowledge::{KnowledgeBase, Suite, TestCaseFilter};
pub use merge::{MergeStrategy, Merger};
pub use orchestrator::{BatchReport, Orchestrator, ReconcileRequest};
pub use semantic::SemanticAnalyzer;
pub use types::{ComparisonResult, Decision, Priority, TestCase, TestStep, TestType};
pub use vector::{DistanceMetric, VectorIndex, VectorStore};
