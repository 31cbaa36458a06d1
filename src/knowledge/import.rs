//! Reading test cases from JSON files.

use serde_json::Value;
use std::path::Path;

use super::{KbResult, KnowledgeBaseError};
use crate::llm::{JsonExtraction, extract_json};
use crate::types::{TestCase, parse_test_case};

/// Load test cases from a JSON file. See [`parse_test_cases`] for accepted shapes.
pub fn load_test_cases(path: &Path) -> KbResult<Vec<TestCase>> {
    let text = std::fs::read_to_string(path).map_err(|source| KnowledgeBaseError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    parse_test_cases(&text)
}

/// Accepts a JSON array of test cases, an object holding them under
/// `test_cases` / `testCases`, or a single test case object. Surrounding
/// prose or code fences (model output pasted into a file) are tolerated.
/// Entries that are not objects are skipped with a warning.
pub fn parse_test_cases(text: &str) -> KbResult<Vec<TestCase>> {
    let value = match serde_json::from_str::<Value>(text) {
        Ok(value) => value,
        Err(_) => match extract_json(text) {
            JsonExtraction::Parsed(value) => value,
            JsonExtraction::Fallback { reason } => {
                return Err(KnowledgeBaseError::InvalidImport(reason));
            }
        },
    };

    let entries: Vec<Value> = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => {
            match map.remove("test_cases").or_else(|| map.remove("testCases")) {
                Some(Value::Array(items)) => items,
                Some(_) => {
                    return Err(KnowledgeBaseError::InvalidImport(
                        "`test_cases` must be an array".to_string(),
                    ));
                }
                None => vec![Value::Object(map)],
            }
        }
        _ => {
            return Err(KnowledgeBaseError::InvalidImport(
                "expected a JSON array or object".to_string(),
            ));
        }
    };

    let mut cases = Vec::with_capacity(entries.len());
    for (idx, entry) in entries.iter().enumerate() {
        match parse_test_case(entry) {
            Some(tc) => cases.push(tc),
            None => {
                tracing::warn!(target: "knowledge", "Skipping entry {idx}: not a test case object")
            }
        }
    }
    Ok(cases)
}
