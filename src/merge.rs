//! Merging an ADD-ON candidate into the test case it extends.
//!
//! The merged record always keeps the existing id and creation time and
//! carries `existing.version + 1`. Two strategies:
//!
//! - `llm`: the generative service writes the merged test case
//! - `union`: deterministic field union, existing content first

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

use crate::llm::{JsonExtraction, LlmError, TextGenerator, extract_json, prompts};
use crate::types::{TestCase, TestStep, parse_test_case};

#[derive(Error, Debug)]
pub enum MergeError {
    #[error("Merge generation failed: {0}")]
    Generation(#[from] LlmError),

    #[error("Merge output could not be used: {0}")]
    Unparsable(String),

    #[error("LLM merge strategy configured without a generation client")]
    NoGenerator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeStrategy {
    #[default]
    Llm,
    Union,
}

impl FromStr for MergeStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "llm" => Ok(MergeStrategy::Llm),
            "union" => Ok(MergeStrategy::Union),
            other => Err(format!("unknown merge strategy '{other}' (expected llm or union)")),
        }
    }
}

pub struct Merger {
    strategy: MergeStrategy,
    generator: Option<Arc<dyn TextGenerator>>,
}

impl Merger {
    pub fn llm(generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            strategy: MergeStrategy::Llm,
            generator: Some(generator),
        }
    }

    pub fn union() -> Self {
        Self {
            strategy: MergeStrategy::Union,
            generator: None,
        }
    }

    pub fn strategy(&self) -> MergeStrategy {
        self.strategy
    }

    /// Produce the replacement for `existing`. Neither input is modified.
    pub fn merge(
        &self,
        existing: &TestCase,
        candidate: &TestCase,
        coverage: &[String],
    ) -> Result<TestCase, MergeError> {
        let merged = match self.strategy {
            MergeStrategy::Llm => {
                let generator = self.generator.as_ref().ok_or(MergeError::NoGenerator)?;
                llm_merge(generator.as_ref(), existing, candidate, coverage)?
            }
            MergeStrategy::Union => union_merge(existing, candidate, coverage),
        };

        tracing::info!(
            target: "merge",
            "Merged '{}' into '{}' ({:?}), version {} -> {}",
            candidate.id,
            existing.id,
            self.strategy,
            existing.version,
            merged.version
        );
        Ok(merged)
    }
}

fn llm_merge(
    generator: &dyn TextGenerator,
    existing: &TestCase,
    candidate: &TestCase,
    coverage: &[String],
) -> Result<TestCase, MergeError> {
    let raw = generator.generate(&prompts::merge(existing, candidate, coverage))?;

    let value = match extract_json(&raw) {
        JsonExtraction::Parsed(value) => value,
        JsonExtraction::Fallback { reason } => return Err(MergeError::Unparsable(reason)),
    };
    let object = match &value {
        Value::Object(_) => &value,
        Value::Array(items) => items
            .iter()
            .find(|v| v.is_object())
            .ok_or_else(|| MergeError::Unparsable("no object in merge output".to_string()))?,
        _ => return Err(MergeError::Unparsable("merge output is not an object".to_string())),
    };

    let has_content = ["title", "description", "test_steps", "steps"]
        .iter()
        .any(|key| object.get(*key).is_some_and(|v| !v.is_null()));
    if !has_content {
        return Err(MergeError::Unparsable(
            "merge output has no title, description or steps".to_string(),
        ));
    }

    let mut merged = parse_test_case(object)
        .ok_or_else(|| MergeError::Unparsable("merge output is not a test case".to_string()))?;
    stamp(&mut merged, existing);
    Ok(merged)
}

fn union_merge(existing: &TestCase, candidate: &TestCase, coverage: &[String]) -> TestCase {
    let mut merged = existing.clone();

    append_unique(&mut merged.preconditions, &candidate.preconditions);
    append_unique(&mut merged.postconditions, &candidate.postconditions);
    append_unique(&mut merged.side_effects, &candidate.side_effects);
    append_unique(&mut merged.boundary_conditions, &candidate.boundary_conditions);
    append_unique(&mut merged.boundary_conditions, coverage);

    for step in &candidate.steps {
        let known = merged
            .steps
            .iter()
            .any(|s| s.action.trim().eq_ignore_ascii_case(step.action.trim()));
        if !known {
            merged.steps.push(TestStep {
                step_number: 0,
                action: step.action.clone(),
                expected_result: step.expected_result.clone(),
            });
        }
    }
    merged.renumber_steps();

    for tag in &candidate.tags {
        merged.tags.insert(tag.clone());
    }
    if merged.expected_outcome.trim().is_empty() {
        merged.expected_outcome = candidate.expected_outcome.clone();
    }
    merged.priority = merged.priority.max(candidate.priority);
    merged.is_regression = existing.is_regression || candidate.is_regression;

    stamp(&mut merged, existing);
    merged
}

/// Identity comes from the existing record; the version moves up by one.
fn stamp(merged: &mut TestCase, existing: &TestCase) {
    merged.id = existing.id.clone();
    merged.created_at = existing.created_at;
    merged.updated_at = Utc::now();
    merged.version = existing.version + 1;
    if merged.source_document.is_none() {
        merged.source_document = existing.source_document.clone();
    }
    merged.renumber_steps();
}

fn append_unique(target: &mut Vec<String>, additions: &[String]) {
    for item in additions {
        let trimmed = item.trim();
        if trimmed.is_empty() {
            continue;
        }
        if !target.iter().any(|t| t.trim().eq_ignore_ascii_case(trimmed)) {
            target.push(trimmed.to_string());
        }
    }
}
