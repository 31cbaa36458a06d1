//! Semantic analysis of test case pairs.
//!
//! The analyzer asks the generative service how a candidate relates to an
//! existing test case and turns the (possibly malformed) reply into an
//! [`Analysis`]. Malformed replies never raise: they yield the conservative
//! default, which the comparison policy scores toward NEW.

mod analyzer;

pub use analyzer::SemanticAnalyzer;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Categorical relationship reported by the analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Relationship {
    Identical,
    Expanded,
    Similar,
    Related,
    Different,
    /// Any label outside the known set.
    Unknown,
}

impl Relationship {
    pub fn parse(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "identical" => Relationship::Identical,
            "expanded" => Relationship::Expanded,
            "similar" => Relationship::Similar,
            "related" => Relationship::Related,
            "different" => Relationship::Different,
            _ => Relationship::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Relationship::Identical => "identical",
            Relationship::Expanded => "expanded",
            Relationship::Similar => "similar",
            Relationship::Related => "related",
            Relationship::Different => "different",
            Relationship::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Relationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Qualitative judgment of one candidate/existing pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub business_rule_match: bool,
    pub behavior_match: bool,
    pub coverage_expansion: Vec<String>,
    pub relationship: Relationship,
    pub reasoning: String,
}

impl Analysis {
    /// Safe default when the reply cannot be understood: nothing matches.
    pub fn conservative(reason: &str) -> Self {
        Self {
            business_rule_match: false,
            behavior_match: false,
            coverage_expansion: Vec::new(),
            relationship: Relationship::Different,
            reasoning: format!("Error in analysis: {reason}"),
        }
    }

    /// Read an analysis from decoded JSON; missing fields default individually.
    ///
    /// Returns `None` when no object can be found.
    pub fn from_value(value: &Value) -> Option<Self> {
        let object = match value {
            Value::Object(_) => value,
            Value::Array(items) => items.iter().find(|v| v.is_object())?,
            _ => return None,
        };

        let relationship = object
            .get("relationship")
            .and_then(Value::as_str)
            .map(Relationship::parse)
            .unwrap_or(Relationship::Different);

        let coverage_expansion = match object.get("coverage_expansion") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                    Value::String(_) | Value::Null => None,
                    other => Some(other.to_string()),
                })
                .collect(),
            Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
            _ => Vec::new(),
        };

        Some(Self {
            business_rule_match: flag(object.get("business_rule_match")),
            behavior_match: flag(object.get("behavior_match")),
            coverage_expansion,
            relationship,
            reasoning: object
                .get("reasoning")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .trim()
                .to_string(),
        })
    }
}

fn flag(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => matches!(s.trim().to_lowercase().as_str(), "true" | "yes"),
        _ => false,
    }
}

/// Analyzer result, tagged by whether the model reply was understood.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutcome {
    Parsed(Analysis),
    Fallback(Analysis),
}

impl AnalysisOutcome {
    pub fn analysis(&self) -> &Analysis {
        match self {
            AnalysisOutcome::Parsed(a) | AnalysisOutcome::Fallback(a) => a,
        }
    }

    pub fn into_analysis(self) -> Analysis {
        match self {
            AnalysisOutcome::Parsed(a) | AnalysisOutcome::Fallback(a) => a,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, AnalysisOutcome::Fallback(_))
    }
}
