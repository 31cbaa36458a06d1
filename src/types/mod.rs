//! Core data model: test cases, steps, priorities and comparison results.
//!
//! A [`TestCase`] enters the system as a *candidate* (drafted upstream or
//! imported from a file). Loosely-typed JSON input goes through
//! [`normalize`] which enforces the record invariants:
//!
//! - `description` and `title` are never blank
//! - step numbers are contiguous from 1 and actions carry no ordinal prefix
//! - `id` is content-derived when not supplied
//! - `version` starts at 1

pub mod normalize;

use chrono::{DateTime, Utc};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use normalize::{
    RawTestCase, derive_id, infer_regression, parse_test_case, parse_test_type,
    strip_step_prefix,
};

/// Placeholder used when neither description nor title carries text.
pub const DEFAULT_DESCRIPTION: &str = "Functional requirement validation";

/// Default business rule statement.
pub const DEFAULT_BUSINESS_RULE: &str = "Functional requirement validation";

/// Ordinal priority. `Low < Medium < High < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Priority {
    /// Case-insensitive parse; unknown spellings fall back to `Medium`.
    pub fn parse_loose(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "low" | "p3" | "minor" => Priority::Low,
            "high" | "p1" | "major" => Priority::High,
            "critical" | "p0" | "blocker" | "urgent" => Priority::Critical,
            _ => Priority::Medium,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "Low",
            Priority::Medium => "Medium",
            Priority::High => "High",
            Priority::Critical => "Critical",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which side of the system a test exercises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TestType {
    #[default]
    Frontend,
    Backend,
}

impl TestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestType::Frontend => "Frontend",
            TestType::Backend => "Backend",
        }
    }
}

impl fmt::Display for TestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestStep {
    pub step_number: u32,
    pub action: String,
    #[serde(default)]
    pub expected_result: String,
}

/// One test case record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub id: String,
    pub title: String,
    pub description: String,
    #[serde(default = "default_business_rule")]
    pub business_rule: String,
    #[serde(default)]
    pub preconditions: Vec<String>,
    #[serde(default)]
    pub steps: Vec<TestStep>,
    #[serde(default)]
    pub expected_outcome: String,
    #[serde(default)]
    pub postconditions: Vec<String>,
    #[serde(default)]
    pub tags: IndexSet<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub test_type: TestType,
    #[serde(default)]
    pub is_regression: bool,
    /// Set when the regression flag was given rather than inferred from priority.
    #[serde(skip)]
    regression_explicit: bool,
    #[serde(default)]
    pub boundary_conditions: Vec<String>,
    #[serde(default)]
    pub side_effects: Vec<String>,
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_document: Option<String>,
}

fn default_business_rule() -> String {
    DEFAULT_BUSINESS_RULE.to_string()
}

fn default_version() -> u32 {
    1
}

impl TestCase {
    /// Minimal constructor. Fills the derived id and default fields.
    ///
    /// A blank title is derived from the description; a blank description
    /// repeats the title.
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        let title = title.into();
        let description = description.into();
        let blank = (title.trim().is_empty(), description.trim().is_empty());
        let (title, description) = match blank {
            (false, false) => (title, description),
            (false, true) => (title.clone(), title),
            (true, false) => (normalize::title_fallback(description.trim(), &[]), description),
            (true, true) => (
                normalize::FALLBACK_TITLE.to_string(),
                DEFAULT_DESCRIPTION.to_string(),
            ),
        };
        let now = Utc::now();
        Self {
            id: derive_id(&title, &description),
            title,
            description,
            business_rule: default_business_rule(),
            preconditions: Vec::new(),
            steps: Vec::new(),
            expected_outcome: String::new(),
            postconditions: Vec::new(),
            tags: IndexSet::new(),
            priority: Priority::Medium,
            test_type: TestType::Frontend,
            is_regression: false,
            regression_explicit: false,
            boundary_conditions: Vec::new(),
            side_effects: Vec::new(),
            version: 1,
            created_at: now,
            updated_at: now,
            source_document: None,
        }
    }

    /// Append a step; numbering follows position and any ordinal prefix is dropped.
    pub fn with_step(mut self, action: &str, expected_result: &str) -> Self {
        self.steps.push(TestStep {
            step_number: self.steps.len() as u32 + 1,
            action: strip_step_prefix(action),
            expected_result: expected_result.trim().to_string(),
        });
        self
    }

    pub fn with_business_rule(mut self, rule: impl Into<String>) -> Self {
        self.business_rule = rule.into();
        self
    }

    /// Set the priority. The regression flag follows it unless set explicitly.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        let explicit = self.regression_explicit.then_some(self.is_regression);
        self.is_regression = infer_regression(priority, explicit);
        self
    }

    pub fn with_regression(mut self, is_regression: bool) -> Self {
        self.is_regression = is_regression;
        self.regression_explicit = true;
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Renumber steps contiguously from 1.
    pub fn renumber_steps(&mut self) {
        for (idx, step) in self.steps.iter_mut().enumerate() {
            step.step_number = idx as u32 + 1;
        }
    }

    /// Text fed to the embedding provider.
    ///
    /// Labelled lines in a fixed order so that identical content always yields
    /// identical text (and therefore a cache hit).
    pub fn canonical_text(&self) -> String {
        let mut parts = Vec::new();
        parts.push(format!("Title: {}", self.title));
        parts.push(format!("Description: {}", self.description));
        parts.push(format!("Business Rule: {}", self.business_rule));

        if !self.preconditions.is_empty() {
            parts.push(format!("Preconditions: {}", self.preconditions.join("; ")));
        }
        if !self.steps.is_empty() {
            let steps: Vec<String> = self
                .steps
                .iter()
                .map(|s| format!("Step {}: {} -> {}", s.step_number, s.action, s.expected_result))
                .collect();
            parts.push(format!("Steps:\n{}", steps.join("\n")));
        }
        if !self.expected_outcome.is_empty() {
            parts.push(format!("Expected Outcome: {}", self.expected_outcome));
        }
        if !self.postconditions.is_empty() {
            parts.push(format!("Postconditions: {}", self.postconditions.join("; ")));
        }
        if !self.boundary_conditions.is_empty() {
            parts.push(format!(
                "Boundary Conditions: {}",
                self.boundary_conditions.join("; ")
            ));
        }
        if !self.side_effects.is_empty() {
            parts.push(format!("Side Effects: {}", self.side_effects.join("; ")));
        }
        if !self.tags.is_empty() {
            let tags: Vec<&str> = self.tags.iter().map(String::as_str).collect();
            parts.push(format!("Tags: {}", tags.join(", ")));
        }

        parts.join("\n")
    }
}

/// Three-way reconciliation outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Decision {
    /// Candidate duplicates an existing test case.
    #[serde(rename = "same")]
    Same,
    /// Candidate extends an existing test case and is merged into it.
    #[serde(rename = "add-on")]
    AddOn,
    /// Candidate is unrelated and becomes a new record.
    #[serde(rename = "new")]
    New,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Same => "SAME",
            Decision::AddOn => "ADD-ON",
            Decision::New => "NEW",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of comparing one candidate against its best existing match.
///
/// Fields are private; a result is fixed once the comparison produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    candidate_id: String,
    existing_id: Option<String>,
    similarity: f32,
    embedding_similarity: f32,
    analysis_similarity: f32,
    decision: Decision,
    reasoning: String,
    business_rule_match: bool,
    behavior_match: bool,
    coverage_expansion: Vec<String>,
    confidence: f32,
    timestamp: DateTime<Utc>,
}

/// Field bundle for building a [`ComparisonResult`].
#[derive(Debug, Clone)]
pub struct ComparisonParts {
    pub candidate_id: String,
    pub existing_id: Option<String>,
    pub similarity: f32,
    pub embedding_similarity: f32,
    pub analysis_similarity: f32,
    pub decision: Decision,
    pub reasoning: String,
    pub business_rule_match: bool,
    pub behavior_match: bool,
    pub coverage_expansion: Vec<String>,
    pub confidence: f32,
}

impl ComparisonResult {
    pub fn from_parts(parts: ComparisonParts) -> Self {
        Self {
            candidate_id: parts.candidate_id,
            existing_id: parts.existing_id,
            similarity: parts.similarity.clamp(0.0, 1.0),
            embedding_similarity: parts.embedding_similarity.clamp(0.0, 1.0),
            analysis_similarity: parts.analysis_similarity.clamp(0.0, 1.0),
            decision: parts.decision,
            reasoning: parts.reasoning,
            business_rule_match: parts.business_rule_match,
            behavior_match: parts.behavior_match,
            coverage_expansion: parts.coverage_expansion,
            confidence: parts.confidence.clamp(0.0, 1.0),
            timestamp: Utc::now(),
        }
    }

    /// Nothing to compare against: NEW with no ambiguity.
    pub fn no_candidates(candidate_id: &str) -> Self {
        Self::from_parts(ComparisonParts {
            candidate_id: candidate_id.to_string(),
            existing_id: None,
            similarity: 0.0,
            embedding_similarity: 0.0,
            analysis_similarity: 0.0,
            decision: Decision::New,
            reasoning: "No similar test cases found in knowledge base. This is a new test case."
                .to_string(),
            business_rule_match: false,
            behavior_match: false,
            coverage_expansion: Vec::new(),
            confidence: 1.0,
        })
    }

    /// Best match scored below the add-on floor; the analyzer was not consulted.
    pub fn below_threshold(
        candidate_id: &str,
        best_id: &str,
        best_similarity: f32,
        addon_min: f32,
    ) -> Self {
        Self::from_parts(ComparisonParts {
            candidate_id: candidate_id.to_string(),
            existing_id: Some(best_id.to_string()),
            similarity: best_similarity,
            embedding_similarity: best_similarity,
            analysis_similarity: 0.0,
            decision: Decision::New,
            reasoning: format!(
                "Best match similarity ({:.1}%) is below the add-on threshold ({:.1}%). \
                 This is a new test case.",
                best_similarity * 100.0,
                addon_min * 100.0
            ),
            business_rule_match: false,
            behavior_match: false,
            coverage_expansion: Vec::new(),
            confidence: 0.9,
        })
    }

    pub fn candidate_id(&self) -> &str {
        &self.candidate_id
    }

    pub fn existing_id(&self) -> Option<&str> {
        self.existing_id.as_deref()
    }

    /// Fused score in `[0, 1]`.
    pub fn similarity(&self) -> f32 {
        self.similarity
    }

    pub fn embedding_similarity(&self) -> f32 {
        self.embedding_similarity
    }

    pub fn analysis_similarity(&self) -> f32 {
        self.analysis_similarity
    }

    pub fn decision(&self) -> Decision {
        self.decision
    }

    pub fn reasoning(&self) -> &str {
        &self.reasoning
    }

    pub fn business_rule_match(&self) -> bool {
        self.business_rule_match
    }

    pub fn behavior_match(&self) -> bool {
        self.behavior_match
    }

    pub fn coverage_expansion(&self) -> &[String] {
        &self.coverage_expansion
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}
