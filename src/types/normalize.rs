//! Normalization of loosely-typed test case input.
//!
//! Generated or hand-edited JSON rarely matches [`TestCase`] exactly: steps
//! arrive as strings, list fields as single strings, priorities in any case.
//! [`RawTestCase`] accepts all of that and [`RawTestCase::into_test_case`]
//! produces a record that satisfies the model invariants.

use chrono::Utc;
use indexmap::IndexSet;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::sync::OnceLock;

use super::{DEFAULT_BUSINESS_RULE, DEFAULT_DESCRIPTION, Priority, TestCase, TestStep, TestType};
use crate::utils::{content_hash, truncate_chars};

const TITLE_FROM_DESCRIPTION_CHARS: usize = 80;
const TITLE_FROM_STEP_CHARS: usize = 70;
pub(super) const FALLBACK_TITLE: &str = "Test functional requirement";

/// Upper bound on repeated prefix stripping ("1. 1. 1. Open page").
const MAX_PREFIX_PASSES: usize = 5;

static STEP_PREFIX: OnceLock<Option<Regex>> = OnceLock::new();

fn step_prefix() -> Option<&'static Regex> {
    STEP_PREFIX
        .get_or_init(|| {
            Regex::new(r"(?i)^\s*(?:\d+[.):\-]\s*|\d+\s+-\s*|\bstep\s+\d+[.):\-]?\s*)").ok()
        })
        .as_ref()
}

/// Remove leading ordinal prefixes from a step action.
///
/// Handles `1.`, `2)`, `3:`, `4 -`, `Step 5:` and stacked repetitions.
pub fn strip_step_prefix(action: &str) -> String {
    let mut text = action.trim().to_string();
    let Some(re) = step_prefix() else {
        return text;
    };

    for _ in 0..MAX_PREFIX_PASSES {
        let stripped = re.replace(&text, "").trim().to_string();
        if stripped == text {
            break;
        }
        text = stripped;
    }
    text
}

/// Regression policy: an explicit flag wins, otherwise High and Critical
/// priorities are regression tests.
pub fn infer_regression(priority: Priority, explicit: Option<bool>) -> bool {
    explicit.unwrap_or(matches!(priority, Priority::High | Priority::Critical))
}

/// Content-derived id: first 12 hex chars of the hash of title + description.
pub fn derive_id(title: &str, description: &str) -> String {
    let mut hash = content_hash(&format!("{title}{description}"));
    hash.truncate(12);
    hash
}

/// Map any test-type spelling onto `Frontend` / `Backend`.
pub fn parse_test_type(s: &str) -> TestType {
    const BACKEND: &[&str] = &[
        "backend", "back-end", "back end", "api", "server", "database", "service",
        "integration", "security",
    ];
    const FRONTEND: &[&str] = &[
        "frontend", "front-end", "front end", "ui", "ux", "user interface", "client", "web",
        "mobile",
    ];

    let lower = s.trim().to_lowercase();
    if lower.is_empty() {
        return TestType::Frontend;
    }
    if BACKEND.iter().any(|k| lower.contains(k)) {
        return TestType::Backend;
    }
    if FRONTEND.iter().any(|k| lower.contains(k)) {
        return TestType::Frontend;
    }
    TestType::Frontend
}

/// Loosely-typed test case as found in files and model output.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawTestCase {
    pub id: Option<Value>,
    pub title: Option<Value>,
    pub description: Option<Value>,
    pub business_rule: Option<Value>,
    pub preconditions: Option<Value>,
    #[serde(alias = "test_steps", alias = "testSteps")]
    pub steps: Option<Value>,
    #[serde(alias = "expectedOutcome")]
    pub expected_outcome: Option<Value>,
    pub postconditions: Option<Value>,
    pub tags: Option<Value>,
    pub priority: Option<Value>,
    #[serde(alias = "testType")]
    pub test_type: Option<Value>,
    #[serde(alias = "isRegression")]
    pub is_regression: Option<Value>,
    pub boundary_conditions: Option<Value>,
    pub side_effects: Option<Value>,
    pub version: Option<Value>,
    pub created_at: Option<Value>,
    pub updated_at: Option<Value>,
    pub source_document: Option<Value>,
}

impl RawTestCase {
    pub fn into_test_case(self) -> TestCase {
        let steps = parse_steps(self.steps.as_ref());

        let mut title = text_of(self.title.as_ref());
        let mut description = text_of(self.description.as_ref());

        if title.is_empty() {
            title = title_fallback(&description, &steps);
        }
        if description.is_empty() {
            description = if title.is_empty() {
                DEFAULT_DESCRIPTION.to_string()
            } else {
                title.clone()
            };
        }

        let id = match text_of(self.id.as_ref()) {
            id if id.is_empty() => derive_id(&title, &description),
            id => id,
        };

        let priority = Priority::parse_loose(&text_of(self.priority.as_ref()));
        let explicit_regression = bool_of(self.is_regression.as_ref());
        let is_regression = infer_regression(priority, explicit_regression);

        let business_rule = match text_of(self.business_rule.as_ref()) {
            rule if rule.is_empty() => DEFAULT_BUSINESS_RULE.to_string(),
            rule => rule,
        };

        let version = self
            .version
            .as_ref()
            .and_then(Value::as_u64)
            .map(|v| v.clamp(1, u32::MAX as u64) as u32)
            .unwrap_or(1);

        let now = Utc::now();
        let created_at = timestamp_of(self.created_at.as_ref()).unwrap_or(now);
        let updated_at = timestamp_of(self.updated_at.as_ref()).unwrap_or(created_at);

        let source_document = match text_of(self.source_document.as_ref()) {
            s if s.is_empty() => None,
            s => Some(s),
        };

        TestCase {
            id,
            title,
            description,
            business_rule,
            preconditions: list_of(self.preconditions.as_ref()),
            steps,
            expected_outcome: text_of(self.expected_outcome.as_ref()),
            postconditions: list_of(self.postconditions.as_ref()),
            tags: list_of(self.tags.as_ref()).into_iter().collect::<IndexSet<_>>(),
            priority,
            test_type: parse_test_type(&text_of(self.test_type.as_ref())),
            is_regression,
            regression_explicit: explicit_regression.is_some(),
            boundary_conditions: list_of(self.boundary_conditions.as_ref()),
            side_effects: list_of(self.side_effects.as_ref()),
            version,
            created_at,
            updated_at,
            source_document,
        }
    }
}

/// Parse one JSON value into a normalized [`TestCase`].
///
/// Returns `None` when the value is not an object.
pub fn parse_test_case(value: &Value) -> Option<TestCase> {
    if !value.is_object() {
        return None;
    }
    serde_json::from_value::<RawTestCase>(value.clone())
        .ok()
        .map(RawTestCase::into_test_case)
}

fn text_of(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

fn bool_of(value: Option<&Value>) -> Option<bool> {
    match value {
        Some(Value::Bool(b)) => Some(*b),
        Some(Value::String(s)) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "y" | "1" => Some(true),
            "false" | "no" | "n" | "0" => Some(false),
            _ => None,
        },
        Some(Value::Number(n)) => n.as_i64().map(|n| n != 0),
        _ => None,
    }
}

fn list_of(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => s.trim().to_string(),
                other => other.to_string(),
            })
            .filter(|s| !s.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

fn timestamp_of(value: Option<&Value>) -> Option<chrono::DateTime<Utc>> {
    let s = value?.as_str()?;
    chrono::DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn parse_steps(value: Option<&Value>) -> Vec<TestStep> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };

    let mut steps = Vec::with_capacity(items.len());
    for item in items {
        let (action, expected) = match item {
            Value::String(s) => (s.as_str().to_string(), String::new()),
            Value::Object(map) => {
                let action = ["action", "step", "description"]
                    .iter()
                    .find_map(|k| map.get(*k).and_then(Value::as_str))
                    .unwrap_or_default()
                    .to_string();
                let expected = ["expected_result", "expectedResult", "expected"]
                    .iter()
                    .find_map(|k| map.get(*k).and_then(Value::as_str))
                    .unwrap_or_default()
                    .trim()
                    .to_string();
                (action, expected)
            }
            _ => continue,
        };

        let action = strip_step_prefix(&action);
        if action.is_empty() && expected.is_empty() {
            continue;
        }
        steps.push(TestStep {
            step_number: steps.len() as u32 + 1,
            action,
            expected_result: expected,
        });
    }
    steps
}

pub(super) fn title_fallback(description: &str, steps: &[TestStep]) -> String {
    if !description.is_empty() {
        return shorten(description, TITLE_FROM_DESCRIPTION_CHARS);
    }
    match steps.first() {
        Some(step) if !step.action.is_empty() => {
            shorten(&format!("Verify {}", step.action), TITLE_FROM_STEP_CHARS + 7)
        }
        _ => FALLBACK_TITLE.to_string(),
    }
}

/// Cut at a word boundary and mark the cut with "...".
fn shorten(text: &str, max_chars: usize) -> String {
    let cut = truncate_chars(text, max_chars);
    if cut.len() == text.len() {
        return text.trim().to_string();
    }
    let head = cut.trim();
    match head.rsplit_once(' ') {
        Some((prefix, _)) if !prefix.is_empty() => format!("{prefix}..."),
        _ => format!("{head}..."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_strip_step_prefix_variants() {
        assert_eq!(strip_step_prefix("1. Open page"), "Open page");
        assert_eq!(strip_step_prefix("2) Click"), "Click");
        assert_eq!(strip_step_prefix("3: Type"), "Type");
        assert_eq!(strip_step_prefix("4 - Submit"), "Submit");
        assert_eq!(strip_step_prefix("Step 5: Verify"), "Verify");
        assert_eq!(strip_step_prefix("step 6 Check"), "Check");
        assert_eq!(strip_step_prefix("1. 1. Open page"), "Open page");
        assert_eq!(strip_step_prefix("Open 2 tabs"), "Open 2 tabs");
    }

    #[test]
    fn test_infer_regression_precedence() {
        assert!(infer_regression(Priority::High, None));
        assert!(infer_regression(Priority::Critical, None));
        assert!(!infer_regression(Priority::Medium, None));
        assert!(!infer_regression(Priority::Critical, Some(false)));
        assert!(infer_regression(Priority::Low, Some(true)));
    }

    #[test]
    fn test_parse_test_type_keywords() {
        assert_eq!(parse_test_type("REST API"), TestType::Backend);
        assert_eq!(parse_test_type("database"), TestType::Backend);
        assert_eq!(parse_test_type("UI"), TestType::Frontend);
        assert_eq!(parse_test_type(""), TestType::Frontend);
        assert_eq!(parse_test_type("performance"), TestType::Frontend);
    }

    #[test]
    fn test_parse_loose_record() {
        let value = json!({
            "title": "Login",
            "test_steps": [
                "1. Open page",
                {"action": "Step 2: Submit", "expected_result": "Logged in"}
            ],
            "preconditions": "User exists",
            "tags": ["auth", "auth", "smoke"],
            "priority": "critical",
            "test_type": "api"
        });
        let tc = parse_test_case(&value).unwrap();
        assert_eq!(tc.description, "Login");
        assert_eq!(tc.steps.len(), 2);
        assert_eq!(tc.steps[1].step_number, 2);
        assert_eq!(tc.steps[1].action, "Submit");
        assert_eq!(tc.preconditions, vec!["User exists".to_string()]);
        assert_eq!(tc.tags.len(), 2);
        assert_eq!(tc.priority, Priority::Critical);
        assert!(tc.is_regression);
        assert_eq!(tc.test_type, TestType::Backend);
        assert_eq!(tc.id, derive_id("Login", "Login"));
    }

    #[test]
    fn test_title_fallbacks() {
        let long = "word ".repeat(40);
        let tc = parse_test_case(&json!({ "description": long })).unwrap();
        assert!(tc.title.ends_with("..."));
        assert!(tc.title.chars().count() <= 83);

        let tc = parse_test_case(&json!({ "steps": ["Open the login page"] })).unwrap();
        assert_eq!(tc.title, "Verify Open the login page");
        assert_eq!(tc.description, tc.title);

        let tc = parse_test_case(&json!({})).unwrap();
        assert_eq!(tc.title, FALLBACK_TITLE);
        assert!(!tc.description.trim().is_empty());
    }

    #[test]
    fn test_explicit_regression_string_wins() {
        let tc = parse_test_case(&json!({"title": "x", "priority": "High", "is_regression": "no"}))
            .unwrap();
        assert!(!tc.is_regression);
    }

    #[test]
    fn test_non_object_is_rejected() {
        assert!(parse_test_case(&json!("just text")).is_none());
        assert!(parse_test_case(&json!([1, 2])).is_none());
    }
}
