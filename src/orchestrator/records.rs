//! Mapping between knowledge base records and vector index entries.

use chrono::{DateTime, Utc};
use indexmap::IndexSet;

use crate::types::{DEFAULT_BUSINESS_RULE, Priority, TestCase, TestType};
use crate::vector::{Metadata, MetadataValue, QueryHit, VectorRecord};

/// Flat metadata stored next to each embedding.
pub fn vector_metadata(tc: &TestCase) -> Metadata {
    let mut meta = Metadata::new();
    meta.insert("title".into(), tc.title.as_str().into());
    meta.insert("description".into(), tc.description.as_str().into());
    meta.insert("business_rule".into(), tc.business_rule.as_str().into());
    meta.insert("priority".into(), tc.priority.as_str().into());
    meta.insert("test_type".into(), tc.test_type.as_str().into());
    meta.insert("is_regression".into(), tc.is_regression.to_string().into());
    meta.insert("version".into(), tc.version.into());
    meta.insert("step_count".into(), (tc.steps.len() as u32).into());
    meta.insert("created_at".into(), tc.created_at.to_rfc3339().into());
    if !tc.tags.is_empty() {
        let tags: Vec<&str> = tc.tags.iter().map(String::as_str).collect();
        meta.insert("tags".into(), tags.join(",").into());
    }
    meta
}

pub fn vector_record(tc: &TestCase, embedding: Vec<f32>) -> VectorRecord {
    VectorRecord {
        id: tc.id.clone(),
        embedding,
        document: tc.canonical_text(),
        metadata: vector_metadata(tc),
    }
}

/// Best-effort test case from an index hit whose knowledge base record is gone.
///
/// Steps are not recoverable from metadata; the stored document keeps the
/// full text, so it stands in for the description when none was stored.
pub fn reconstruct(hit: &QueryHit) -> TestCase {
    let text = |key: &str| hit.metadata.get(key).and_then(MetadataValue::as_str);

    let mut tc = TestCase::new(
        text("title").unwrap_or(hit.id.as_str()),
        text("description")
            .filter(|d| !d.trim().is_empty())
            .unwrap_or(hit.document.as_str()),
    )
    .with_id(hit.id.as_str());

    tc.business_rule = text("business_rule")
        .unwrap_or(DEFAULT_BUSINESS_RULE)
        .to_string();
    if let Some(priority) = text("priority") {
        tc.priority = Priority::parse_loose(priority);
    }
    if text("test_type").is_some_and(|t| t.eq_ignore_ascii_case("backend")) {
        tc.test_type = TestType::Backend;
    }
    tc.is_regression = text("is_regression") == Some("true");
    if let Some(version) = hit.metadata.get("version").and_then(MetadataValue::as_f64) {
        tc.version = (version.max(1.0)) as u32;
    }
    if let Some(created) = text("created_at").and_then(|s| DateTime::parse_from_rfc3339(s).ok()) {
        tc.created_at = created.with_timezone(&Utc);
    }
    if let Some(tags) = text("tags") {
        tc.tags = tags
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect::<IndexSet<_>>();
    }
    tc
}
