//! List command - test cases of one suite, optionally filtered.

use crate::cli::Output;
use crate::config::Settings;
use crate::io::{EntityType, Envelope};
use crate::knowledge::{KnowledgeBase, KnowledgeBaseError, TestCaseFilter};
use crate::utils::truncate_chars;

pub fn run(
    settings: &Settings,
    suite: &str,
    filter: TestCaseFilter,
    output: Output,
) -> anyhow::Result<u8> {
    let kb = KnowledgeBase::open(&settings.storage.suites_dir())?;
    if !kb.has_suite(suite) {
        return Err(KnowledgeBaseError::SuiteNotFound(suite.to_string()).into());
    }
    let test_cases = kb.filter(suite, &filter);

    if output.json {
        let count = test_cases.len();
        return output.envelope(
            &Envelope::success(test_cases)
                .with_entity_type(EntityType::TestCase)
                .with_suite(suite)
                .with_count(count),
        );
    }

    if test_cases.is_empty() {
        let scope = if filter.is_empty() { "" } else { " matching the filter" };
        println!("No test cases{scope} in '{suite}'.");
        return Ok(0);
    }

    let mut table = super::table([
        "Id", "Title", "Priority", "Type", "Steps", "Regression", "Version", "Tags",
    ]);
    for tc in &test_cases {
        let tags: Vec<&str> = tc.tags.iter().map(String::as_str).collect();
        table.add_row(vec![
            tc.id.clone(),
            truncate_chars(&tc.title, 60).to_string(),
            tc.priority.to_string(),
            tc.test_type.to_string(),
            tc.steps.len().to_string(),
            if tc.is_regression { "yes" } else { "no" }.to_string(),
            tc.version.to_string(),
            tags.join(", "),
        ]);
    }
    println!("{table}");
    println!("{} test cases in '{suite}'", test_cases.len());
    Ok(0)
}
