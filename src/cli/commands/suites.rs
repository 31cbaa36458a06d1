//! Suites command - overview of every suite.

use crate::cli::Output;
use crate::config::Settings;
use crate::io::{EntityType, Envelope};
use crate::knowledge::KnowledgeBase;

pub fn run(settings: &Settings, output: Output) -> anyhow::Result<u8> {
    let kb = KnowledgeBase::open(&settings.storage.suites_dir())?;
    let suites = kb.list_suites();

    if output.json {
        let count = suites.len();
        let envelope = if suites.is_empty() {
            Envelope::not_found("No suites in the knowledge base")
                .with_hint("Run `casebase import <file> --suite <name>`")
        } else {
            Envelope::success(suites).with_message(format!("{count} suites"))
        };
        return output.envelope(&envelope.with_entity_type(EntityType::Suite).with_count(count));
    }

    if suites.is_empty() {
        println!("No suites yet. Run `casebase import <file> --suite <name>` to create one.");
        return Ok(0);
    }

    let mut table = super::table(["Suite", "Test cases", "Version", "Updated", "Description"]);
    for info in &suites {
        table.add_row(vec![
            info.name.clone(),
            info.test_cases.to_string(),
            info.version.to_string(),
            info.updated_at.format("%Y-%m-%d %H:%M").to_string(),
            info.description.clone(),
        ]);
    }
    println!("{table}");
    Ok(0)
}
