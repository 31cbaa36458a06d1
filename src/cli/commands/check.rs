//! Check command - compare knowledge base ids with the vector collection.

use anyhow::Context;

use crate::cli::Output;
use crate::config::Settings;
use crate::io::{EntityType, Envelope, ResultCode};
use crate::orchestrator::Orchestrator;

pub fn run(settings: &Settings, suite: &str, output: Output) -> anyhow::Result<u8> {
    let orchestrator = Orchestrator::open(settings).context("opening knowledge base")?;
    let report = orchestrator.check_consistency(suite)?;
    let code = if report.is_consistent() {
        0
    } else {
        ResultCode::StorageError.exit_code()
    };

    if output.json {
        let envelope = Envelope::success(&report)
            .with_entity_type(EntityType::ConsistencyReport)
            .with_suite(suite);
        let envelope = if report.is_consistent() {
            envelope.with_message("Knowledge base and index agree")
        } else {
            envelope
                .with_message("Knowledge base and index disagree")
                .with_hint(format!("Run `casebase reindex {suite}`"))
        };
        output.envelope(&envelope)?;
        return Ok(code);
    }

    println!(
        "'{suite}': {} test cases, {} vectors",
        report.knowledge_base_count, report.index_count
    );
    if report.is_consistent() {
        println!("Knowledge base and index agree.");
        return Ok(code);
    }

    let mut table = super::table(["Id", "Problem"]);
    for id in &report.missing_from_index {
        table.add_row(vec![id.as_str(), "no vector"]);
    }
    for id in &report.missing_from_knowledge_base {
        table.add_row(vec![id.as_str(), "orphaned vector"]);
    }
    println!("{table}");
    println!("Run `casebase reindex {suite}` to rebuild the index.");
    Ok(code)
}
