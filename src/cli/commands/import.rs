//! Import command - store test cases without reconciliation.

use anyhow::Context;
use std::path::Path;

use crate::cli::Output;
use crate::config::Settings;
use crate::io::{EntityType, Envelope};
use crate::knowledge::load_test_cases;
use crate::orchestrator::Orchestrator;

pub fn run(settings: &Settings, file: &Path, suite: &str, output: Output) -> anyhow::Result<u8> {
    let test_cases = load_test_cases(file)?;
    let orchestrator = Orchestrator::open(settings).context("opening knowledge base")?;

    let bar = super::spinner(format!("Importing {} test cases", test_cases.len()), !output.json);
    let report = orchestrator.import(suite, test_cases)?;
    if let Some(bar) = bar {
        bar.finish_and_clear();
    }

    if output.json {
        let message = format!("Imported {} test cases", report.added.len());
        let envelope = if report.skipped.is_empty() {
            Envelope::success(&report).with_message(message)
        } else {
            Envelope::partial(&report, format!("{message}, skipped {}", report.skipped.len()))
        };
        return output.envelope(
            &envelope
                .with_entity_type(EntityType::ImportReport)
                .with_suite(suite)
                .with_count(report.added.len()),
        );
    }

    println!("Imported {} test cases into '{suite}'", report.added.len());
    if !report.skipped.is_empty() {
        let mut table = super::table(["#", "Title", "Reason"]);
        for skipped in &report.skipped {
            table.add_row(vec![
                skipped.index.to_string(),
                skipped.title.clone(),
                skipped.error.clone(),
            ]);
        }
        println!("Skipped {}:\n{table}", report.skipped.len());
    }
    Ok(0)
}
