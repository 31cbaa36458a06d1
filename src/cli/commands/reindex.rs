//! Reindex command - rebuild a suite's vectors from its stored test cases.

use anyhow::Context;

use crate::cli::Output;
use crate::config::Settings;
use crate::io::{EntityType, Envelope};
use crate::orchestrator::Orchestrator;

pub fn run(settings: &Settings, suite: &str, output: Output) -> anyhow::Result<u8> {
    let orchestrator = Orchestrator::open(settings).context("opening knowledge base")?;

    let bar = super::spinner(format!("Reindexing '{suite}'"), !output.json);
    let count = orchestrator.reindex(suite);
    if let Some(bar) = bar {
        bar.finish_and_clear();
    }
    let count = count.with_context(|| format!("reindexing suite '{suite}'"))?;

    if output.json {
        return output.envelope(
            &Envelope::success(count)
                .with_entity_type(EntityType::Suite)
                .with_suite(suite)
                .with_count(count)
                .with_message(format!("Reindexed {count} test cases")),
        );
    }
    println!(
        "Reindexed {count} test cases in '{suite}' with '{}'",
        orchestrator.embeddings().backend_name()
    );
    Ok(0)
}
