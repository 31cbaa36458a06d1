//! Stats command - sizes of suites and collections.

use anyhow::Context;

use crate::cli::Output;
use crate::config::Settings;
use crate::io::{EntityType, Envelope};
use crate::orchestrator::Orchestrator;

pub fn run(settings: &Settings, output: Output) -> anyhow::Result<u8> {
    let orchestrator = Orchestrator::open(settings).context("opening knowledge base")?;
    let stats = orchestrator.stats()?;

    if output.json {
        let count = stats.suites.len();
        return output.envelope(
            &Envelope::success(&stats)
                .with_entity_type(EntityType::Stats)
                .with_count(count),
        );
    }

    println!(
        "Embedding backend: {} ({} dimensions)",
        stats.embedding_backend, stats.dimension
    );
    println!("Data directory: {}", settings.storage.data_dir.display());
    if stats.suites.is_empty() {
        println!("No suites yet.");
        return Ok(0);
    }

    let mut table = super::table(["Suite", "Test cases", "Vectors", "Version"]);
    for suite in &stats.suites {
        let vectors = if suite.vectors == suite.test_cases {
            suite.vectors.to_string()
        } else {
            format!("{} (out of sync)", suite.vectors)
        };
        table.add_row(vec![
            suite.name.clone(),
            suite.test_cases.to_string(),
            vectors,
            suite.version.to_string(),
        ]);
    }
    println!("{table}");
    Ok(0)
}
