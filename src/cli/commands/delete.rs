//! Delete command - remove one test case and its vector.

use anyhow::Context;

use crate::cli::Output;
use crate::config::Settings;
use crate::io::{EntityType, Envelope, ResultCode};
use crate::orchestrator::Orchestrator;

pub fn run(settings: &Settings, suite: &str, id: &str, output: Output) -> anyhow::Result<u8> {
    let orchestrator = Orchestrator::open(settings).context("opening knowledge base")?;
    let found = orchestrator
        .delete(suite, id)
        .with_context(|| format!("deleting '{id}' from suite '{suite}'"))?;

    if output.json {
        let envelope = if found {
            Envelope::success(serde_json::json!({ "id": id }))
                .with_entity_type(EntityType::TestCase)
                .with_message(format!("Deleted '{id}'"))
        } else {
            Envelope::not_found(format!("No test case '{id}' in suite '{suite}'"))
        };
        return output.envelope(&envelope.with_suite(suite));
    }

    if found {
        println!("Deleted '{id}' from '{suite}'.");
        Ok(0)
    } else {
        println!("No test case '{id}' in '{suite}'.");
        Ok(ResultCode::NotFound.exit_code())
    }
}
