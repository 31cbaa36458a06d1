//! Reconcile command - decide SAME / ADD-ON / NEW for a file of candidates.

use anyhow::Context;
use comfy_table::{Cell, Color};
use std::path::PathBuf;

use crate::cli::Output;
use crate::config::Settings;
use crate::io::{EntityType, Envelope};
use crate::knowledge::load_test_cases;
use crate::orchestrator::{BatchReport, Orchestrator, ReconcileRequest};
use crate::types::Decision;
use crate::utils::truncate_chars;

pub struct ReconcileArgs {
    pub file: PathBuf,
    pub suite: String,
    pub top_k: Option<usize>,
    pub same_threshold: Option<f32>,
    pub addon_min_threshold: Option<f32>,
    pub apply: bool,
    pub progress: bool,
}

pub fn run(settings: &Settings, args: ReconcileArgs, output: Output) -> anyhow::Result<u8> {
    let candidates = load_test_cases(&args.file)?;
    let orchestrator = Orchestrator::open(settings)
        .and_then(|o| o.with_generation(settings))
        .context("setting up reconciliation")?;

    let bar = super::spinner(
        format!("Reconciling {} candidates against '{}'", candidates.len(), args.suite),
        args.progress,
    );
    let report = orchestrator.reconcile(ReconcileRequest {
        suite: args.suite.clone(),
        candidates,
        top_k: args.top_k,
        same_threshold: args.same_threshold,
        addon_min_threshold: args.addon_min_threshold,
        apply: args.apply,
    });
    if let Some(bar) = bar {
        bar.finish_and_clear();
    }
    let report = report?;

    if output.json {
        let count = report.outcomes.len();
        let envelope = if report.failures.is_empty() {
            Envelope::success(&report).with_message(format!("Reconciled {count} candidates"))
        } else {
            Envelope::partial(
                &report,
                format!(
                    "Reconciled {count} candidates, {} failed",
                    report.failures.len()
                ),
            )
        };
        return output.envelope(
            &envelope
                .with_entity_type(EntityType::BatchReport)
                .with_suite(&args.suite)
                .with_count(count)
                .with_duration_ms(report.elapsed_ms as u64),
        );
    }

    print_report(&report);
    Ok(if report.failures.is_empty() { 0 } else { 3 })
}

fn decision_cell(decision: Decision) -> Cell {
    let color = match decision {
        Decision::Same => Color::Yellow,
        Decision::AddOn => Color::Cyan,
        Decision::New => Color::Green,
    };
    Cell::new(decision.as_str()).fg(color)
}

fn print_report(report: &BatchReport) {
    let mut table = super::table([
        "#",
        "Candidate",
        "Decision",
        "Match",
        "Similarity",
        "Confidence",
        "Recommendation",
    ]);
    for outcome in &report.outcomes {
        let result = &outcome.result;
        table.add_row(vec![
            Cell::new(outcome.index + 1),
            Cell::new(truncate_chars(&outcome.title, 60)),
            decision_cell(result.decision()),
            Cell::new(result.existing_id().unwrap_or("-")),
            Cell::new(super::percent(result.similarity())),
            Cell::new(super::percent(result.confidence())),
            Cell::new(&outcome.recommendation),
        ]);
    }
    println!("{table}");

    let s = &report.summary;
    println!(
        "\n{} candidates: {} SAME ({:.1}%), {} ADD-ON ({:.1}%), {} NEW ({:.1}%), {} failed",
        s.total, s.same, s.same_pct, s.add_on, s.add_on_pct, s.new, s.new_pct, s.failed
    );
    if report.applied {
        println!("Decisions applied to suite '{}'.", report.suite);
    } else {
        println!("Dry run: nothing written. Re-run with --apply to store decisions.");
    }

    for (outcome, anomaly) in report.anomalies() {
        eprintln!("warning: #{} '{}': {anomaly}", outcome.index + 1, outcome.title);
    }

    if !report.failures.is_empty() {
        let mut failures = super::table(["#", "Candidate", "Id", "Error"]);
        for f in &report.failures {
            failures.add_row(vec![
                (f.index + 1).to_string(),
                f.title.clone(),
                f.candidate_id.clone(),
                f.error.clone(),
            ]);
        }
        eprintln!("\nFailed candidates:\n{failures}");
    }
}
