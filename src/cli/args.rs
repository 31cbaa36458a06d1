//! CLI argument parsing using clap.

use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use std::path::PathBuf;

use crate::types::{Priority, TestType};

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Test case knowledge base with SAME / ADD-ON / NEW reconciliation
#[derive(Parser, Debug)]
#[command(
    name = "casebase",
    version = env!("CARGO_PKG_VERSION"),
    about = "Reconcile generated test cases against a knowledge base",
    long_about = "Store test case suites, and decide for each new candidate whether it \
                  duplicates (SAME), extends (ADD-ON) or is independent of (NEW) what is \
                  already there.",
    next_line_help = true,
    styles = clap_cargo_style(),
    after_help = "Quick Start:\n  \
        $ casebase init\n  \
        $ casebase import cases.json --suite Login\n  \
        $ casebase reconcile generated.json --suite Login\n  \
        $ casebase reconcile generated.json --suite Login --apply"
)]
pub struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true, env = "CASEBASE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Print a JSON envelope instead of tables
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write default settings to .casebase/settings.toml
    Init {
        /// Overwrite an existing settings file
        #[arg(short, long)]
        force: bool,
    },

    /// Display active settings after all layers are applied
    Config,

    /// Store test cases from a JSON file without comparing them
    #[command(
        after_help = "Accepted input: a JSON array of test cases, {\"test_cases\": [...]}, \
                      or a single object."
    )]
    Import {
        /// JSON file with test cases
        file: PathBuf,

        /// Target suite (created when missing)
        #[arg(short, long)]
        suite: String,
    },

    /// Decide SAME / ADD-ON / NEW for each candidate in a file
    #[command(
        after_help = "Examples:\n  \
            casebase reconcile generated.json --suite Login\n  \
            casebase reconcile generated.json --suite Login --same-threshold 0.9 --apply\n  \
            casebase --json reconcile generated.json --suite Login | jq '.data.summary'"
    )]
    Reconcile {
        /// JSON file with candidate test cases
        file: PathBuf,

        #[arg(short, long)]
        suite: String,

        /// Neighbors retrieved per candidate
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        top_k: Option<u64>,

        /// Override decision.same_threshold for this run
        #[arg(long)]
        same_threshold: Option<f32>,

        /// Override decision.addon_min_threshold for this run
        #[arg(long)]
        addon_min_threshold: Option<f32>,

        /// Write decisions to the knowledge base (merge ADD-ON, insert NEW)
        #[arg(long)]
        apply: bool,

        /// Hide the progress spinner
        #[arg(long)]
        no_progress: bool,
    },

    /// List suites with their sizes
    Suites,

    /// List test cases of a suite
    List {
        suite: String,

        /// Keep only these priorities (repeatable)
        #[arg(long, value_parser = parse_priority)]
        priority: Vec<Priority>,

        /// Keep only this test type (repeatable)
        #[arg(long, value_parser = parse_test_type)]
        test_type: Vec<TestType>,

        /// Keep test cases carrying any of these tags (repeatable)
        #[arg(long)]
        tag: Vec<String>,

        /// Keep only regression (true) or non-regression (false) test cases
        #[arg(long)]
        regression: Option<bool>,
    },

    /// Rebuild a suite's vector collection from the knowledge base
    Reindex { suite: String },

    /// Report ids present in only one of knowledge base and index
    Check { suite: String },

    /// Remove a test case from the knowledge base and the index
    Delete { suite: String, id: String },

    /// Suite sizes, index sizes and embedding cache counters
    Stats,
}

pub fn parse_priority(s: &str) -> Result<Priority, String> {
    match s.trim().to_lowercase().as_str() {
        "low" => Ok(Priority::Low),
        "medium" => Ok(Priority::Medium),
        "high" => Ok(Priority::High),
        "critical" => Ok(Priority::Critical),
        other => Err(format!("unknown priority '{other}' (low, medium, high, critical)")),
    }
}

pub fn parse_test_type(s: &str) -> Result<TestType, String> {
    match s.trim().to_lowercase().as_str() {
        "frontend" => Ok(TestType::Frontend),
        "backend" => Ok(TestType::Backend),
        other => Err(format!("unknown test type '{other}' (frontend, backend)")),
    }
}
