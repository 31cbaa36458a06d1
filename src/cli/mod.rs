//! Command-line interface: argument parsing and command dispatch.

pub mod args;
pub mod commands;

pub use args::{Cli, Commands};

use anyhow::Context;
use serde::Serialize;

use crate::config::{ConfigError, Settings};
use crate::embedding::EmbeddingError;
use crate::io::{Envelope, ErrorDetails, ResultCode};
use crate::knowledge::KnowledgeBaseError;
use crate::llm::LlmError;
use crate::logging;
use crate::orchestrator::OrchestratorError;
use crate::vector::VectorError;

/// Where command output goes: tables for people, envelopes for tools.
#[derive(Debug, Clone, Copy)]
pub struct Output {
    pub json: bool,
}

impl Output {
    /// Print an envelope and return its exit code.
    pub fn envelope<T: Serialize>(&self, envelope: &Envelope<T>) -> anyhow::Result<u8> {
        println!("{}", envelope.to_json()?);
        Ok(envelope.exit_code)
    }
}

/// Parse-independent entry point used by `main`.
pub fn run(cli: Cli) -> anyhow::Result<u8> {
    let output = Output { json: cli.json };

    // init must work before any settings file exists
    if let Commands::Init { force } = cli.command {
        return commands::init::run_init(force, output);
    }

    let settings = load_settings(cli.config.as_deref())?;
    logging::init_with_config(&settings.logging);
    tracing::debug!(target: "cli", "Data directory: {}", settings.storage.data_dir.display());

    match cli.command {
        Commands::Init { force } => commands::init::run_init(force, output),
        Commands::Config => commands::init::run_config(&settings, output),
        Commands::Import { file, suite } => commands::import::run(&settings, &file, &suite, output),
        Commands::Reconcile {
            file,
            suite,
            top_k,
            same_threshold,
            addon_min_threshold,
            apply,
            no_progress,
        } => commands::reconcile::run(
            &settings,
            commands::reconcile::ReconcileArgs {
                file,
                suite,
                top_k: top_k.map(|k| k as usize),
                same_threshold,
                addon_min_threshold,
                apply,
                progress: !no_progress && !output.json,
            },
            output,
        ),
        Commands::Suites => commands::suites::run(&settings, output),
        Commands::List {
            suite,
            priority,
            test_type,
            tag,
            regression,
        } => commands::list::run(
            &settings,
            &suite,
            crate::knowledge::TestCaseFilter {
                priorities: priority,
                test_types: test_type,
                tags: tag,
                is_regression: regression,
            },
            output,
        ),
        Commands::Reindex { suite } => commands::reindex::run(&settings, &suite, output),
        Commands::Check { suite } => commands::check::run(&settings, &suite, output),
        Commands::Delete { suite, id } => commands::delete::run(&settings, &suite, &id, output),
        Commands::Stats => commands::stats::run(&settings, output),
    }
}

fn load_settings(path: Option<&std::path::Path>) -> anyhow::Result<Settings> {
    let settings = match path {
        Some(path) => Settings::load_from(path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => Settings::load().context("loading settings")?,
    };
    settings.validate()?;
    Ok(settings)
}

/// Map an error chain to the envelope result code.
pub fn result_code(error: &anyhow::Error) -> ResultCode {
    for cause in error.chain() {
        if cause.is::<ConfigError>() {
            return ResultCode::ConfigError;
        }
        if let Some(e) = cause.downcast_ref::<KnowledgeBaseError>() {
            return match e {
                KnowledgeBaseError::SuiteNotFound(_) | KnowledgeBaseError::NotFound { .. } => {
                    ResultCode::NotFound
                }
                KnowledgeBaseError::InvalidImport(_) | KnowledgeBaseError::DuplicateId { .. } => {
                    ResultCode::InvalidInput
                }
                _ => ResultCode::StorageError,
            };
        }
        if cause.is::<VectorError>() {
            return ResultCode::StorageError;
        }
        if cause.is::<EmbeddingError>() || cause.is::<LlmError>() {
            return ResultCode::ServiceError;
        }
        if let Some(e) = cause.downcast_ref::<OrchestratorError>() {
            return match e {
                OrchestratorError::KnowledgeBase(KnowledgeBaseError::SuiteNotFound(_)) => {
                    ResultCode::NotFound
                }
                OrchestratorError::KnowledgeBase(_) | OrchestratorError::Vector(_) => {
                    ResultCode::StorageError
                }
                OrchestratorError::Embedding(_)
                | OrchestratorError::Generation(_)
                | OrchestratorError::ComparisonUnavailable => ResultCode::ServiceError,
                OrchestratorError::Comparison(_) => ResultCode::InvalidInput,
                OrchestratorError::Pool(_) => ResultCode::InternalError,
            };
        }
    }
    ResultCode::InternalError
}

/// Report a failed command; returns the exit code.
pub fn report_error(error: &anyhow::Error, json: bool) -> u8 {
    let code = result_code(error);
    if json {
        let envelope: Envelope<()> = Envelope::error(code, format!("{error:#}"))
            .with_error_details(ErrorDetails {
                suggestions: suggestions(code),
                context: None,
            });
        match envelope.to_json() {
            Ok(text) => println!("{text}"),
            Err(_) => eprintln!("Error: {error:#}"),
        }
    } else {
        eprintln!("Error: {error:#}");
        for hint in suggestions(code) {
            eprintln!("  hint: {hint}");
        }
    }
    code.exit_code()
}

fn suggestions(code: ResultCode) -> Vec<String> {
    match code {
        ResultCode::ConfigError => vec![
            "Run `casebase config` to see the effective settings".to_string(),
            "Environment overrides use the CB_ prefix, e.g. CB_DECISION__SAME_THRESHOLD"
                .to_string(),
        ],
        ResultCode::NotFound => vec!["Run `casebase suites` to list known suites".to_string()],
        ResultCode::ServiceError => vec![
            "Check the API key variable named by embedding.api_key_env / generation.api_key_env"
                .to_string(),
            "Set CB_EMBEDDING__PROVIDER=hashed to work offline".to_string(),
        ],
        ResultCode::StorageError => {
            vec!["Run `casebase check <suite>` and `casebase reindex <suite>`".to_string()]
        }
        _ => Vec::new(),
    }
}
