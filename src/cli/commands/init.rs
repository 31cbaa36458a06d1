//! Init and Config commands.

use crate::cli::Output;
use crate::config::{ConfigError, Settings};
use crate::io::{EntityType, Envelope, ResultCode};

/// Create `.casebase/settings.toml` in the current directory.
pub fn run_init(force: bool, output: Output) -> anyhow::Result<u8> {
    let cwd = std::env::current_dir()?;
    match Settings::init_config_file(&cwd, force) {
        Ok(path) => {
            if output.json {
                output.envelope(
                    &Envelope::success(path.display().to_string())
                        .with_entity_type(EntityType::Settings)
                        .with_message("Created configuration file"),
                )
            } else {
                println!("Created configuration file at: {}", path.display());
                println!("Edit this file to customize your settings.");
                Ok(0)
            }
        }
        Err(ConfigError::AlreadyExists(path)) => {
            let message = format!("Configuration file already exists at: {}", path.display());
            if output.json {
                output.envelope(
                    &Envelope::<()>::error(ResultCode::InvalidInput, message)
                        .with_hint("Use --force to overwrite"),
                )
            } else {
                eprintln!("{message}");
                eprintln!("Use --force to overwrite");
                Ok(ResultCode::InvalidInput.exit_code())
            }
        }
        Err(e) => Err(e.into()),
    }
}

/// Display the effective configuration.
pub fn run_config(settings: &Settings, output: Output) -> anyhow::Result<u8> {
    if output.json {
        return output.envelope(
            &Envelope::success(settings).with_entity_type(EntityType::Settings),
        );
    }
    println!("Current Configuration:");
    println!("{}", "=".repeat(50));
    println!("{}", toml::to_string_pretty(settings)?);
    Ok(0)
}
