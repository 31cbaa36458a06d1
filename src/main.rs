use clap::Parser;
use std::process::ExitCode;

use casebase::cli::{self, Cli};

fn main() -> ExitCode {
    let cli = Cli::parse();
    let json = cli.json;

    match cli::run(cli) {
        Ok(code) => ExitCode::from(code),
        Err(e) => ExitCode::from(cli::report_error(&e, json)),
    }
}
