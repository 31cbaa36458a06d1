//! Command implementations for the CLI.
//!
//! Each command lives in its own module and returns the process exit code.

pub mod check;
pub mod delete;
pub mod import;
pub mod init;
pub mod list;
pub mod reconcile;
pub mod reindex;
pub mod stats;
pub mod suites;

use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Table with the look shared by every command.
pub(crate) fn table<I, S>(headers: I) -> Table
where
    I: IntoIterator<Item = S>,
    S: Into<comfy_table::Cell>,
{
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(headers);
    table
}

/// Spinner on stderr while a long step runs. `None` when disabled.
pub(crate) fn spinner(message: impl Into<String>, enabled: bool) -> Option<ProgressBar> {
    if !enabled {
        return None;
    }
    let bar = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg} [{elapsed}]") {
        bar.set_style(style);
    }
    bar.set_message(message.into());
    bar.enable_steady_tick(Duration::from_millis(120));
    Some(bar)
}

pub(crate) fn percent(value: f32) -> String {
    format!("{:.1}%", value * 100.0)
}
