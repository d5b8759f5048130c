//! UI layer: plain terminal rendering for the CLI.

pub mod commands;
pub mod feed_rendering;
pub mod message_rendering;

/// Returns the UI module name for smoke checks.
pub fn module_name() -> &'static str {
    "ui"
}
