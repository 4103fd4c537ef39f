//! Command-line interface definitions and helpers.
//!
//! This module contains all CLI argument parsing and subcommand handlers.

mod args;
mod commands;

pub use args::{Args, Command, ConfigAction, HistoryAction};
pub use commands::{
    handle_config_action, read_script, run_export, run_generate, run_history, run_play,
};
