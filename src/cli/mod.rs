//! CLI module for the pattern provisioner.
//!
//! This module provides the command-line interface of `patternctl`.

mod commands;
mod output;

pub use commands::{Cli, Commands, LogFormat, OutputFormat};
pub use output::OutputFormatter;
