//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// patternctl - Provision design patterns on a Kubernetes cluster.
#[derive(Parser, Debug)]
#[command(name = "patternctl")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the provisioner configuration file.
    #[arg(short, long, global = true, env = "PATTERNCTL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Log format (text, json).
    #[arg(long, global = true, default_value = "text", env = "PATTERNCTL_LOG_FORMAT")]
    pub log_format: LogFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate a pattern file and the provisioner configuration.
    Validate {
        /// Pattern file (YAML or JSON).
        pattern: PathBuf,

        /// Show all warnings, not just errors.
        #[arg(short, long)]
        warnings: bool,
    },

    /// Print the resources a pattern would create.
    Render {
        /// Pattern file (YAML or JSON).
        pattern: PathBuf,
    },

    /// Ask the API server whether every component would be accepted.
    DryRun {
        /// Pattern file (YAML or JSON).
        pattern: PathBuf,
    },

    /// Apply every component of a pattern.
    Apply {
        /// Pattern file (YAML or JSON).
        pattern: PathBuf,

        /// Dry-run every component before applying.
        #[arg(long)]
        dry_run_first: bool,
    },

    /// Delete every component of a pattern.
    Delete {
        /// Pattern file (YAML or JSON).
        pattern: PathBuf,
    },
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

/// Log format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Human-readable log lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}
