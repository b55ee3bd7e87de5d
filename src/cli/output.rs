//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying
//! information to the user in various formats.

use colored::Colorize;
use serde::Deserialize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::config::{PatternFile, ValidationResult};
use crate::engine::ProvisionReport;
use crate::error::{KubeError, Result};

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Result row for table display.
#[derive(Tabled)]
struct ResultRow {
    #[tabled(rename = "Component")]
    component: String,
    #[tabled(rename = "Step")]
    step: String,
    #[tabled(rename = "Result")]
    result: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats a provisioning report for display.
    #[must_use]
    pub fn format_report(&self, report: &ProvisionReport) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(report).unwrap_or_default(),
            OutputFormat::Text => Self::format_report_text(report),
        }
    }

    /// Formats a report as text.
    fn format_report_text(report: &ProvisionReport) -> String {
        let mut output = String::new();

        let _ = write!(
            output,
            "\nPattern: {} ({})\n\n",
            report.pattern, report.pattern_id
        );

        let rows: Vec<ResultRow> = report
            .results
            .iter()
            .map(|(key, value)| {
                let (component, step) = key.rsplit_once('.').unwrap_or((key.as_str(), ""));
                ResultRow {
                    component: component.to_string(),
                    step: step.to_string(),
                    result: Self::colorize_result(value),
                }
            })
            .collect();

        if rows.is_empty() {
            output.push_str("   No components provisioned.\n");
        } else {
            output.push_str(&Table::new(rows).to_string());
            output.push('\n');
        }

        if !report.errors.is_empty() {
            let _ = write!(output, "\n{} Errors:\n", "!".yellow());
            for error in &report.errors {
                let _ = writeln!(output, "   - {error}");
            }
        }

        let status = if report.success {
            format!("{} {} succeeded", "✓".green(), report.operation)
        } else {
            format!("{} {} failed", "✗".red(), report.operation)
        };
        let _ = write!(output, "\n{status} in {}ms\n", report.duration_ms());

        output
    }

    /// Formats a validation result.
    #[must_use]
    pub fn format_validation(
        &self,
        pattern: &PatternFile,
        result: &ValidationResult,
        show_warnings: bool,
    ) -> String {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::json!({
                    "pattern": pattern.name,
                    "valid": result.is_valid(),
                    "components": pattern.components.len(),
                    "errors": result.errors.iter().map(ToString::to_string).collect::<Vec<_>>(),
                    "warnings": result.warnings,
                });
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => {
                let mut output = if result.is_valid() {
                    format!("{} Pattern '{}' is valid\n", "✓".green(), pattern.name)
                } else {
                    format!(
                        "{} Pattern '{}' has {} error(s)\n",
                        "✗".red(),
                        pattern.name,
                        result.error_count()
                    )
                };

                for error in &result.errors {
                    let _ = writeln!(output, "   - {error}");
                }

                if show_warnings && !result.warnings.is_empty() {
                    let _ = write!(output, "\n{} Warnings:\n", "!".yellow());
                    for warning in &result.warnings {
                        let _ = writeln!(output, "   - {warning}");
                    }
                }

                let _ = write!(
                    output,
                    "\n   Components: {} ({} deployable)\n",
                    pattern.components.len(),
                    pattern.deployable().count()
                );
                output
            }
        }
    }

    /// Formats a rendered manifest.
    ///
    /// # Errors
    ///
    /// Returns a marshal error if a document cannot be converted to JSON.
    pub fn format_manifest(&self, manifest: &str) -> Result<String> {
        match self.format {
            OutputFormat::Json => {
                let documents = serde_yaml::Deserializer::from_str(manifest)
                    .map(serde_json::Value::deserialize)
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(|e| KubeError::marshal("rendered manifest", e.to_string()))?;
                let json = serde_json::to_string_pretty(&documents)
                    .map_err(|e| KubeError::marshal("rendered manifest", e.to_string()))?;
                Ok(json)
            }
            OutputFormat::Text => Ok(manifest.to_string()),
        }
    }

    /// Formats an error message.
    #[must_use]
    pub fn format_error(&self, message: &str) -> String {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::json!({ "status": "error", "message": message });
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => format!("{} {message}", "✗".red()),
        }
    }

    /// Colors a result store value by its outcome.
    fn colorize_result(value: &str) -> String {
        if value.starts_with("rejected") {
            value.red().to_string()
        } else if value.starts_with("deleted") {
            value.yellow().to_string()
        } else {
            value.green().to_string()
        }
    }
}
