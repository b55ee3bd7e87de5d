//! patternctl CLI entrypoint.
//!
//! This is the main entrypoint for the patternctl command-line tool.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use pattern_provisioner::cli::{Cli, Commands, LogFormat, OutputFormatter};
use pattern_provisioner::config::{
    find_config_file, ConfigParser, ConfigValidator, PatternFile, PatternValidator,
    ProvisionerConfig,
};
use pattern_provisioner::engine::{render, Operation, Provisioner};
use pattern_provisioner::error::{ProvisionError, Result, StageError};

use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose, cli.log_format);

    // Run async runtime
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    let formatter = OutputFormatter::new(cli.output);
    match runtime.block_on(run(cli, &formatter)) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("{}", formatter.format_error(&e.to_string()));
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
///
/// `RUST_LOG` takes precedence over the verbosity flag.
fn init_logging(verbose: bool, format: LogFormat) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

/// Main async entry point. Returns whether the command fully succeeded.
async fn run(cli: Cli, formatter: &OutputFormatter) -> Result<bool> {
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Validate { pattern, warnings } => {
            cmd_validate(config_path, &pattern, warnings, formatter)
        }
        Commands::Render { pattern } => cmd_render(&pattern, formatter),
        Commands::DryRun { pattern } => {
            cmd_provision(config_path, &pattern, Operation::DryRun, false, formatter).await
        }
        Commands::Apply {
            pattern,
            dry_run_first,
        } => cmd_provision(config_path, &pattern, Operation::Apply, dry_run_first, formatter).await,
        Commands::Delete { pattern } => {
            cmd_provision(config_path, &pattern, Operation::Delete, false, formatter).await
        }
    }
}

/// Validate a pattern and the provisioner configuration.
fn cmd_validate(
    config_path: Option<&Path>,
    pattern_path: &Path,
    show_warnings: bool,
    formatter: &OutputFormatter,
) -> Result<bool> {
    let config = load_config(config_path)?;
    let config_result = ConfigValidator::new().validate(&config)?;
    for warning in &config_result.warnings {
        debug!("config: {warning}");
    }

    let pattern = load_pattern(pattern_path)?;
    info!("Validating pattern: {}", pattern_path.display());

    let result = PatternValidator::new().check(&pattern);
    emit(&formatter.format_validation(&pattern, &result, show_warnings))?;

    Ok(result.is_valid())
}

/// Render the resources of a pattern.
fn cmd_render(pattern_path: &Path, formatter: &OutputFormatter) -> Result<bool> {
    let pattern = load_pattern(pattern_path)?;
    let manifest = render(&pattern)?;
    emit(&formatter.format_manifest(&manifest)?)?;
    Ok(true)
}

/// Run a provisioning operation.
async fn cmd_provision(
    config_path: Option<&Path>,
    pattern_path: &Path,
    operation: Operation,
    dry_run_first: bool,
    formatter: &OutputFormatter,
) -> Result<bool> {
    let mut config = load_config(config_path)?;
    ConfigValidator::new().validate(&config)?;
    if dry_run_first {
        config.provision.dry_run_before_apply = true;
    }

    let pattern = load_pattern(pattern_path)?;
    let provisioner = Provisioner::from_config(config)?;

    match provisioner.run(pattern, operation).await {
        Ok(report) => {
            emit(&formatter.format_report(&report))?;
            Ok(report.success)
        }
        Err(ProvisionError::Stage(StageError::InvalidPattern { message })) => {
            emit(&formatter.format_error(&format!("pattern is invalid:\n{message}")))?;
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

/// Loads the provisioner configuration, falling back to defaults.
fn load_config(config_path: Option<&Path>) -> Result<ProvisionerConfig> {
    let resolved: Option<PathBuf> = match config_path {
        Some(path) => Some(path.to_path_buf()),
        None => std::env::current_dir().ok().and_then(find_config_file),
    };

    let base = resolved
        .as_deref()
        .and_then(Path::parent)
        .unwrap_or_else(|| Path::new("."));
    let parser = ConfigParser::new().with_base_path(base);
    parser.load_dotenv()?;

    match &resolved {
        Some(path) => info!("Using configuration: {}", path.display()),
        None => debug!("No configuration file found, using defaults"),
    }
    parser.load_with_env(resolved.as_deref())
}

/// Loads a pattern file.
fn load_pattern(path: &Path) -> Result<PatternFile> {
    ConfigParser::new().load_pattern(path)
}

/// Writes command output to stdout.
fn emit(output: &str) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{output}")?;
    Ok(())
}
