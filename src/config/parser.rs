//! Configuration parser for loading configuration and pattern files.
//!
//! This module handles loading the provisioner configuration from YAML files
//! and environment variables, and loading pattern files to provision.

use crate::error::{ConfigError, ProvisionError, Result};
use std::path::Path;
use tracing::{debug, info};

use super::pattern::PatternFile;
use super::spec::ProvisionerConfig;

/// Configuration parser for loading provisioner configuration.
#[derive(Debug, Default)]
pub struct ConfigParser {
    /// Base path for resolving the `.env` file.
    base_path: Option<std::path::PathBuf>,
}

impl ConfigParser {
    /// Creates a new configuration parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the base path for resolving relative paths.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<ProvisionerConfig> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        let content = read_file(path)?;
        self.parse_yaml(&content, Some(path))
    }

    /// Parses configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<ProvisionerConfig> {
        debug!("Parsing YAML configuration");

        serde_yaml::from_str(content).map_err(|e| {
            ProvisionError::Config(ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
                location: source.map(|p| p.display().to_string()),
            })
        })
    }

    /// Loads configuration with environment variable overrides.
    ///
    /// Without a path the defaults are used as the base. Environment
    /// variables are read in the form `PATTERNCTL_<SECTION>_<KEY>`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_with_env(&self, path: Option<&Path>) -> Result<ProvisionerConfig> {
        let mut config = match path {
            Some(path) => self.load_file(path)?,
            None => {
                debug!("No configuration file, using defaults");
                ProvisionerConfig::default()
            }
        };

        Self::apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;

        Ok(config)
    }

    /// Applies `PATTERNCTL_*` overrides read through `var`.
    fn apply_env_overrides(
        config: &mut ProvisionerConfig,
        var: impl Fn(&str) -> Option<String>,
    ) -> Result<()> {
        if let Some(server) = var("PATTERNCTL_CLUSTER_API_SERVER") {
            debug!("Overriding cluster.api_server from environment");
            config.cluster.api_server = server;
        }

        if let Some(token) = var("PATTERNCTL_CLUSTER_TOKEN") {
            debug!("Overriding cluster.token from environment");
            config.cluster.token = Some(token);
        }

        if let Some(timeout) = var("PATTERNCTL_CLUSTER_TIMEOUT_SECS") {
            debug!("Overriding cluster.timeout_secs from environment");
            config.cluster.timeout_secs = parse_env("PATTERNCTL_CLUSTER_TIMEOUT_SECS", &timeout)?;
        }

        if let Some(prefix) = var("PATTERNCTL_PROVISION_ANNOTATION_PREFIX") {
            debug!("Overriding provision.annotation_prefix from environment");
            config.provision.annotation_prefix = prefix;
        }

        if let Some(manager) = var("PATTERNCTL_PROVISION_FIELD_MANAGER") {
            debug!("Overriding provision.field_manager from environment");
            config.provision.field_manager = manager;
        }

        if let Some(limit) = var("PATTERNCTL_PROVISION_MAX_CONCURRENCY") {
            debug!("Overriding provision.max_concurrency from environment");
            config.provision.max_concurrency =
                parse_env("PATTERNCTL_PROVISION_MAX_CONCURRENCY", &limit)?;
        }

        Ok(())
    }

    /// Loads the .env file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| std::path::PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| {
                ProvisionError::Config(ConfigError::ParseError {
                    message: format!("Failed to load .env file: {e}"),
                    location: Some(env_path.display().to_string()),
                })
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }

    /// Loads a pattern file (YAML or JSON).
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_pattern(&self, path: impl AsRef<Path>) -> Result<PatternFile> {
        let path = path.as_ref();
        info!("Loading pattern from: {}", path.display());

        let content = read_file(path)?;
        Self::parse_pattern(&content, Some(path))
    }

    /// Parses a pattern from a YAML or JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is invalid.
    pub fn parse_pattern(content: &str, source: Option<&Path>) -> Result<PatternFile> {
        let pattern: PatternFile = serde_yaml::from_str(content).map_err(|e| {
            ProvisionError::Config(ConfigError::ParseError {
                message: format!("Pattern parse error: {e}"),
                location: source.map(|p| p.display().to_string()),
            })
        })?;

        debug!(
            "Parsed pattern '{}' with {} components",
            pattern.name,
            pattern.components.len()
        );
        Ok(pattern)
    }
}

fn read_file(path: &Path) -> Result<String> {
    if !path.exists() {
        return Err(ProvisionError::Config(ConfigError::FileNotFound {
            path: path.to_path_buf(),
        }));
    }

    std::fs::read_to_string(path).map_err(|e| {
        ProvisionError::Config(ConfigError::ParseError {
            message: format!("Failed to read file: {e}"),
            location: Some(path.display().to_string()),
        })
    })
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| {
        ProvisionError::Config(ConfigError::validation(
            format!("invalid value '{value}'"),
            name,
        ))
    })
}

/// Default configuration file names to search for.
pub const DEFAULT_CONFIG_FILES: &[&str] = &["patternctl.yaml", "patternctl.yml"];

/// Finds the configuration file in the given directory or its parents.
///
/// Returns `None` when no file is found; callers fall back to defaults.
#[must_use]
pub fn find_config_file(start_dir: impl AsRef<Path>) -> Option<std::path::PathBuf> {
    let mut current = start_dir.as_ref().to_path_buf();

    loop {
        for filename in DEFAULT_CONFIG_FILES {
            let config_path = current.join(filename);
            if config_path.exists() {
                info!("Found configuration file: {}", config_path.display());
                return Some(config_path);
            }
        }

        if !current.pop() {
            return None;
        }
    }
}
