use serde::{Deserialize, Serialize};
use std::env;
use thiserror::Error;
use validator::{Validate, ValidationError};

use crate::dialect::{DialectKind, DialectSettings};

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),

    #[error("Parse error for {field}: {value} - {source}")]
    Parse {
        field: String,
        value: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Translator configuration with validation
#[derive(Clone, Debug, Validate, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TranslatorConfig {
    /// Dialect preset
    pub dialect: DialectKind,

    /// Parameter marker prefix; empty keeps the dialect's own
    #[validate(custom(function = "validate_parameter_prefix"))]
    pub parameter_prefix: String,

    /// Upper bound on unrolled in-memory list elements (1-10000)
    #[validate(range(
        min = 1,
        max = 10000,
        message = "Max list unroll must be between 1 and 10000"
    ))]
    pub max_list_unroll: usize,

    /// Log every generated statement at info level
    pub log_sql: bool,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            dialect: DialectKind::Generic,
            parameter_prefix: String::new(),
            max_list_unroll: crate::translator::DEFAULT_MAX_LIST_UNROLL,
            log_sql: false,
        }
    }
}

fn validate_parameter_prefix(prefix: &str) -> Result<(), ValidationError> {
    if prefix.is_empty() || matches!(prefix, "@" | ":" | "$" | "?") {
        return Ok(());
    }
    let mut error = ValidationError::new("parameter_prefix");
    error.message = Some("Parameter prefix must be one of @ : $ ?".into());
    Err(error)
}

impl TranslatorConfig {
    /// Create configuration from environment variables with validation
    pub fn from_env() -> Result<Self, ConfigError> {
        let dialect = env::var("SQLWEAVE_DIALECT").unwrap_or_else(|_| "generic".to_string());
        let config = Self {
            dialect: parse_dialect("SQLWEAVE_DIALECT", &dialect)?,
            parameter_prefix: env::var("SQLWEAVE_PARAMETER_PREFIX").unwrap_or_default(),
            max_list_unroll: parse_env_var("SQLWEAVE_MAX_LIST_UNROLL", "1000")?,
            log_sql: parse_env_var("SQLWEAVE_LOG_SQL", "false")?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Create configuration from CLI arguments with validation
    pub fn from_cli(cli: CliConfig) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.merge(cli)?;
        Ok(config)
    }

    /// Create configuration from YAML file
    pub fn from_yaml_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Parse {
            field: "yaml_file".to_string(),
            value: "file read failed".to_string(),
            source: Box::new(e),
        })?;

        let config: Self = serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse {
            field: "yaml_content".to_string(),
            value: content,
            source: Box::new(e),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Applies the options given on the command line (CLI overrides
    /// environment and file settings).
    pub fn merge(&mut self, cli: CliConfig) -> Result<(), ConfigError> {
        if let Some(dialect) = cli.dialect {
            self.dialect = parse_dialect("--dialect", &dialect)?;
        }
        if let Some(prefix) = cli.parameter_prefix {
            self.parameter_prefix = prefix;
        }
        if let Some(limit) = cli.max_list_unroll {
            self.max_list_unroll = limit;
        }
        if cli.log_sql {
            self.log_sql = true;
        }
        self.validate()?;
        Ok(())
    }

    /// The dialect preset with the configured overrides applied.
    pub fn dialect_settings(&self) -> DialectSettings {
        let mut settings = self.dialect.settings();
        if !self.parameter_prefix.is_empty() {
            settings.parameter_prefix = self.parameter_prefix.clone();
        }
        settings
    }
}

/// CLI configuration (parsed from command line arguments)
#[derive(Clone, Debug, Default)]
pub struct CliConfig {
    pub dialect: Option<String>,
    pub parameter_prefix: Option<String>,
    pub max_list_unroll: Option<usize>,
    pub log_sql: bool,
}

fn parse_dialect(field: &str, value: &str) -> Result<DialectKind, ConfigError> {
    value.parse().map_err(|e: String| ConfigError::Parse {
        field: field.to_string(),
        value: value.to_string(),
        source: e.into(),
    })
}

/// Parse an environment variable with a default value
fn parse_env_var<T: std::str::FromStr>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let value = env::var(key).unwrap_or_else(|_| default.to_string());
    value.parse().map_err(|e| ConfigError::Parse {
        field: key.to_string(),
        value,
        source: Box::new(e),
    })
}
