//! Configuration file loading for execbox
//!
//! Handles loading and parsing configuration files and environment overrides
//! using the config crate.

use std::collections::HashMap;
use std::path::Path;

use config::builder::DefaultState;
use config::{Config as ConfigBuilder, Environment, File, FileFormat};

use crate::config::{Config, ConfigError, EXAMPLE_CONFIG};
use crate::registry::Language;
use crate::types::StepLimits;

/// Prefix of environment variables that override configuration values.
///
/// Nested keys are separated by `__`, e.g. `EXECBOX_DEFAULT_LIMITS__WALL_TIME_LIMIT=5`.
pub const ENV_PREFIX: &str = "EXECBOX";

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

impl Config {
    /// Load configuration from a file, with environment overrides applied
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let builder = ConfigBuilder::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(environment());
        Self::finish(builder)
    }

    /// Load the given file, or the embedded defaults, with environment overrides applied
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Self::parse_toml_with_env(EXAMPLE_CONFIG, environment()),
        }
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let builder =
            ConfigBuilder::builder().add_source(File::from_str(content, FileFormat::Toml));
        Self::finish(builder)
    }

    fn parse_toml_with_env(content: &str, env: Environment) -> Result<Self, ConfigError> {
        let builder = ConfigBuilder::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .add_source(env);
        Self::finish(builder)
    }

    fn finish(builder: config::ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let config: Config = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent must be at least 1".to_owned(),
            ));
        }
        if !(self.probe_timeout.is_finite() && self.probe_timeout > 0.0) {
            return Err(ConfigError::Invalid(
                "probe_timeout must be a positive number of seconds".to_owned(),
            ));
        }
        validate_limits("default_limits", &self.default_limits)?;

        // Health reports are keyed by display name
        let mut names: HashMap<&str, &str> = HashMap::with_capacity(self.toolchains.len());

        for (id, toolchain) in &self.toolchains {
            let language: Language = id
                .parse()
                .map_err(|_| ConfigError::UnknownLanguage(id.clone()))?;
            if language.key() != id {
                return Err(ConfigError::Invalid(format!(
                    "toolchain '{id}' must use the canonical key '{}'",
                    language.key()
                )));
            }
            if toolchain.name.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "toolchain '{id}' has empty name"
                )));
            }
            if let Some(other) = names.insert(&toolchain.name, id) {
                return Err(ConfigError::Invalid(format!(
                    "toolchains '{other}' and '{id}' share the name '{}'",
                    toolchain.name
                )));
            }
            if toolchain.extension.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "toolchain '{id}' has empty extension"
                )));
            }
            if toolchain.run.command.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "toolchain '{id}' has empty run command"
                )));
            }
            if let Some(ref limits) = toolchain.run.limits {
                validate_limits(&format!("toolchain '{id}' run limits"), limits)?;
            }
            if let Some(ref compile) = toolchain.compile {
                if compile.command.is_empty() {
                    return Err(ConfigError::Invalid(format!(
                        "toolchain '{id}' has empty compile command"
                    )));
                }
                if compile.output_name.is_empty() {
                    return Err(ConfigError::Invalid(format!(
                        "toolchain '{id}' has empty compile output name"
                    )));
                }
                if let Some(ref limits) = compile.limits {
                    validate_limits(&format!("toolchain '{id}' compile limits"), limits)?;
                }
            }
        }

        Ok(())
    }
}

fn validate_limits(context: &str, limits: &StepLimits) -> Result<(), ConfigError> {
    limits
        .check()
        .map_err(|reason| ConfigError::Invalid(format!("{context}: {reason}")))
}
