use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;

pub use crate::config::toolchain::{CompileConfig, FileExtension, RunConfig, Toolchain};
use crate::types::StepLimits;

pub mod toolchain;
mod loader;

pub use loader::ENV_PREFIX;

/// Example configuration embedded at compile time.
///
/// Used as the default configuration and written out by `execbox init`.
pub const EXAMPLE_CONFIG: &str = include_str!("../../execbox.example.toml");

/// PATH given to child processes when neither the config nor the host provides one
pub const DEFAULT_CHILD_PATH: &str = "/usr/local/bin:/usr/bin:/bin";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid characters in file extension")]
    InvalidFileExtChars,

    #[error("failed to parse config: {0}")]
    Parse(#[from] config::ConfigError),

    #[error("'{0}' is not a supported language key")]
    UnknownLanguage(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Config for execbox
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Directory under which per-request workspaces are created.
    ///
    /// Defaults to the system temporary directory.
    #[serde(default)]
    pub workspace_root: Option<PathBuf>,

    /// Maximum number of executions in flight at once. Further requests wait.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// PATH handed to compilers and programs. Defaults to the host's PATH.
    #[serde(default)]
    pub child_path: Option<String>,

    /// Wall clock budget for each health probe, in seconds
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout: f64,

    /// Default limits applied to every compile and run step.
    /// Toolchain step limits and per-request limits override these.
    #[serde(default)]
    pub default_limits: StepLimits,

    /// Toolchain configurations keyed by canonical language key
    #[serde(default)]
    pub toolchains: HashMap<String, Toolchain>,
}

impl Config {
    /// Create a new config with the embedded default toolchains
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty config with no toolchains
    pub fn empty() -> Self {
        Self {
            workspace_root: None,
            max_concurrent: default_max_concurrent(),
            child_path: None,
            probe_timeout: default_probe_timeout(),
            default_limits: StepLimits::default(),
            toolchains: HashMap::new(),
        }
    }

    /// Directory under which workspaces are created
    pub fn workspace_root(&self) -> PathBuf {
        self.workspace_root
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }

    /// PATH value for child processes
    pub fn child_path(&self) -> String {
        self.child_path
            .clone()
            .or_else(|| std::env::var("PATH").ok())
            .unwrap_or_else(|| DEFAULT_CHILD_PATH.to_owned())
    }

    /// Merge step limits with defaults: config defaults, then toolchain, then request
    pub fn effective_limits(
        &self,
        toolchain: Option<&StepLimits>,
        request: Option<&StepLimits>,
    ) -> StepLimits {
        let mut limits = self.default_limits.clone();
        if let Some(toolchain) = toolchain {
            limits = limits.with_overrides(toolchain);
        }
        if let Some(request) = request {
            limits = limits.with_overrides(request);
        }
        limits
    }

    /// Wall clock budget for health probes
    pub fn probe_timeout(&self) -> std::time::Duration {
        std::time::Duration::try_from_secs_f64(self.probe_timeout)
            .unwrap_or(std::time::Duration::from_secs_f64(default_probe_timeout()))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::parse_toml(EXAMPLE_CONFIG).expect("embedded default config should be valid")
    }
}

fn default_max_concurrent() -> usize {
    8
}

fn default_probe_timeout() -> f64 {
    5.0
}
