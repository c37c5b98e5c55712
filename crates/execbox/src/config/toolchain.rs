use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize, de};

use crate::config::ConfigError;
use crate::types::StepLimits;

const INVALID_FILE_EXT_CHARS: [char; 2] = ['/', '.'];

/// Configuration for one language toolchain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Toolchain {
    /// Human-readable name for the toolchain (e.g., "C++ (GCC)")
    pub name: String,

    /// Version label reported alongside results
    #[serde(default)]
    pub version: Option<String>,

    /// File extension
    pub extension: FileExtension,

    /// Fixed file name the source is written to (defaults to `main.<extension>`)
    #[serde(default)]
    pub source_name: Option<String>,

    /// Command used by the health probe (defaults to `<program> --version`)
    #[serde(default)]
    pub version_command: Option<Vec<String>>,

    /// Compilation configuration (None for interpreted languages)
    #[serde(default)]
    pub compile: Option<CompileConfig>,

    /// Execution configuration
    pub run: RunConfig,
}

impl Toolchain {
    /// Check if the toolchain has a separate build step
    pub fn is_compiled(&self) -> bool {
        self.compile.is_some()
    }

    /// Get the source file name for this toolchain
    pub fn source_name(&self) -> String {
        self.source_name
            .clone()
            .unwrap_or_else(|| format!("main.{}", self.extension))
    }

    /// Name of the artifact the run command operates on
    ///
    /// Compiled toolchains run their build output, interpreted ones the source itself.
    pub fn binary_name(&self) -> String {
        match self.compile {
            Some(ref compile) => compile.output_name.clone(),
            None => self.source_name(),
        }
    }

    /// Command the health probe runs to check that the toolchain is installed
    pub fn probe_command(&self) -> Vec<String> {
        if let Some(ref command) = self.version_command {
            return command.clone();
        }

        let program = self
            .compile
            .as_ref()
            .and_then(|compile| compile.command.first())
            .or_else(|| self.run.command.first())
            .cloned()
            .unwrap_or_default();
        vec![program, "--version".to_owned()]
    }

    /// Expand placeholders in the given command
    pub fn expand_command(command: &[String], source: &str, binary: &str) -> Vec<String> {
        command
            .iter()
            .map(|arg| {
                arg.replace("{source}", source)
                    .replace("{output}", binary)
                    .replace("{binary}", binary)
            })
            .collect()
    }
}

/// File extension without dot (e.g., "cpp")
#[derive(Debug, Clone, Serialize)]
pub struct FileExtension(String);

impl FileExtension {
    pub fn new(extension: &str) -> Result<Self, ConfigError> {
        let contains_invalid = extension
            .chars()
            .any(|c| INVALID_FILE_EXT_CHARS.contains(&c));
        if contains_invalid {
            return Err(ConfigError::InvalidFileExtChars);
        }
        Ok(Self(extension.to_owned()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'de> Deserialize<'de> for FileExtension {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        FileExtension::new(&s).map_err(|_| {
            de::Error::invalid_value(
                de::Unexpected::Str(&s),
                &"a file extension without '/' or '.' characters",
            )
        })
    }
}

impl std::fmt::Display for FileExtension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Configuration for the compilation step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompileConfig {
    /// Command and arguments with placeholders
    /// Placeholders: {source}, {output}
    pub command: Vec<String>,

    /// Artifact the compiler produces (e.g., "main", "Main.class")
    pub output_name: String,

    /// Environment variables to set during compilation
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Limits for compilation (overrides defaults)
    #[serde(default)]
    pub limits: Option<StepLimits>,
}

/// Configuration for the execution step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Command and arguments with placeholders
    /// Placeholders: {source}, {binary}
    pub command: Vec<String>,

    /// Environment variables to set
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Limits for execution (overrides defaults)
    #[serde(default)]
    pub limits: Option<StepLimits>,
}
