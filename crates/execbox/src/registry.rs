//! Language keys and the toolchain lookup table
//!
//! This is the single place where caller-supplied language names are
//! interpreted. Adding a language means adding a [`Language`] variant and a
//! `[toolchains.<key>]` table in the configuration.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

use crate::config::{Config, ConfigError, Toolchain};

/// Supported languages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    C,
    Cpp,
    Java,
    JavaScript,
}

impl Language {
    pub const ALL: [Language; 5] = [
        Language::Python,
        Language::C,
        Language::Cpp,
        Language::Java,
        Language::JavaScript,
    ];

    /// Canonical key, as used in configuration files and responses
    pub fn key(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::Java => "java",
            Language::JavaScript => "javascript",
        }
    }

    /// Alternative names accepted when parsing
    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            Language::Python => &["py", "python3"],
            Language::C => &[],
            Language::Cpp => &["c++", "cxx"],
            Language::Java => &[],
            Language::JavaScript => &["js", "node"],
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown language '{0}'")]
pub struct UnknownLanguage(pub String);

impl FromStr for Language {
    type Err = UnknownLanguage;

    /// Case-insensitive, accepts aliases such as `c++` and `js`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        Language::ALL
            .into_iter()
            .find(|lang| lang.key() == needle || lang.aliases().contains(&needle.as_str()))
            .ok_or_else(|| UnknownLanguage(s.to_owned()))
    }
}

/// Read-only table of toolchains, built once at startup
#[derive(Debug, Clone)]
pub struct ToolchainRegistry {
    toolchains: HashMap<Language, Toolchain>,
}

impl ToolchainRegistry {
    /// Build the registry from the configured toolchains
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let mut toolchains = HashMap::with_capacity(config.toolchains.len());
        for (key, toolchain) in &config.toolchains {
            let language: Language = key
                .parse()
                .map_err(|_| ConfigError::UnknownLanguage(key.clone()))?;
            if toolchains.insert(language, toolchain.clone()).is_some() {
                return Err(ConfigError::Invalid(format!(
                    "language '{language}' is configured more than once"
                )));
            }
        }
        Ok(Self { toolchains })
    }

    /// Resolve a caller-supplied language name to its toolchain
    ///
    /// Returns `None` for unknown names and for known languages that have no
    /// toolchain configured.
    pub fn resolve(&self, key: &str) -> Option<(Language, &Toolchain)> {
        let language = key.parse::<Language>().ok()?;
        self.get(language).map(|toolchain| (language, toolchain))
    }

    /// Get the toolchain for a language
    pub fn get(&self, language: Language) -> Option<&Toolchain> {
        self.toolchains.get(&language)
    }

    /// Iterate over registered toolchains in a stable order
    pub fn iter(&self) -> impl Iterator<Item = (Language, &Toolchain)> {
        let mut entries: Vec<_> = self.toolchains.iter().map(|(l, t)| (*l, t)).collect();
        entries.sort_by_key(|(language, _)| *language);
        entries.into_iter()
    }

    pub fn len(&self) -> usize {
        self.toolchains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.toolchains.is_empty()
    }
}
