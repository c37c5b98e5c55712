//! Command description for a single step

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::types::StepLimits;

/// Everything needed to run one step as a child process
///
/// The child starts with an empty environment; only variables set here are
/// visible to it.
#[derive(Debug, Clone)]
pub struct StepCommand {
    command: Vec<String>,
    working_dir: PathBuf,
    env: HashMap<String, String>,
    limits: StepLimits,
    stdin: Option<Vec<u8>>,
}

impl StepCommand {
    /// Create a command that runs `command` inside `working_dir`
    pub fn new(
        command: impl IntoIterator<Item = impl Into<String>>,
        working_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            command: command.into_iter().map(Into::into).collect(),
            working_dir: working_dir.into(),
            env: HashMap::new(),
            limits: StepLimits::default(),
            stdin: None,
        }
    }

    /// Set an environment variable
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set several environment variables
    pub fn envs<K, V>(mut self, vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Set the wall clock and output limits
    pub fn limits(mut self, limits: StepLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Feed `data` to the child's stdin. Empty input leaves stdin at /dev/null.
    pub fn stdin(mut self, data: impl Into<Vec<u8>>) -> Self {
        let data = data.into();
        self.stdin = (!data.is_empty()).then_some(data);
        self
    }

    /// Full argv, program first
    pub fn argv(&self) -> &[String] {
        &self.command
    }

    /// Program to run, empty if the command is empty
    pub fn program(&self) -> &str {
        self.command.first().map(String::as_str).unwrap_or_default()
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn env_vars(&self) -> &HashMap<String, String> {
        &self.env
    }

    pub fn step_limits(&self) -> &StepLimits {
        &self.limits
    }

    pub fn stdin_data(&self) -> Option<&[u8]> {
        self.stdin.as_deref()
    }

    pub(crate) fn into_parts(
        self,
    ) -> (
        Vec<String>,
        PathBuf,
        HashMap<String, String>,
        StepLimits,
        Option<Vec<u8>>,
    ) {
        (self.command, self.working_dir, self.env, self.limits, self.stdin)
    }
}
