//! Request and result types for a single execution

use serde::Serialize;

use crate::config::Toolchain;
use crate::registry::Language;
use crate::types::{StepLimits, StepResult};

/// A program to compile (if needed) and run
#[derive(Debug, Clone, Default)]
pub struct ExecutionRequest {
    /// Language key or alias, e.g. `python` or `c++`
    pub language: String,

    /// Source text
    pub code: String,

    /// Standard input for the run step
    pub stdin: String,

    /// Overrides for the run step limits
    pub limits: Option<StepLimits>,
}

impl ExecutionRequest {
    pub fn new(language: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            code: code.into(),
            ..Default::default()
        }
    }

    pub fn with_stdin(mut self, stdin: impl Into<String>) -> Self {
        self.stdin = stdin.into();
        self
    }

    pub fn with_limits(mut self, limits: StepLimits) -> Self {
        self.limits = Some(limits);
        self
    }
}

/// Outcome of an execution
///
/// A program that fails to compile, crashes or hits a limit still produces a
/// result, with `success` set to false.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    /// True only if every step that ran exited with code 0
    pub success: bool,

    pub language: Language,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Stdout followed by stderr, trimmed
    pub output: String,

    /// Stdout of the last step that ran
    pub stdout: String,

    /// Stderr of the last step that ran
    pub stderr: String,

    #[serde(skip)]
    pub compile: Option<StepResult>,

    #[serde(skip)]
    pub run: Option<StepResult>,
}

impl ExecutionResult {
    /// Build the result from the steps that ran
    ///
    /// When compilation failed, `run` is `None` and the compiler's output is
    /// reported.
    pub(crate) fn from_steps(
        language: Language,
        toolchain: &Toolchain,
        compile: Option<StepResult>,
        run: Option<StepResult>,
    ) -> Self {
        let success =
            run.is_some() && compile.iter().chain(run.iter()).all(StepResult::is_success);

        let (stdout, stderr) = run
            .as_ref()
            .or(compile.as_ref())
            .map(|step| (step.stdout_lossy(), step.stderr_lossy()))
            .unwrap_or_default();

        Self {
            success,
            language,
            version: toolchain.version.clone(),
            output: combine_output(&stdout, &stderr),
            stdout,
            stderr,
            compile,
            run,
        }
    }
}

fn combine_output(stdout: &str, stderr: &str) -> String {
    format!("{stdout}\n{stderr}").trim().to_owned()
}
