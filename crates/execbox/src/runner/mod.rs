//! Code runner for execbox
//!
//! Takes an [`ExecutionRequest`] through its phases: validation, workspace
//! setup, optional compilation, the run itself and cleanup.

use std::fmt;

use thiserror::Error;
use tracing::{debug, instrument};

pub use crate::runner::request::{ExecutionRequest, ExecutionResult};

mod compile;
mod execute;
mod request;

use crate::config::{Config, ConfigError, Toolchain};
use crate::process::{ProcessBackend, ProcessError, ProcessRunner};
use crate::registry::{Language, ToolchainRegistry};
use crate::workspace::{Workspace, WorkspaceError, WorkspacePool};

/// Request rejected before any workspace or process was touched
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("language and code are required")]
    MissingFields,

    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("invalid limits: {0}")]
    InvalidLimits(String),
}

/// Phases an execution moves through, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionPhase {
    Validating,
    WorkspaceReady,
    Compiling,
    Running,
    ResultAssembled,
    Cleaned,
}

impl fmt::Display for ExecutionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExecutionPhase::Validating => "validating",
            ExecutionPhase::WorkspaceReady => "workspace setup",
            ExecutionPhase::Compiling => "compiling",
            ExecutionPhase::Running => "running",
            ExecutionPhase::ResultAssembled => "assembling result",
            ExecutionPhase::Cleaned => "cleanup",
        };
        f.write_str(name)
    }
}

/// Errors that stop an execution from producing a result
///
/// Programs that fail to compile, crash or hit a limit are not errors; they
/// produce an [`ExecutionResult`] with `success` set to false.
#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("workspace error while {phase}: {source}")]
    Workspace {
        phase: ExecutionPhase,
        #[source]
        source: WorkspaceError,
    },

    #[error("process error while {phase}: {source}")]
    Process {
        phase: ExecutionPhase,
        #[source]
        source: ProcessError,
    },

    #[error("compilation succeeded but '{0}' was not produced")]
    ArtifactMissing(String),
}

impl ExecuteError {
    /// Whether the request itself was at fault, as opposed to the service
    pub fn is_validation(&self) -> bool {
        matches!(self, ExecuteError::Validation(_))
    }

    /// Phase the error occurred in
    pub fn phase(&self) -> ExecutionPhase {
        match self {
            ExecuteError::Validation(_) => ExecutionPhase::Validating,
            ExecuteError::Workspace { phase, .. } | ExecuteError::Process { phase, .. } => *phase,
            ExecuteError::ArtifactMissing(_) => ExecutionPhase::Compiling,
        }
    }
}

/// High-level runner for code execution
///
/// Built once at startup and shared between requests. The number of
/// executions in flight is bounded by `max_concurrent`; further calls to
/// [`execute`](Self::execute) wait for a free slot.
#[derive(Debug)]
pub struct Runner<B = ProcessRunner> {
    config: Config,
    registry: ToolchainRegistry,
    pool: WorkspacePool,
    backend: B,
}

impl Runner<ProcessRunner> {
    /// Create a runner that executes steps as local child processes
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        Self::with_backend(config, ProcessRunner)
    }
}

impl<B: ProcessBackend> Runner<B> {
    /// Create a runner with a custom process backend
    pub fn with_backend(config: Config, backend: B) -> Result<Self, ConfigError> {
        let registry = ToolchainRegistry::from_config(&config)?;
        let pool = WorkspacePool::new(config.workspace_root(), config.max_concurrent);
        Ok(Self {
            config,
            registry,
            pool,
            backend,
        })
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &ToolchainRegistry {
        &self.registry
    }

    pub fn pool(&self) -> &WorkspacePool {
        &self.pool
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Check a request without touching the filesystem
    pub fn validate(
        &self,
        request: &ExecutionRequest,
    ) -> Result<(Language, &Toolchain), ValidationError> {
        if request.language.trim().is_empty() || request.code.is_empty() {
            return Err(ValidationError::MissingFields);
        }
        if let Some(ref limits) = request.limits {
            limits.check().map_err(ValidationError::InvalidLimits)?;
        }
        self.registry
            .resolve(&request.language)
            .ok_or_else(|| ValidationError::UnsupportedLanguage(request.language.clone()))
    }

    /// Compile (if needed) and run a program in a fresh workspace
    ///
    /// The workspace is removed before this returns, whatever the outcome.
    #[instrument(skip(self, request), fields(language = %request.language))]
    pub async fn execute(
        &self,
        request: &ExecutionRequest,
    ) -> Result<ExecutionResult, ExecuteError> {
        let (language, toolchain) = self.validate(request)?;

        let workspace = self
            .pool
            .acquire()
            .await
            .map_err(|source| ExecuteError::Workspace {
                phase: ExecutionPhase::WorkspaceReady,
                source,
            })?;

        let result = self
            .execute_in(&workspace, language, toolchain, request)
            .await;

        workspace.release().await;
        debug!(
            phase = %ExecutionPhase::Cleaned,
            success = ?result.as_ref().map(|r| r.success).ok()
        );

        result
    }

    async fn execute_in(
        &self,
        workspace: &Workspace,
        language: Language,
        toolchain: &Toolchain,
        request: &ExecutionRequest,
    ) -> Result<ExecutionResult, ExecuteError> {
        let source_name = toolchain.source_name();
        workspace
            .write_file(&source_name, request.code.as_bytes())
            .await
            .map_err(|source| ExecuteError::Workspace {
                phase: ExecutionPhase::WorkspaceReady,
                source,
            })?;
        debug!(phase = %ExecutionPhase::WorkspaceReady, workspace = workspace.id(), %source_name);

        let compiled = match toolchain.compile {
            Some(ref compile_config) => {
                let step = compile::compile(
                    &self.backend,
                    &self.config,
                    workspace,
                    toolchain,
                    compile_config,
                )
                .await?;

                if !step.is_success() {
                    debug!(
                        phase = %ExecutionPhase::ResultAssembled,
                        "compilation failed, skipping run"
                    );
                    return Ok(ExecutionResult::from_steps(
                        language,
                        toolchain,
                        Some(step),
                        None,
                    ));
                }
                Some(step)
            }
            None => None,
        };

        let run = execute::run(
            &self.backend,
            &self.config,
            workspace,
            toolchain,
            &request.stdin,
            request.limits.as_ref(),
        )
        .await?;

        debug!(phase = %ExecutionPhase::ResultAssembled);
        Ok(ExecutionResult::from_steps(
            language,
            toolchain,
            compiled,
            Some(run),
        ))
    }
}

/// Environment every step starts from: the child PATH and the workspace as HOME
pub(crate) fn child_env(config: &Config, workspace: &Workspace) -> [(String, String); 2] {
    [
        ("PATH".to_owned(), config.child_path()),
        ("HOME".to_owned(), workspace.path().display().to_string()),
    ]
}
