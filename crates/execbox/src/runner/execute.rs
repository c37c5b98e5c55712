//! Run step
//!
//! Runs the compiled artifact, or the source itself for interpreted toolchains.

use tracing::{debug, instrument};

use crate::config::{Config, Toolchain};
use crate::process::{ProcessBackend, StepCommand};
use crate::runner::{ExecuteError, ExecutionPhase, child_env};
use crate::types::{StepLimits, StepResult};
use crate::workspace::Workspace;

#[instrument(skip_all, fields(workspace = workspace.id(), toolchain = %toolchain.name))]
pub(crate) async fn run<B: ProcessBackend>(
    backend: &B,
    config: &Config,
    workspace: &Workspace,
    toolchain: &Toolchain,
    stdin: &str,
    overrides: Option<&StepLimits>,
) -> Result<StepResult, ExecuteError> {
    let command = Toolchain::expand_command(
        &toolchain.run.command,
        &toolchain.source_name(),
        &toolchain.binary_name(),
    );
    let limits = config.effective_limits(toolchain.run.limits.as_ref(), overrides);

    debug!(?command, ?limits, "running program");

    let step = StepCommand::new(command, workspace.path())
        .envs(child_env(config, workspace))
        .envs(&toolchain.run.env)
        .limits(limits)
        .stdin(stdin);

    let result = backend
        .run(step)
        .await
        .map_err(|source| ExecuteError::Process {
            phase: ExecutionPhase::Running,
            source,
        })?;

    debug!(
        status = ?result.status,
        exit_code = ?result.exit_code,
        wall_time = result.wall_time,
        "run complete"
    );

    Ok(result)
}
