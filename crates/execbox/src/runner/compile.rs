//! Compilation step
//!
//! Runs the toolchain's compile command in the workspace and checks that the
//! expected artifact was produced.

use tracing::{debug, instrument};

use crate::config::{CompileConfig, Config, Toolchain};
use crate::process::{ProcessBackend, StepCommand};
use crate::runner::{ExecuteError, ExecutionPhase, child_env};
use crate::types::StepResult;
use crate::workspace::Workspace;

/// Compile the source already written to the workspace
///
/// A failed compilation is returned as a normal [`StepResult`]; only a missing
/// artifact after a successful compile, or a step that could not be started,
/// is an error.
#[instrument(skip_all, fields(workspace = workspace.id(), toolchain = %toolchain.name))]
pub(crate) async fn compile<B: ProcessBackend>(
    backend: &B,
    config: &Config,
    workspace: &Workspace,
    toolchain: &Toolchain,
    compile: &CompileConfig,
) -> Result<StepResult, ExecuteError> {
    let source_name = toolchain.source_name();
    let command = Toolchain::expand_command(&compile.command, &source_name, &compile.output_name);
    let limits = config.effective_limits(compile.limits.as_ref(), None);

    debug!(?command, ?limits, "compiling");

    let step = StepCommand::new(command, workspace.path())
        .envs(child_env(config, workspace))
        .envs(&compile.env)
        .limits(limits);

    let result = backend
        .run(step)
        .await
        .map_err(|source| ExecuteError::Process {
            phase: ExecutionPhase::Compiling,
            source,
        })?;

    debug!(
        status = ?result.status,
        exit_code = ?result.exit_code,
        wall_time = result.wall_time,
        "compilation complete"
    );

    if result.is_success() {
        let produced = workspace
            .file_exists(&compile.output_name)
            .await
            .map_err(|source| ExecuteError::Workspace {
                phase: ExecutionPhase::Compiling,
                source,
            })?;
        if !produced {
            return Err(ExecuteError::ArtifactMissing(compile.output_name.clone()));
        }
    }

    Ok(result)
}
