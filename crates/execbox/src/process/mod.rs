//! Child process supervision
//!
//! Runs one compile or run step as a child process in its own process group,
//! enforcing a wall clock timeout and an output cap.

use std::path::Path;

use nix::errno::Errno;
use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use thiserror::Error;
use tracing::warn;

pub use crate::process::command::StepCommand;
pub use crate::process::runner::{ProcessBackend, ProcessRunner};

mod command;
mod runner;

/// Errors that prevent a step from running at all
///
/// A program that runs and fails is not an error; see [`StepResult`](crate::StepResult).
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("empty command")]
    EmptyCommand,

    #[error("command '{0}' not found in PATH")]
    CommandNotFound(String),

    #[error("failed to spawn '{program}': {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error while supervising process: {0}")]
    Io(#[from] std::io::Error),
}

/// Resolve the program in a command to a path the child can be started from.
///
/// Bare names (like `g++`) are looked up in `search_path`. Relative paths
/// (like `./main`) are anchored at `working_dir`, so they do not depend on
/// how the platform orders `chdir` and `exec`. Absolute paths are left as is.
pub fn resolve_command(
    command: &mut [String],
    working_dir: &Path,
    search_path: &str,
) -> Result<(), ProcessError> {
    let Some(first) = command.first_mut() else {
        return Err(ProcessError::EmptyCommand);
    };

    if first.contains('/') {
        let program = Path::new(first.as_str());
        if program.is_relative() {
            *first = working_dir.join(program).to_string_lossy().into_owned();
        }
        return Ok(());
    }

    for dir in search_path.split(':').filter(|dir| !dir.is_empty()) {
        let candidate = Path::new(dir).join(&*first);
        if candidate.is_file() {
            *first = candidate.to_string_lossy().into_owned();
            return Ok(());
        }
    }

    Err(ProcessError::CommandNotFound(first.clone()))
}

/// SIGKILL every process in the group led by `pgid`
pub(crate) fn kill_process_group(pgid: Pid) {
    match killpg(pgid, Signal::SIGKILL) {
        // Group already gone
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(error) => warn!(pgid = pgid.as_raw(), %error, "failed to kill process group"),
    }
}
