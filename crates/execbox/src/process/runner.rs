//! Child process spawning and supervision

use std::future::Future;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use nix::sys::signal::Signal;
use nix::unistd::Pid;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use crate::config::DEFAULT_CHILD_PATH;
use crate::process::command::StepCommand;
use crate::process::{ProcessError, kill_process_group, resolve_command};
use crate::types::{OUTPUT_TRUNCATED_MARKER, StepResult, StepStatus};

/// How long to wait for the output pipes to close once the group is dead
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

const READ_CHUNK: usize = 8 * 1024;

/// Something that can run a [`StepCommand`] to completion
///
/// [`ProcessRunner`] is the only production implementation. The trait is the
/// seam for stronger isolation backends and for recording backends in tests.
pub trait ProcessBackend: Send + Sync {
    fn run(
        &self,
        command: StepCommand,
    ) -> impl Future<Output = Result<StepResult, ProcessError>> + Send;
}

/// Runs steps as local child processes, one process group per step
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ProcessBackend for ProcessRunner {
    #[instrument(skip(self, command), fields(program = command.program()))]
    async fn run(&self, command: StepCommand) -> Result<StepResult, ProcessError> {
        let (mut argv, working_dir, env, limits, stdin) = command.into_parts();

        let search_path = env
            .get("PATH")
            .cloned()
            .or_else(|| std::env::var("PATH").ok())
            .unwrap_or_else(|| DEFAULT_CHILD_PATH.to_owned());
        resolve_command(&mut argv, &working_dir, &search_path)?;

        let timeout = limits.timeout();
        let budget = Arc::new(OutputBudget::new(limits.output_cap()));
        debug!(?argv, ?working_dir, ?timeout, cap = budget.cap, "spawning step");

        let mut child = Command::new(&argv[0])
            .args(&argv[1..])
            .env_clear()
            .envs(&env)
            .current_dir(&working_dir)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ProcessError::SpawnFailed {
                program: argv[0].clone(),
                source,
            })?;

        let started = Instant::now();
        let pid = child
            .id()
            .ok_or_else(|| std::io::Error::other("child was reaped before it could be tracked"))?;
        // The child leads its own group, so the group id is its pid
        let mut group = GroupGuard::new(Pid::from_raw(pid as i32));

        let stdin_task = match (child.stdin.take(), stdin) {
            (Some(mut pipe), Some(data)) => Some(tokio::spawn(async move {
                // The program is free to exit without reading its input
                let _ = pipe.write_all(&data).await;
                let _ = pipe.shutdown().await;
            })),
            _ => None,
        };

        let stdout_task = child
            .stdout
            .take()
            .map(|pipe| tokio::spawn(read_capped(pipe, budget.clone())));
        let stderr_task = child
            .stderr
            .take()
            .map(|pipe| tokio::spawn(read_capped(pipe, budget.clone())));

        let (outcome, exited) = tokio::select! {
            status = child.wait() => (Outcome::Exited, Some(status)),
            () = tokio::time::sleep(timeout) => (Outcome::TimedOut, None),
            () = budget.wait_exceeded() => (Outcome::OutputExceeded, None),
        };
        let wall_time = started.elapsed().as_secs_f64();

        // Stray background children must not outlive the step
        group.kill();
        let status = match exited {
            Some(status) => status?,
            None => child.wait().await?,
        };

        if let Some(task) = stdin_task {
            task.abort();
        }
        let (stdout, stdout_truncated) = drain(stdout_task).await;
        let (stderr, stderr_truncated) = drain(stderr_task).await;

        let result = assemble(
            outcome,
            status,
            wall_time,
            timeout,
            budget.cap,
            Captured {
                stdout,
                stdout_truncated,
                stderr,
                stderr_truncated,
            },
        );

        debug!(
            status = ?result.status,
            exit_code = ?result.exit_code,
            wall_time = result.wall_time,
            "step complete"
        );

        Ok(result)
    }
}

/// What ended the wait on the child
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Exited,
    TimedOut,
    OutputExceeded,
}

struct Captured {
    stdout: Vec<u8>,
    stdout_truncated: bool,
    stderr: Vec<u8>,
    stderr_truncated: bool,
}

fn assemble(
    outcome: Outcome,
    status: ExitStatus,
    wall_time: f64,
    timeout: Duration,
    cap: u64,
    captured: Captured,
) -> StepResult {
    use std::os::unix::process::ExitStatusExt;

    let Captured {
        mut stdout,
        stdout_truncated,
        mut stderr,
        stderr_truncated,
    } = captured;

    if stdout_truncated {
        stdout.extend_from_slice(OUTPUT_TRUNCATED_MARKER.as_bytes());
    }
    if stderr_truncated {
        stderr.extend_from_slice(OUTPUT_TRUNCATED_MARKER.as_bytes());
    }

    let mut result = StepResult {
        wall_time,
        ..Default::default()
    };

    if outcome == Outcome::TimedOut {
        let note = format!(
            "Time limit exceeded: process killed after {:.1}s",
            timeout.as_secs_f64()
        );
        if !stderr.is_empty() && !stderr.ends_with(b"\n") {
            stderr.push(b'\n');
        }
        stderr.extend_from_slice(note.as_bytes());
        result.status = StepStatus::TimeLimitExceeded;
        result.signal = Some(Signal::SIGKILL as i32);
        result.message = Some(note);
    } else if stdout_truncated || stderr_truncated || outcome == Outcome::OutputExceeded {
        result.status = StepStatus::OutputLimitExceeded;
        result.signal = status.signal();
        result.message = Some(format!("output limit exceeded ({cap} bytes)"));
    } else {
        result.status = StepStatus::from_exit_status(&status);
        result.exit_code = status.code();
        result.signal = status.signal();
        if let Some(signal) = result.signal {
            let name = Signal::try_from(signal)
                .map(|s| s.as_str().to_owned())
                .unwrap_or_else(|_| signal.to_string());
            result.message = Some(format!("killed by signal {name}"));
        }
    }

    result.stdout = stdout;
    result.stderr = stderr;
    result
}

/// Wait for a reader task, giving up if the pipe stays open
async fn drain(task: Option<JoinHandle<(Vec<u8>, bool)>>) -> (Vec<u8>, bool) {
    let Some(mut task) = task else {
        return (Vec::new(), false);
    };

    match tokio::time::timeout(DRAIN_TIMEOUT, &mut task).await {
        Ok(Ok(captured)) => captured,
        Ok(Err(error)) => {
            warn!(%error, "output reader task failed");
            (Vec::new(), false)
        }
        Err(_) => {
            // A process that left the group can hold the pipe open
            task.abort();
            warn!("output pipe still open after the process group was killed");
            (Vec::new(), false)
        }
    }
}

/// Read a pipe to EOF, keeping only what fits in the shared budget
///
/// Returns the kept bytes and whether anything was dropped.
async fn read_capped<R>(mut reader: R, budget: Arc<OutputBudget>) -> (Vec<u8>, bool)
where
    R: AsyncRead + Unpin,
{
    let mut kept = Vec::new();
    let mut buf = vec![0u8; READ_CHUNK];

    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => return (kept, false),
            Ok(n) => {
                let allowed = budget.claim(n);
                kept.extend_from_slice(&buf[..allowed]);
                if allowed < n {
                    return (kept, true);
                }
            }
        }
    }
}

/// Byte budget shared by the stdout and stderr readers of one step
#[derive(Debug)]
struct OutputBudget {
    cap: u64,
    used: AtomicU64,
    exceeded: AtomicBool,
    notify: Notify,
}

impl OutputBudget {
    fn new(cap: u64) -> Self {
        Self {
            cap,
            used: AtomicU64::new(0),
            exceeded: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    /// Claim `n` bytes, returning how many of them fit under the cap
    fn claim(&self, n: usize) -> usize {
        let requested = n as u64;
        let before = self.used.fetch_add(requested, Ordering::SeqCst);
        let allowed = self.cap.saturating_sub(before).min(requested);
        if allowed < requested {
            self.trip();
        }
        allowed as usize
    }

    fn trip(&self) {
        if !self.exceeded.swap(true, Ordering::SeqCst) {
            // notify_one stores a permit if nobody is waiting yet
            self.notify.notify_one();
        }
    }

    fn is_exceeded(&self) -> bool {
        self.exceeded.load(Ordering::SeqCst)
    }

    async fn wait_exceeded(&self) {
        while !self.is_exceeded() {
            self.notify.notified().await;
        }
    }
}

/// Kills the step's process group when dropped, unless already killed
///
/// Covers the case where the step future is cancelled mid-run.
struct GroupGuard {
    pgid: Pid,
    armed: bool,
}

impl GroupGuard {
    fn new(pgid: Pid) -> Self {
        Self { pgid, armed: true }
    }

    fn kill(&mut self) {
        if std::mem::replace(&mut self.armed, false) {
            kill_process_group(self.pgid);
        }
    }
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        self.kill();
    }
}
