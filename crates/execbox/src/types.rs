use std::process::ExitStatus;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default wall clock budget for a single step, in seconds
pub const DEFAULT_WALL_TIME_LIMIT: f64 = 10.0;

/// Default cap on combined stdout + stderr of a single step, in bytes
pub const DEFAULT_MAX_OUTPUT: u64 = 200 * StepLimits::KIB;

/// Appended to a stream that was cut off by the output cap
pub const OUTPUT_TRUNCATED_MARKER: &str = "\n[output truncated]";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepLimits {
    /// Wall clock time limit in seconds
    #[serde(default)]
    pub wall_time_limit: Option<f64>,

    /// Maximum combined stdout + stderr size in bytes
    #[serde(default)]
    pub max_output: Option<u64>,
}

impl StepLimits {
    /// 1 kibibyte in bytes
    pub const KIB: u64 = 1024;
    /// 1 mebibyte in bytes
    pub const MIB: u64 = 1024 * 1024;

    /// Create limits with no values set, for use as an override layer
    pub fn unset() -> Self {
        Self {
            wall_time_limit: None,
            max_output: None,
        }
    }

    /// Set the wall clock time limit in seconds
    pub fn with_wall_time_limit(mut self, seconds: f64) -> Self {
        self.wall_time_limit = Some(seconds);
        self
    }

    /// Set the maximum output size in bytes
    pub fn with_max_output(mut self, bytes: u64) -> Self {
        self.max_output = Some(bytes);
        self
    }

    /// Apply overrides from another StepLimits, preferring values from `overrides`
    pub fn with_overrides(&self, overrides: &StepLimits) -> StepLimits {
        StepLimits {
            wall_time_limit: overrides.wall_time_limit.or(self.wall_time_limit),
            max_output: overrides.max_output.or(self.max_output),
        }
    }

    /// Check that every value that is set is usable
    ///
    /// The wall time limit must be a positive number of seconds that fits in
    /// a [`Duration`]; the output cap must be at least one byte.
    pub fn check(&self) -> Result<(), String> {
        if let Some(secs) = self.wall_time_limit
            && !(secs > 0.0 && Duration::try_from_secs_f64(secs).is_ok())
        {
            return Err(format!(
                "wall_time_limit must be a positive number of seconds, got {secs}"
            ));
        }
        if self.max_output == Some(0) {
            return Err("max_output must be at least 1 byte".to_owned());
        }
        Ok(())
    }

    /// Wall clock budget, falling back to the default when unset
    pub fn timeout(&self) -> Duration {
        self.wall_time_limit
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
            .unwrap_or(Duration::from_secs_f64(DEFAULT_WALL_TIME_LIMIT))
    }

    /// Output budget in bytes, falling back to the default when unset
    pub fn output_cap(&self) -> u64 {
        self.max_output.unwrap_or(DEFAULT_MAX_OUTPUT)
    }
}

impl Default for StepLimits {
    fn default() -> Self {
        Self {
            wall_time_limit: Some(DEFAULT_WALL_TIME_LIMIT),
            max_output: Some(DEFAULT_MAX_OUTPUT),
        }
    }
}

/// Result of one compile or run step
#[derive(Debug, Clone)]
pub struct StepResult {
    /// How the step ended
    pub status: StepStatus,

    /// Exit code if the program exited on its own
    pub exit_code: Option<i32>,

    /// Signal number if the program was killed by a signal it did not get from us
    pub signal: Option<i32>,

    /// Wall clock time used in seconds
    pub wall_time: f64,

    /// Explanation when a limit was hit
    pub message: Option<String>,

    /// Captured standard output
    pub stdout: Vec<u8>,

    /// Captured standard error
    pub stderr: Vec<u8>,
}

impl StepResult {
    /// Check if the step was successful (exited with code 0)
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self.status, StepStatus::Ok) && self.exit_code == Some(0)
    }

    /// Whether the process ended by itself rather than being stopped by a limit
    pub fn exited_normally(&self) -> bool {
        !self.status.is_limit() && self.exit_code.is_some()
    }

    /// Captured stdout decoded lossily
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Captured stderr decoded lossily
    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

impl Default for StepResult {
    fn default() -> Self {
        Self {
            status: StepStatus::Ok,
            exit_code: None,
            signal: None,
            wall_time: 0.0,
            message: None,
            stdout: Vec::new(),
            stderr: Vec::new(),
        }
    }
}

/// Status of a step, using two-letter codes in serialized form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepStatus {
    /// Program exited with code 0
    #[serde(rename = "OK")]
    Ok,

    /// Program exited with a non-zero code
    #[serde(rename = "RE")]
    RuntimeError,

    /// Program was killed by a signal
    #[serde(rename = "SG")]
    Signaled,

    /// Wall clock limit exceeded, process group killed
    #[serde(rename = "TO")]
    TimeLimitExceeded,

    /// Output cap exceeded, process group killed
    #[serde(rename = "OL")]
    OutputLimitExceeded,
}

impl StepStatus {
    /// Map an exit status of a process that ended on its own
    pub fn from_exit_status(status: &ExitStatus) -> Self {
        use std::os::unix::process::ExitStatusExt;

        match status.code() {
            Some(0) => StepStatus::Ok,
            Some(_) => StepStatus::RuntimeError,
            None if status.signal().is_some() => StepStatus::Signaled,
            None => StepStatus::RuntimeError,
        }
    }

    /// Whether the step was stopped by one of our limits
    #[must_use]
    pub fn is_limit(&self) -> bool {
        matches!(
            self,
            StepStatus::TimeLimitExceeded | StepStatus::OutputLimitExceeded
        )
    }
}
