//! A library for running untrusted programs in many languages.
//!
//! execbox compiles (when needed) and runs a submitted program in a
//! single-use workspace directory, bounded by a wall clock timeout and an
//! output cap, and reports what it printed and how it ended.
//!
//! # Features
//!
//! - **Multi-language** — Python, C, C++, Java and JavaScript out of the box, driven by TOML toolchain tables.
//! - **Process groups** — every step runs in its own group, killed as a whole on timeout, overflow or exit.
//! - **Disposable workspaces** — a fresh directory per execution, removed on every exit path.
//! - **Bounded concurrency** — a semaphore caps the number of executions in flight.
//! - **Health probes** — concurrent version queries report which toolchains are installed.

pub use config::{Config, ConfigError, EXAMPLE_CONFIG, Toolchain};
pub use health::{HealthProbe, HealthReport, HealthStatus, ToolchainHealth};
pub use process::{ProcessBackend, ProcessError, ProcessRunner, StepCommand};
pub use registry::{Language, ToolchainRegistry, UnknownLanguage};
pub use runner::{
    ExecuteError, ExecutionPhase, ExecutionRequest, ExecutionResult, Runner, ValidationError,
};
pub use types::{StepLimits, StepResult, StepStatus};
pub use workspace::{Workspace, WorkspaceError, WorkspacePool};

pub mod config;
pub mod health;
pub mod process;
pub mod registry;
pub mod runner;
pub mod types;
pub mod workspace;
