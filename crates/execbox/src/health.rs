//! Toolchain availability checks
//!
//! Runs each toolchain's version command and reports which ones are usable.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::config::Config;
use crate::process::{ProcessBackend, ProcessRunner, StepCommand};
use crate::registry::ToolchainRegistry;
use crate::types::StepLimits;

/// Output cap for a version query
const PROBE_MAX_OUTPUT: u64 = 16 * StepLimits::KIB;

/// Overall service status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Every toolchain answered its version query
    Healthy,
    /// At least one toolchain is missing or broken
    Degraded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolchainHealth {
    pub available: bool,

    /// First non-empty line the version command printed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,

    /// Keyed by toolchain display name
    pub toolchains: BTreeMap<String, ToolchainHealth>,

    pub timestamp: DateTime<Utc>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

#[derive(Debug, Clone)]
struct Probe {
    name: String,
    command: Vec<String>,
}

/// Checks that every registered toolchain can be started
///
/// Built once from the registry. Probes run in the system temporary
/// directory, never in a workspace.
#[derive(Debug)]
pub struct HealthProbe<B = ProcessRunner> {
    probes: Vec<Probe>,
    env: Vec<(String, String)>,
    working_dir: PathBuf,
    timeout: Duration,
    backend: B,
}

impl HealthProbe<ProcessRunner> {
    pub fn new(config: &Config, registry: &ToolchainRegistry) -> Self {
        Self::with_backend(config, registry, ProcessRunner)
    }
}

impl<B: ProcessBackend> HealthProbe<B> {
    pub fn with_backend(config: &Config, registry: &ToolchainRegistry, backend: B) -> Self {
        let probes = registry
            .iter()
            .map(|(_, toolchain)| Probe {
                name: toolchain.name.clone(),
                command: toolchain.probe_command(),
            })
            .collect();

        let working_dir = std::env::temp_dir();
        let env = vec![
            ("PATH".to_owned(), config.child_path()),
            ("HOME".to_owned(), working_dir.display().to_string()),
        ];

        Self {
            probes,
            env,
            working_dir,
            timeout: config.probe_timeout(),
            backend,
        }
    }

    /// Run every version query concurrently and collect the results
    #[instrument(skip(self), fields(toolchains = self.probes.len()))]
    pub async fn check(&self) -> HealthReport {
        let results = join_all(self.probes.iter().map(|probe| self.check_one(probe))).await;

        // Decided before keying by name, so no probe result can be shadowed
        let status = if results.iter().all(|health| health.available) {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        };

        let toolchains: BTreeMap<_, _> = self
            .probes
            .iter()
            .map(|probe| probe.name.clone())
            .zip(results)
            .collect();

        debug!(?status, "health check complete");

        HealthReport {
            status,
            toolchains,
            timestamp: Utc::now(),
        }
    }

    async fn check_one(&self, probe: &Probe) -> ToolchainHealth {
        let limits = StepLimits::unset()
            .with_wall_time_limit(self.timeout.as_secs_f64())
            .with_max_output(PROBE_MAX_OUTPUT);
        let command = StepCommand::new(probe.command.clone(), &self.working_dir)
            .envs(self.env.iter().cloned())
            .limits(limits);

        match self.backend.run(command).await {
            Ok(result) if result.is_success() => {
                let version = first_line(&result.stdout_lossy())
                    .or_else(|| first_line(&result.stderr_lossy()));
                ToolchainHealth {
                    available: true,
                    version,
                }
            }
            Ok(result) => {
                debug!(toolchain = %probe.name, status = ?result.status, "version query failed");
                ToolchainHealth {
                    available: false,
                    version: None,
                }
            }
            Err(error) => {
                debug!(toolchain = %probe.name, %error, "version query could not start");
                ToolchainHealth {
                    available: false,
                    version: None,
                }
            }
        }
    }
}

fn first_line(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_owned)
}
