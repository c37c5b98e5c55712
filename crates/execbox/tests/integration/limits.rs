use std::time::{Duration, Instant};

use execbox::runner::{ExecutionRequest, Runner};
use execbox::types::{OUTPUT_TRUNCATED_MARKER, StepLimits, StepStatus};

use super::{leftover_entries, sh_config};

/// Whether a pid is gone or only a zombie waiting to be reaped
fn process_is_dead(pid: u32) -> bool {
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        Err(_) => true,
        // State is the first field after the parenthesised command name
        Ok(stat) => stat
            .rsplit_once(')')
            .map(|(_, rest)| rest.trim_start().starts_with('Z'))
            .unwrap_or(false),
    }
}

async fn wait_until_dead(pid: u32) -> bool {
    for _ in 0..40 {
        if process_is_dead(pid) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

#[tokio::test]
async fn infinite_loop_times_out() {
    let root = tempfile::tempdir().unwrap();
    let runner = Runner::new(sh_config(root.path())).unwrap();

    let started = Instant::now();
    let request = ExecutionRequest::new("python", "while :; do :; done")
        .with_limits(StepLimits::unset().with_wall_time_limit(1.0));
    let result = runner.execute(&request).await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(4));
    assert!(!result.success);
    assert!(result.stderr.contains("Time limit exceeded"));

    let run = result.run.unwrap();
    assert_eq!(run.status, StepStatus::TimeLimitExceeded);
    assert!(run.wall_time >= 1.0);
}

#[tokio::test]
async fn timeout_leaves_no_surviving_children() {
    let root = tempfile::tempdir().unwrap();
    let runner = Runner::new(sh_config(root.path())).unwrap();

    let request = ExecutionRequest::new("python", "sleep 60 & echo $!; wait")
        .with_limits(StepLimits::unset().with_wall_time_limit(0.5));
    let result = runner.execute(&request).await.unwrap();

    assert_eq!(
        result.run.as_ref().unwrap().status,
        StepStatus::TimeLimitExceeded
    );
    let pid: u32 = result.stdout.trim().parse().unwrap();
    assert!(wait_until_dead(pid).await, "background child {pid} survived");
    assert_eq!(leftover_entries(root.path()), 0);
}

#[tokio::test]
async fn normal_exit_leaves_no_surviving_children() {
    let root = tempfile::tempdir().unwrap();
    let runner = Runner::new(sh_config(root.path())).unwrap();

    let started = Instant::now();
    let result = runner
        .execute(&ExecutionRequest::new("python", "sleep 60 & echo $!"))
        .await
        .unwrap();

    assert!(result.success);
    assert!(started.elapsed() < Duration::from_secs(4));
    let pid: u32 = result.stdout.trim().parse().unwrap();
    assert!(wait_until_dead(pid).await, "background child {pid} survived");
}

#[tokio::test]
async fn unbounded_output_is_truncated() {
    let root = tempfile::tempdir().unwrap();
    let runner = Runner::new(sh_config(root.path())).unwrap();

    let request = ExecutionRequest::new("python", "yes flood").with_limits(
        StepLimits::unset()
            .with_wall_time_limit(5.0)
            .with_max_output(4 * StepLimits::KIB),
    );
    let result = runner.execute(&request).await.unwrap();

    assert!(!result.success);
    assert!(result.stdout.ends_with(OUTPUT_TRUNCATED_MARKER));
    assert!(result.stdout.len() <= 4096 + OUTPUT_TRUNCATED_MARKER.len());
    assert_eq!(
        result.run.unwrap().status,
        StepStatus::OutputLimitExceeded
    );
    assert_eq!(leftover_entries(root.path()), 0);
}

#[tokio::test]
async fn toolchain_limits_apply_without_overrides() {
    let root = tempfile::tempdir().unwrap();
    let mut config = sh_config(root.path());
    config.default_limits = StepLimits::unset()
        .with_wall_time_limit(0.5)
        .with_max_output(1024);
    let runner = Runner::new(config).unwrap();

    let result = runner
        .execute(&ExecutionRequest::new("python", "sleep 5"))
        .await
        .unwrap();

    assert_eq!(
        result.run.unwrap().status,
        StepStatus::TimeLimitExceeded
    );
}
