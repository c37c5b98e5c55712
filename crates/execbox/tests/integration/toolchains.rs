//! Tests against the real toolchains from the example configuration.
//!
//! These need python3, gcc, g++, a JDK and node on PATH.

use std::path::PathBuf;

use execbox::config::{Config, EXAMPLE_CONFIG};
use execbox::runner::{ExecutionRequest, Runner};
use execbox::{HealthProbe, StepStatus};

use super::leftover_entries;

fn fixture(name: &str) -> String {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures/sources")
        .join(name);
    std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()))
}

fn runner(root: &std::path::Path) -> Runner {
    let mut config = Config::parse_toml(EXAMPLE_CONFIG).unwrap();
    config.workspace_root = Some(root.to_path_buf());
    Runner::new(config).unwrap()
}

#[tokio::test]
async fn python_prints() {
    let root = tempfile::tempdir().unwrap();
    let result = runner(root.path())
        .execute(&ExecutionRequest::new("python", fixture("hello.py")))
        .await
        .unwrap();

    assert!(result.success, "stderr: {}", result.stderr);
    assert_eq!(result.output, "4");
    assert_eq!(leftover_entries(root.path()), 0);
}

#[tokio::test]
async fn python_reads_stdin() {
    let root = tempfile::tempdir().unwrap();
    let request =
        ExecutionRequest::new("py", fixture("echo_input.py")).with_stdin("hello\n");
    let result = runner(root.path()).execute(&request).await.unwrap();

    assert!(result.success, "stderr: {}", result.stderr);
    assert_eq!(result.stdout, "Hello, hello!\n");
}

#[tokio::test]
async fn python_exception_is_reported() {
    let root = tempfile::tempdir().unwrap();
    let result = runner(root.path())
        .execute(&ExecutionRequest::new("python", "raise ValueError('boom')"))
        .await
        .unwrap();

    assert!(!result.success);
    assert!(result.stderr.contains("ValueError: boom"));
    assert_eq!(result.run.unwrap().status, StepStatus::RuntimeError);
}

#[tokio::test]
async fn c_hello_world() {
    let root = tempfile::tempdir().unwrap();
    let result = runner(root.path())
        .execute(&ExecutionRequest::new("c", fixture("hello.c")))
        .await
        .unwrap();

    assert!(result.success, "stderr: {}", result.stderr);
    assert_eq!(result.output, "Hello from C");
    assert!(result.compile.unwrap().is_success());
    assert_eq!(leftover_entries(root.path()), 0);
}

#[tokio::test]
async fn c_syntax_error_skips_run() {
    let root = tempfile::tempdir().unwrap();
    let result = runner(root.path())
        .execute(&ExecutionRequest::new("c", fixture("syntax_error.c")))
        .await
        .unwrap();

    assert!(!result.success);
    assert!(!result.stderr.is_empty());
    assert!(result.run.is_none());
    assert_eq!(leftover_entries(root.path()), 0);
}

#[tokio::test]
async fn cpp_hello_world() {
    let root = tempfile::tempdir().unwrap();
    let result = runner(root.path())
        .execute(&ExecutionRequest::new("c++", fixture("hello.cpp")))
        .await
        .unwrap();

    assert!(result.success, "stderr: {}", result.stderr);
    assert_eq!(result.output, "Hello from C++ 6");
}

#[tokio::test]
async fn java_hello_world() {
    let root = tempfile::tempdir().unwrap();
    let result = runner(root.path())
        .execute(&ExecutionRequest::new("java", fixture("Main.java")))
        .await
        .unwrap();

    assert!(result.success, "stderr: {}", result.stderr);
    assert_eq!(result.output, "Hello from Java");
}

#[tokio::test]
async fn javascript_hello_world() {
    let root = tempfile::tempdir().unwrap();
    let result = runner(root.path())
        .execute(&ExecutionRequest::new("js", fixture("hello.js")))
        .await
        .unwrap();

    assert!(result.success, "stderr: {}", result.stderr);
    assert_eq!(result.output, "Hello from JavaScript");
}

#[tokio::test]
async fn all_toolchains_report_healthy() {
    let root = tempfile::tempdir().unwrap();
    let runner = runner(root.path());
    let report = HealthProbe::new(runner.config(), runner.registry())
        .check()
        .await;

    assert!(report.is_healthy(), "{:?}", report.toolchains);
    for (name, health) in &report.toolchains {
        assert!(health.version.is_some(), "{name} has no version");
    }
}
