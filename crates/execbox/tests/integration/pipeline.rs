use std::path::Path;
use std::sync::Arc;

use execbox::runner::{ExecuteError, ExecutionRequest, Runner};
use execbox::types::StepStatus;
use execbox::Language;

use super::{RecordingBackend, leftover_entries, sh_config};

#[tokio::test]
async fn interpreted_language_skips_compilation() {
    let root = tempfile::tempdir().unwrap();
    let runner =
        Runner::with_backend(sh_config(root.path()), RecordingBackend::default()).unwrap();

    let result = runner
        .execute(&ExecutionRequest::new("python", "echo $((2 + 2))"))
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.language, Language::Python);
    assert!(result.stdout.contains('4'));
    assert!(result.compile.is_none());

    let steps = runner.backend().steps();
    assert_eq!(steps.len(), 1);
    assert!(steps[0][0].ends_with("sh"));
    assert!(steps[0][1].ends_with("script.sh"));
}

#[tokio::test]
async fn compiled_language_compiles_then_runs() {
    let root = tempfile::tempdir().unwrap();
    let runner =
        Runner::with_backend(sh_config(root.path()), RecordingBackend::default()).unwrap();

    let result = runner
        .execute(&ExecutionRequest::new("c", "echo compiled and ran"))
        .await
        .unwrap();

    assert!(result.success, "stderr: {}", result.stderr);
    assert_eq!(result.output, "compiled and ran");
    assert_eq!(result.compile.as_ref().unwrap().status, StepStatus::Ok);
    assert_eq!(result.run.as_ref().unwrap().status, StepStatus::Ok);
    assert_eq!(runner.backend().steps().len(), 2);
}

#[tokio::test]
async fn compile_failure_never_runs() {
    let root = tempfile::tempdir().unwrap();
    let runner =
        Runner::with_backend(sh_config(root.path()), RecordingBackend::default()).unwrap();

    let result = runner
        .execute(&ExecutionRequest::new("c", "echo BROKEN"))
        .await
        .unwrap();

    assert!(!result.success);
    assert!(result.stderr.contains("error"));
    assert!(result.run.is_none());
    assert_eq!(
        result.compile.as_ref().unwrap().status,
        StepStatus::RuntimeError
    );
    assert_eq!(runner.backend().steps().len(), 1);
    assert_eq!(leftover_entries(root.path()), 0);
}

#[tokio::test]
async fn missing_artifact_is_an_error() {
    let root = tempfile::tempdir().unwrap();
    let runner = Runner::new(sh_config(root.path())).unwrap();

    let err = runner
        .execute(&ExecutionRequest::new("java", "class Main {}"))
        .await
        .unwrap_err();

    assert!(matches!(err, ExecuteError::ArtifactMissing(ref name) if name == "Main.class"));
    assert!(!err.is_validation());
    assert_eq!(leftover_entries(root.path()), 0);
}

#[tokio::test]
async fn stdin_reaches_the_program() {
    let root = tempfile::tempdir().unwrap();
    let runner = Runner::new(sh_config(root.path())).unwrap();

    let request = ExecutionRequest::new("python", "read line; echo \"you said $line\"")
        .with_stdin("hello");
    let result = runner.execute(&request).await.unwrap();

    assert!(result.success);
    assert!(result.stdout.contains("hello"));
}

#[tokio::test]
async fn runtime_error_is_a_result() {
    let root = tempfile::tempdir().unwrap();
    let runner = Runner::new(sh_config(root.path())).unwrap();

    let result = runner
        .execute(&ExecutionRequest::new("python", "echo before; exit 7"))
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.stdout, "before\n");
    let run = result.run.unwrap();
    assert_eq!(run.status, StepStatus::RuntimeError);
    assert_eq!(run.exit_code, Some(7));
}

#[tokio::test]
async fn program_runs_with_cleared_environment() {
    let root = tempfile::tempdir().unwrap();
    let runner = Runner::new(sh_config(root.path())).unwrap();

    let result = runner
        .execute(&ExecutionRequest::new(
            "python",
            "echo \"home=$HOME\"; pwd -P; env | cut -d= -f1 | sort | tr '\\n' ' '",
        ))
        .await
        .unwrap();

    assert!(result.success);
    let mut lines = result.stdout.lines();
    let home = lines.next().unwrap().trim_start_matches("home=").to_owned();
    let cwd = lines.next().unwrap();
    // HOME is the workspace the program runs in
    assert!(cwd.contains("execbox-"));
    assert_eq!(Path::new(&home).file_name(), Path::new(cwd).file_name());

    let vars = lines.next().unwrap_or_default();
    assert!(vars.contains("HOME"));
    assert!(vars.contains("PATH"));
    assert!(!vars.contains("CARGO"));
}

#[tokio::test]
async fn concurrent_requests_are_isolated() {
    let root = tempfile::tempdir().unwrap();
    let runner = Arc::new(Runner::new(sh_config(root.path())).unwrap());

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let runner = runner.clone();
            tokio::spawn(async move {
                let code = format!("echo marker-{i} > own.txt; sleep 0.2; cat own.txt; ls");
                let result = runner
                    .execute(&ExecutionRequest::new("python", code))
                    .await
                    .unwrap();
                (i, result)
            })
        })
        .collect();

    for handle in handles {
        let (i, result) = handle.await.unwrap();
        assert!(result.success);
        let lines: Vec<_> = result.stdout.lines().collect();
        assert_eq!(lines[0], format!("marker-{i}"));
        // Only this request's files are visible
        let mut files = lines[1..].to_vec();
        files.sort_unstable();
        assert_eq!(files, ["own.txt", "script.sh"]);
    }

    assert_eq!(leftover_entries(root.path()), 0);
}
