use execbox::runner::{ExecutionRequest, Runner, ValidationError};
use execbox::types::StepLimits;
use execbox::workspace::{WORKSPACE_PREFIX, Workspace, WorkspacePool};
use execbox::ExecuteError;

use super::{leftover_entries, sh_config};

#[tokio::test]
async fn workspace_removed_after_success() {
    let root = tempfile::tempdir().unwrap();
    let runner = Runner::new(sh_config(root.path())).unwrap();

    let result = runner
        .execute(&ExecutionRequest::new("python", "echo hi > artifact.txt; echo done"))
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(leftover_entries(root.path()), 0);
}

#[tokio::test]
async fn workspace_removed_after_runtime_error() {
    let root = tempfile::tempdir().unwrap();
    let runner = Runner::new(sh_config(root.path())).unwrap();

    let result = runner
        .execute(&ExecutionRequest::new("python", "mkdir -p deep/tree; exit 1"))
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(leftover_entries(root.path()), 0);
}

#[tokio::test]
async fn workspace_removed_after_timeout() {
    let root = tempfile::tempdir().unwrap();
    let runner = Runner::new(sh_config(root.path())).unwrap();

    let request = ExecutionRequest::new("python", "touch partial; while :; do :; done")
        .with_limits(StepLimits::unset().with_wall_time_limit(0.5));
    let result = runner.execute(&request).await.unwrap();

    assert!(!result.success);
    assert_eq!(leftover_entries(root.path()), 0);
}

#[tokio::test]
async fn unsupported_language_creates_no_workspace() {
    let parent = tempfile::tempdir().unwrap();
    let root = parent.path().join("workspaces");
    let runner = Runner::new(sh_config(&root)).unwrap();

    let err = runner
        .execute(&ExecutionRequest::new("rust", "fn main() {}"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ExecuteError::Validation(ValidationError::UnsupportedLanguage(ref lang)) if lang == "rust"
    ));
    assert!(!root.exists());
}

#[tokio::test]
async fn missing_fields_create_no_workspace() {
    let parent = tempfile::tempdir().unwrap();
    let root = parent.path().join("workspaces");
    let runner = Runner::new(sh_config(&root)).unwrap();

    let err = runner
        .execute(&ExecutionRequest::new("python", ""))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ExecuteError::Validation(ValidationError::MissingFields)
    ));
    assert!(!root.exists());
}

#[tokio::test]
async fn cancelled_execution_still_cleans_up() {
    let root = tempfile::tempdir().unwrap();
    let runner = Runner::new(sh_config(root.path())).unwrap();

    let request = ExecutionRequest::new("python", "sleep 30");
    let cancelled = tokio::time::timeout(
        std::time::Duration::from_millis(300),
        runner.execute(&request),
    )
    .await;

    assert!(cancelled.is_err());
    assert_eq!(leftover_entries(root.path()), 0);
    assert_eq!(runner.pool().available(), runner.pool().capacity());
}

#[tokio::test]
async fn pool_hands_out_distinct_workspaces() {
    let root = tempfile::tempdir().unwrap();
    let pool = WorkspacePool::new(root.path(), 4);

    let mut workspaces = Vec::new();
    for _ in 0..4 {
        workspaces.push(pool.acquire().await.unwrap());
    }

    let mut ids: Vec<_> = workspaces.iter().map(|w| w.id().to_owned()).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 4);
    assert!(ids.iter().all(|id| id.starts_with(WORKSPACE_PREFIX)));

    for workspace in workspaces {
        workspace.release().await;
    }
    assert_eq!(leftover_entries(root.path()), 0);
}

#[tokio::test]
async fn workspace_rejects_traversal() {
    let root = tempfile::tempdir().unwrap();
    let workspace = Workspace::create(root.path()).await.unwrap();

    assert!(workspace.write_file("../escape.txt", b"x").await.is_err());
    assert!(!root.path().join("escape.txt").exists());

    workspace.release().await;
}
