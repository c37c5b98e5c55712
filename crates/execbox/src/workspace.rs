//! Workspace lifecycle management
//!
//! Each execution gets its own freshly created directory, which is removed
//! when the execution ends.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, instrument, warn};

/// Prefix of every workspace directory name
pub const WORKSPACE_PREFIX: &str = "execbox-";

/// Errors that occur while managing workspaces
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("failed to create workspace under {root}: {source}")]
    CreateFailed {
        root: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("workspace pool is closed")]
    PoolClosed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A single-use directory owned by one execution
///
/// # Cleanup
///
/// Call [`release()`](Self::release) when done. Dropping an unreleased
/// workspace still deletes the directory, but does so synchronously on the
/// current thread and logs a warning.
#[derive(Debug)]
pub struct Workspace {
    /// Directory handle, `None` once released
    dir: Option<TempDir>,

    /// Path to the workspace directory
    path: PathBuf,

    /// Pool permit (if acquired from a pool)
    _permit: Option<OwnedSemaphorePermit>,
}

impl Workspace {
    /// Create a workspace directory under `root`
    ///
    /// The directory name carries a random suffix and is created exclusively,
    /// so concurrent calls never hand out the same directory.
    #[instrument]
    pub async fn create(root: &Path) -> Result<Self, WorkspaceError> {
        let root = root.to_path_buf();
        let dir = tokio::task::spawn_blocking({
            let root = root.clone();
            move || {
                // Programs are resolved against the workspace, so it must not be relative
                let root = std::path::absolute(&root)?;
                std::fs::create_dir_all(&root)?;
                tempfile::Builder::new()
                    .prefix(WORKSPACE_PREFIX)
                    .tempdir_in(&root)
            }
        })
        .await
        .map_err(|e| WorkspaceError::Io(std::io::Error::other(e)))?
        .map_err(|source| WorkspaceError::CreateFailed { root, source })?;

        let path = dir.path().to_path_buf();
        debug!(?path, "workspace created");

        Ok(Self {
            dir: Some(dir),
            path,
            _permit: None,
        })
    }

    /// Directory name, unique among live workspaces
    pub fn id(&self) -> &str {
        self.path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default()
    }

    /// Get the path to the workspace directory
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the path to a file inside the workspace
    ///
    /// Returns an error if the path contains path traversal attempts.
    pub fn file_path(&self, name: &str) -> Result<PathBuf, WorkspaceError> {
        if name.is_empty() || name.contains("..") || name.starts_with('/') {
            return Err(WorkspaceError::InvalidPath(format!(
                "path traversal not allowed: {name}"
            )));
        }
        Ok(self.path.join(name))
    }

    /// Write a file into the workspace
    #[instrument(skip(self, content), fields(workspace = self.id()))]
    pub async fn write_file(&self, name: &str, content: &[u8]) -> Result<(), WorkspaceError> {
        let path = self.file_path(name)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::write(&path, content).await?;
        debug!(?path, len = content.len(), "wrote file to workspace");
        Ok(())
    }

    /// Read a file from the workspace
    pub async fn read_file(&self, name: &str) -> Result<Vec<u8>, WorkspaceError> {
        let path = self.file_path(name)?;
        Ok(tokio::fs::read(&path).await?)
    }

    /// Check if a file exists in the workspace
    pub async fn file_exists(&self, name: &str) -> Result<bool, WorkspaceError> {
        let path = self.file_path(name)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }

    /// Remove the workspace directory
    ///
    /// Deletion errors are logged and swallowed so they never mask the result
    /// of the execution that used the workspace.
    #[instrument(skip(self), fields(workspace = self.id()))]
    pub async fn release(mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };

        let path = self.path.clone();
        match tokio::task::spawn_blocking(move || dir.close()).await {
            Ok(Ok(())) => debug!(?path, "workspace removed"),
            Ok(Err(error)) => warn!(?path, %error, "failed to remove workspace"),
            Err(error) => warn!(?path, %error, "workspace removal task failed"),
        }
    }

    /// Attach a pool permit to this workspace
    pub(crate) fn with_permit(mut self, permit: OwnedSemaphorePermit) -> Self {
        self._permit = Some(permit);
        self
    }

    /// Check if the workspace is still live (not yet released)
    pub fn is_live(&self) -> bool {
        self.dir.is_some()
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            warn!(
                path = %self.path.display(),
                "Workspace dropped without release, removing it synchronously"
            );
            if let Err(error) = dir.close() {
                warn!(path = %self.path.display(), %error, "failed to remove workspace");
            }
        }
    }
}

/// Pool that bounds how many workspaces exist at once
///
/// Acquiring waits for a free slot, which caps the number of concurrent
/// executions (and so the number of live process groups).
#[derive(Debug)]
pub struct WorkspacePool {
    /// Directory workspaces are created in
    root: PathBuf,

    /// Number of workspaces that may exist at once
    capacity: usize,

    /// Semaphore to limit concurrent workspaces
    semaphore: Arc<Semaphore>,
}

impl WorkspacePool {
    /// Create a new workspace pool
    pub fn new(root: impl Into<PathBuf>, capacity: usize) -> Self {
        Self {
            root: root.into(),
            capacity,
            semaphore: Arc::new(Semaphore::new(capacity)),
        }
    }

    /// Acquire a workspace from the pool
    #[instrument(skip(self))]
    pub async fn acquire(&self) -> Result<Workspace, WorkspaceError> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| WorkspaceError::PoolClosed)?;

        let workspace = Workspace::create(&self.root).await?;
        debug!(id = workspace.id(), "acquired workspace from pool");

        Ok(workspace.with_permit(permit))
    }

    /// Directory workspaces are created in
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the number of free slots
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Get the total number of slots in the pool
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
