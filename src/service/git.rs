//! Git operations the lifecycle service depends on.
//!
//! The service only needs four operations on a clone; [`GitCli`] provides
//! them by shelling out to `git`. Tests substitute an in-memory fake.

use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::debug;

/// Errors raised by git operations.
#[derive(Debug, thiserror::Error)]
pub enum GitError {
    /// `git` could not be started.
    #[error("failed to run git {op}")]
    Spawn {
        /// Operation being attempted.
        op: &'static str,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// `git` exited unsuccessfully.
    #[error("git {op} failed in {}: {stderr}", path.display())]
    Failed {
        /// Operation being attempted.
        op: &'static str,
        /// Repository or destination path.
        path: PathBuf,
        /// Trimmed standard error output.
        stderr: String,
    },

    /// Removing a clone from disk failed.
    #[error("failed to remove {}", path.display())]
    Remove {
        /// Directory being removed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}

/// Clone management used by [`super::SessionService`].
#[async_trait]
pub trait Git: Send + Sync {
    /// Clones `remote` into `dest`.
    async fn clone_repo(&self, remote: &str, dest: &Path) -> Result<(), GitError>;

    /// Discards all local changes and untracked files in the clone at `path`.
    async fn reset(&self, path: &Path) -> Result<(), GitError>;

    /// Deletes the clone at `path`. Missing directories are not an error.
    async fn remove(&self, path: &Path) -> Result<(), GitError>;

    /// Returns `true` if `path` holds a usable repository.
    async fn is_valid(&self, path: &Path) -> bool;
}

/// [`Git`] implementation backed by the `git` binary.
#[derive(Debug, Clone)]
pub struct GitCli {
    program: PathBuf,
}

impl GitCli {
    /// Uses `git` from `PATH`.
    pub fn new() -> Self {
        Self {
            program: PathBuf::from("git"),
        }
    }

    /// Uses a specific git executable.
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn run(&self, op: &'static str, path: &Path, args: &[&str]) -> Result<(), GitError> {
        debug!(op, path = %path.display(), "running git");
        let output = Command::new(&self.program)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| GitError::Spawn { op, source })?;
        if output.status.success() {
            Ok(())
        } else {
            Err(GitError::Failed {
                op,
                path: path.to_path_buf(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new()
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[async_trait]
impl Git for GitCli {
    async fn clone_repo(&self, remote: &str, dest: &Path) -> Result<(), GitError> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| GitError::Spawn { op: "clone", source })?;
        }
        let dest_arg = path_arg(dest);
        self.run("clone", dest, &["clone", "--quiet", remote, &dest_arg])
            .await
    }

    async fn reset(&self, path: &Path) -> Result<(), GitError> {
        let dir = path_arg(path);
        self.run("reset", path, &["-C", &dir, "reset", "--hard", "--quiet", "HEAD"])
            .await?;
        self.run("clean", path, &["-C", &dir, "clean", "-fdxq"]).await
    }

    async fn remove(&self, path: &Path) -> Result<(), GitError> {
        match tokio::fs::remove_dir_all(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(GitError::Remove {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    async fn is_valid(&self, path: &Path) -> bool {
        if !path.is_dir() {
            return false;
        }
        let dir = path_arg(path);
        self.run("rev-parse", path, &["-C", &dir, "rev-parse", "--git-dir"])
            .await
            .is_ok()
    }
}
