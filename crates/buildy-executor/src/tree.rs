//! The shared working tree.

use async_trait::async_trait;
use buildy_core::{Command, CommitHash};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::process::{StepStatus, run_step};

/// Working tree operation errors.
#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    #[error("'{command}' failed: {output}")]
    CommandFailed { command: String, output: String },

    #[error("'{command}' timed out after {secs}s")]
    Timeout { command: String, secs: u64 },

    #[error("could not read a commit hash from: {0}")]
    UnparsableHash(String),
}

/// The one checkout all builds run in. Only the executor holds it.
#[async_trait]
pub trait WorkingTree: Send + Sync {
    /// Directory the pipeline runs in.
    fn path(&self) -> &Path;

    /// Switch to `branch` and update it to its latest state. Returns the
    /// combined output of the source-control commands.
    async fn sync(&mut self, branch: &str) -> Result<Vec<u8>, TreeError>;

    /// Commit currently checked out.
    async fn head(&self) -> Result<CommitHash, TreeError>;
}

/// A git checkout driven through the `git` command line.
pub struct GitWorkingTree {
    path: PathBuf,
    timeout: Duration,
}

impl GitWorkingTree {
    pub fn new(path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            path: path.into(),
            timeout,
        }
    }

    async fn git(&self, args: &[&str]) -> Result<Vec<u8>, TreeError> {
        let command = Command::new("git", args.iter().copied());
        let step = run_step(&command, &self.path, self.timeout).await;

        match step.status {
            StepStatus::Succeeded => Ok(step.output),
            StepStatus::TimedOut => Err(TreeError::Timeout {
                command: command.to_string(),
                secs: self.timeout.as_secs(),
            }),
            StepStatus::Failed { .. } | StepStatus::SpawnFailed => {
                Err(TreeError::CommandFailed {
                    command: command.to_string(),
                    output: String::from_utf8_lossy(&step.output).trim().to_string(),
                })
            }
        }
    }
}

#[async_trait]
impl WorkingTree for GitWorkingTree {
    fn path(&self) -> &Path {
        &self.path
    }

    async fn sync(&mut self, branch: &str) -> Result<Vec<u8>, TreeError> {
        info!(path = %self.path.display(), branch = %branch, "Syncing working tree");

        let mut output = self.git(&["checkout", branch]).await?;
        output.extend(self.git(&["pull", "--ff-only"]).await?);

        debug!(branch = %branch, "Working tree up to date");
        Ok(output)
    }

    async fn head(&self) -> Result<CommitHash, TreeError> {
        let output = self.git(&["rev-parse", "HEAD"]).await?;
        let raw = String::from_utf8_lossy(&output);
        CommitHash::parse(&raw).ok_or_else(|| {
            warn!(output = %raw.trim(), "Unexpected rev-parse output");
            TreeError::UnparsableHash(raw.trim().to_string())
        })
    }
}
