//! Build commands and results.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{BuildId, CommitHash};

/// An external program and its arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub program: String,
    pub args: Vec<String>,
}

impl Command {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// The same command with one more trailing argument.
    pub fn with_arg(&self, arg: impl Into<String>) -> Self {
        let mut cmd = self.clone();
        cmd.args.push(arg.into());
        cmd
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Outcome of one build, produced by the executor and handed back to the
/// watcher that asked for it.
#[derive(Debug, Clone)]
pub struct BuildResult {
    pub id: BuildId,
    pub branch: String,
    /// True when every pipeline step succeeded.
    pub passed: bool,
    /// Commit the working tree was on after sync, or the invalid sentinel.
    pub hash: CommitHash,
    /// Combined output of the pipeline steps that ran, in order.
    pub output: Bytes,
    /// Output persistence and post-processing both succeeded.
    pub post_success: bool,
    pub post_output: Bytes,
    pub finished_at: DateTime<Utc>,
}

impl BuildResult {
    pub fn verdict(&self) -> &'static str {
        if self.passed { "passed" } else { "failed" }
    }
}
