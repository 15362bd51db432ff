//! The notification seam.
//!
//! A notifier turns a finished build into a delivered message. Delivery is
//! best effort: the watcher logs a failure and moves on.

use async_trait::async_trait;
use thiserror::Error;

use crate::{BuildResult, CommitMetadata};

/// Everything a notifier gets to see about one finished build.
#[derive(Debug, Clone, Copy)]
pub struct BuildNotice<'a> {
    pub branch: &'a str,
    pub result: &'a BuildResult,
    /// Absent when the commit could not be looked up.
    pub commit: Option<&'a CommitMetadata>,
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("relay rejected message with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("timeout: {0}")]
    Timeout(String),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Name used in log lines.
    fn name(&self) -> &'static str;

    async fn notify(&self, notice: BuildNotice<'_>) -> Result<(), NotifyError>;
}
