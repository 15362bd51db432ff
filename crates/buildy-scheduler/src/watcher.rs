//! Per-branch watcher.

use buildy_core::{BuildNotice, BuildQueue, BuildResult, CommitHash, CommitMetadata, Notifier};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::github::{CommitFeed, FeedError, FeedResponse, WatchTarget};

/// Freshness marker from the last poll that saw a change.
///
/// It moves forward only when a changed response carries a new marker; an
/// unchanged response or an error leaves it alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollCursor(Option<String>);

impl PollCursor {
    pub fn new() -> Self {
        Self(None)
    }

    pub fn marker(&self) -> Option<&str> {
        self.0.as_deref()
    }

    fn advance(&mut self, marker: String) {
        self.0 = Some(marker);
    }
}

/// Everything one watcher owns.
#[derive(Debug, Clone)]
pub struct WatchState {
    pub target: WatchTarget,
    pub cursor: PollCursor,
    pub interval: Duration,
    /// A change was seen but its build was abandoned. The cursor has already
    /// moved past it, so the next tick builds again before polling.
    pub pending_build: bool,
}

impl WatchState {
    pub fn new(target: WatchTarget, interval: Duration) -> Self {
        Self {
            target,
            cursor: PollCursor::new(),
            interval,
            pending_build: false,
        }
    }
}

/// Errors that stop a watcher for good.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("polling branch {branch} failed: {source}")]
    Poll {
        branch: String,
        #[source]
        source: FeedError,
    },

    #[error("build queue for branch {branch} is closed")]
    QueueClosed { branch: String },
}

/// What one polling cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cycle {
    Unchanged,
    Built { passed: bool },
    /// A change was seen but no result came back in time; the next tick
    /// asks for the build again.
    BuildAbandoned,
    /// The poll itself ran out of time; the next tick tries again.
    PollTimedOut,
}

/// Polls one branch and drives a build-and-notify round for each change.
pub struct BranchWatcher {
    state: WatchState,
    feed: Arc<dyn CommitFeed>,
    queue: BuildQueue,
    notifier: Arc<dyn Notifier>,
    build_wait: Duration,
}

impl BranchWatcher {
    pub fn new(
        state: WatchState,
        feed: Arc<dyn CommitFeed>,
        queue: BuildQueue,
        notifier: Arc<dyn Notifier>,
        build_wait: Duration,
    ) -> Self {
        Self {
            state,
            feed,
            queue,
            notifier,
            build_wait,
        }
    }

    pub fn state(&self) -> &WatchState {
        &self.state
    }

    pub fn branch(&self) -> &str {
        &self.state.target.branch
    }

    /// Poll on a fixed cadence until a poll fails for a reason other than a
    /// timeout. Returns that error.
    pub async fn run(mut self) -> WatchError {
        info!(branch = %self.branch(), interval_secs = self.state.interval.as_secs(), "Starting polling");

        let mut ticker = tokio::time::interval(self.state.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            if let Err(e) = self.cycle().await {
                error!(branch = %self.branch(), error = %e, "Stopping watcher");
                return e;
            }
        }
    }

    /// Poll once and, on a change, build and notify. An abandoned build is
    /// retried in place of the poll.
    pub async fn cycle(&mut self) -> Result<Cycle, WatchError> {
        if self.state.pending_build {
            info!(branch = %self.branch(), "Retrying abandoned build");
            return self.build_and_notify().await;
        }

        match self.poll().await {
            Ok(false) => {
                debug!(branch = %self.branch(), "No change detected");
                Ok(Cycle::Unchanged)
            }
            Ok(true) => {
                info!(branch = %self.branch(), "Change detected");
                self.build_and_notify().await
            }
            Err(e) if e.is_timeout() => {
                warn!(branch = %self.branch(), error = %e, "Poll timed out, retrying next tick");
                Ok(Cycle::PollTimedOut)
            }
            Err(source) => Err(WatchError::Poll {
                branch: self.branch().to_string(),
                source,
            }),
        }
    }

    /// Conditionally read the branch. Returns whether it changed.
    pub async fn poll(&mut self) -> Result<bool, FeedError> {
        let response = self
            .feed
            .latest(&self.state.target, self.state.cursor.marker())
            .await?;

        match response {
            FeedResponse::Unchanged => Ok(false),
            FeedResponse::Changed { commits, marker } => {
                debug!(
                    branch = %self.branch(),
                    commits = ?commits.iter().map(|c| c.hash.as_str()).collect::<Vec<_>>(),
                    "Commits"
                );
                if let Some(marker) = marker {
                    debug!(branch = %self.branch(), marker = %marker, "Advancing poll cursor");
                    self.state.cursor.advance(marker);
                }
                Ok(true)
            }
        }
    }

    async fn build_and_notify(&mut self) -> Result<Cycle, WatchError> {
        let outcome = self.queue.build(self.branch(), self.build_wait).await;
        self.state.pending_build = outcome.is_err();
        let branch = self.branch();

        let result = match outcome {
            Ok(result) => result,
            Err(buildy_core::Error::QueueClosed) => {
                return Err(WatchError::QueueClosed {
                    branch: branch.to_string(),
                });
            }
            Err(e) => {
                warn!(branch = %branch, error = %e, "Build abandoned, retrying next tick");
                return Ok(Cycle::BuildAbandoned);
            }
        };

        log_result(&result);

        let commit = self.resolve_commit(&result.hash).await;
        let notice = BuildNotice {
            branch,
            result: &result,
            commit: commit.as_ref(),
        };
        if let Err(e) = self.notifier.notify(notice).await {
            warn!(branch = %branch, notifier = self.notifier.name(), error = %e, "Notification failed");
        }

        Ok(Cycle::Built {
            passed: result.passed,
        })
    }

    async fn resolve_commit(&self, hash: &CommitHash) -> Option<CommitMetadata> {
        if !hash.is_valid() {
            return None;
        }

        match self.feed.commit(&self.state.target, hash).await {
            Ok(commit) => Some(commit),
            Err(e) => {
                warn!(branch = %self.branch(), hash = %hash, error = %e, "Error getting commit");
                None
            }
        }
    }
}

fn log_result(result: &BuildResult) {
    info!(
        build_id = %result.id,
        branch = %result.branch,
        hash = %result.hash.short(),
        "Build {}",
        result.verdict()
    );
    debug!(branch = %result.branch, output = %String::from_utf8_lossy(&result.output), "Build output");
    if !result.post_output.is_empty() {
        info!(branch = %result.branch, post_output = %String::from_utf8_lossy(&result.post_output), "Post output");
    }
}
