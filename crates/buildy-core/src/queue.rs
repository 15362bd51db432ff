//! The build queue between watchers and the executor.
//!
//! Every watcher holds a clone of [`BuildQueue`]; the executor owns the single
//! [`BuildInbox`]. Each request carries its own one-shot reply slot, and
//! [`BuildRequest::respond`] consumes the request, so a request can be answered
//! at most once.

use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

use crate::{BuildId, BuildResult, Error, Result};

/// A request to build the head of a branch.
#[derive(Debug)]
pub struct BuildRequest {
    id: BuildId,
    branch: String,
    reply: oneshot::Sender<BuildResult>,
}

impl BuildRequest {
    pub fn new(branch: impl Into<String>) -> (Self, PendingBuild) {
        let (reply, rx) = oneshot::channel();
        let id = BuildId::new();
        let request = Self {
            id,
            branch: branch.into(),
            reply,
        };
        (request, PendingBuild { id, rx })
    }

    pub fn id(&self) -> BuildId {
        self.id
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    /// Deliver the result. Gives the result back if the requester is gone.
    pub fn respond(self, result: BuildResult) -> std::result::Result<(), BuildResult> {
        self.reply.send(result)
    }
}

/// The requester's side of an accepted build.
#[derive(Debug)]
pub struct PendingBuild {
    id: BuildId,
    rx: oneshot::Receiver<BuildResult>,
}

impl PendingBuild {
    pub fn id(&self) -> BuildId {
        self.id
    }

    pub async fn wait(self) -> Result<BuildResult> {
        self.rx
            .await
            .map_err(|_| Error::ResultDropped(self.id.to_string()))
    }
}

/// Create a queue holding at most `capacity` requests the executor has not
/// picked up yet.
pub fn build_queue(capacity: usize) -> (BuildQueue, BuildInbox) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (BuildQueue { tx }, BuildInbox { rx })
}

/// Sending side, cloned into every watcher.
#[derive(Debug, Clone)]
pub struct BuildQueue {
    tx: mpsc::Sender<BuildRequest>,
}

impl BuildQueue {
    /// Enqueue a build. Waits while the queue is full.
    pub async fn submit(&self, branch: &str) -> Result<PendingBuild> {
        let (request, pending) = BuildRequest::new(branch);
        self.tx.send(request).await.map_err(|_| Error::QueueClosed)?;
        Ok(pending)
    }

    /// Enqueue a build and wait for its result, both under one deadline.
    pub async fn build(&self, branch: &str, deadline: Duration) -> Result<BuildResult> {
        let run = async { self.submit(branch).await?.wait().await };
        tokio::time::timeout(deadline, run).await.map_err(|_| {
            Error::Timeout(format!(
                "no build result for {} within {}s",
                branch,
                deadline.as_secs()
            ))
        })?
    }
}

/// Receiving side, owned by the executor.
#[derive(Debug)]
pub struct BuildInbox {
    rx: mpsc::Receiver<BuildRequest>,
}

impl BuildInbox {
    /// Next request in arrival order. `None` once every queue handle is gone.
    pub async fn recv(&mut self) -> Option<BuildRequest> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<BuildRequest> {
        self.rx.try_recv().ok()
    }
}
