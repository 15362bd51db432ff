//! Test doubles shared by the watcher and orchestrator tests.

use async_trait::async_trait;
use buildy_core::{BuildNotice, CommitHash, CommitMetadata, Notifier, NotifyError, Secret};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::github::{CommitFeed, FeedError, FeedResponse, WatchTarget};

pub const SHA: &str = "9fceb02d0ae598e95dc970b74767f19372d61af8";

pub fn target(branch: &str) -> WatchTarget {
    WatchTarget {
        owner: "acme".to_string(),
        repo: "widgets".to_string(),
        branch: branch.to_string(),
        token: Secret::new("ghp_test"),
    }
}

pub fn changed(marker: Option<&str>) -> Result<FeedResponse, FeedError> {
    Ok(FeedResponse::Changed {
        commits: vec![metadata()],
        marker: marker.map(str::to_string),
    })
}

pub fn metadata() -> CommitMetadata {
    CommitMetadata {
        hash: SHA.to_string(),
        web_url: format!("https://github.com/acme/widgets/commit/{}", SHA),
    }
}

/// Replays a fixed script of poll responses per branch. Once a branch's
/// script runs out every further poll fails with a 410.
#[derive(Default)]
pub struct ScriptedFeed {
    scripts: Mutex<HashMap<String, VecDeque<Result<FeedResponse, FeedError>>>>,
    /// Marker passed on every `latest` call, in order.
    pub markers_seen: Mutex<Vec<Option<String>>>,
    pub commit_lookups: Mutex<Vec<String>>,
    pub fail_commit_lookup: bool,
}

impl ScriptedFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(
        self,
        branch: &str,
        responses: Vec<Result<FeedResponse, FeedError>>,
    ) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(branch.to_string(), responses.into());
        self
    }
}

#[async_trait]
impl CommitFeed for ScriptedFeed {
    async fn latest(
        &self,
        target: &WatchTarget,
        marker: Option<&str>,
    ) -> Result<FeedResponse, FeedError> {
        self.markers_seen
            .lock()
            .unwrap()
            .push(marker.map(str::to_string));

        self.scripts
            .lock()
            .unwrap()
            .get_mut(&target.branch)
            .and_then(|script| script.pop_front())
            .unwrap_or(Err(FeedError::UnexpectedStatus {
                status: 410,
                body: "script exhausted".to_string(),
            }))
    }

    async fn commit(
        &self,
        _target: &WatchTarget,
        hash: &CommitHash,
    ) -> Result<CommitMetadata, FeedError> {
        self.commit_lookups.lock().unwrap().push(hash.to_string());
        if self.fail_commit_lookup {
            return Err(FeedError::Request("connection reset".to_string()));
        }
        Ok(CommitMetadata {
            hash: hash.to_string(),
            web_url: format!("https://github.com/acme/widgets/commit/{}", hash),
        })
    }
}

/// What a notifier was handed, flattened so tests can compare it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivered {
    pub branch: String,
    pub passed: bool,
    pub commit_url: Option<String>,
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub delivered: Mutex<Vec<Delivered>>,
    pub fail: bool,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn notify(&self, notice: BuildNotice<'_>) -> Result<(), NotifyError> {
        self.delivered.lock().unwrap().push(Delivered {
            branch: notice.branch.to_string(),
            passed: notice.result.passed,
            commit_url: notice.commit.map(|c| c.web_url.clone()),
        });
        if self.fail {
            return Err(NotifyError::Rejected {
                status: 401,
                body: "Forbidden".to_string(),
            });
        }
        Ok(())
    }
}
