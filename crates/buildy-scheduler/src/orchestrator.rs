//! Orchestrator - wires the watchers to the executor.

use buildy_config::Config;
use buildy_core::{Notifier, build_queue};
use buildy_executor::BuildExecutor;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use crate::github::{CommitFeed, WatchTarget};
use crate::watcher::{BranchWatcher, WatchError, WatchState};

/// Requests the executor has not yet picked up. Watchers beyond this wait in
/// `send`, which still counts against their build-wait deadline.
const QUEUE_CAPACITY: usize = 1;

/// Runs one watcher per configured branch against a single executor.
pub struct Orchestrator {
    states: Vec<WatchState>,
    executor: BuildExecutor,
    feed: Arc<dyn CommitFeed>,
    notifier: Arc<dyn Notifier>,
    build_wait: Duration,
}

impl Orchestrator {
    pub fn new(
        config: &Config,
        executor: BuildExecutor,
        feed: Arc<dyn CommitFeed>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let states = config
            .branches
            .iter()
            .map(|branch| {
                let target = WatchTarget {
                    owner: config.source.owner.clone(),
                    repo: config.source.repo.clone(),
                    branch: branch.clone(),
                    token: config.source.token.clone(),
                };
                WatchState::new(target, config.poll.interval)
            })
            .collect();

        Self {
            states,
            executor,
            feed,
            notifier,
            build_wait: config.build_wait,
        }
    }

    /// Run until every watcher has stopped. Returns the error that stopped
    /// each of them, in branch order.
    pub async fn run(self) -> Vec<WatchError> {
        let (queue, inbox) = build_queue(QUEUE_CAPACITY);

        let executor = tokio::spawn(self.executor.run(inbox));

        info!(branches = self.states.len(), "Starting watchers");
        let watchers = self.states.into_iter().map(|state| {
            let watcher = BranchWatcher::new(
                state,
                self.feed.clone(),
                queue.clone(),
                self.notifier.clone(),
                self.build_wait,
            );
            tokio::spawn(watcher.run())
        });
        let finished = futures::future::join_all(watchers).await;

        // Closing the last queue handle lets the executor finish.
        drop(queue);
        if let Err(e) = executor.await {
            error!(error = %e, "Executor task failed");
        }

        let mut errors = Vec::new();
        for outcome in finished {
            match outcome {
                Ok(e) => errors.push(e),
                Err(e) => error!(error = %e, "Watcher task failed"),
            }
        }

        info!(stopped = errors.len(), "All watchers stopped");
        errors
    }
}
