//! Branch watching and build scheduling for buildy.
//!
//! One [`BranchWatcher`] per branch polls the commit feed and, on a change,
//! queues a build with the single executor and waits for its result. The
//! [`Orchestrator`] wires all of them together.

pub mod github;
pub mod orchestrator;
pub mod watcher;

#[cfg(test)]
pub(crate) mod testing;

pub use github::{CommitFeed, FeedError, FeedResponse, GitHubFeed, WatchTarget};
pub use orchestrator::Orchestrator;
pub use watcher::{BranchWatcher, Cycle, PollCursor, WatchError, WatchState};
