//! Core data model for the buildy CI orchestrator.
//!
//! This crate contains:
//! - Build requests and results exchanged between watchers and the executor
//! - The build queue (one shared request channel, one reply slot per request)
//! - Commit identifiers and metadata
//! - The notifier seam
//! - Redacted credentials

pub mod build;
pub mod commit;
pub mod error;
pub mod id;
pub mod notifier;
pub mod queue;
pub mod secret;

pub use build::{BuildResult, Command};
pub use commit::{CommitHash, CommitMetadata};
pub use error::{Error, Result};
pub use id::BuildId;
pub use notifier::{BuildNotice, Notifier, NotifyError};
pub use queue::{BuildInbox, BuildQueue, BuildRequest, PendingBuild, build_queue};
pub use secret::Secret;
