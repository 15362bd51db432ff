//! A working tree for tests that never touches git.

use async_trait::async_trait;
use buildy_core::CommitHash;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::tree::{TreeError, WorkingTree};

/// Hash every successful `head` reports.
pub const HASH: &str = "9fceb02d0ae598e95dc970b74767f19372d61af8";

/// Runs steps in a temporary directory. A build holds the tree from `sync`
/// until `head`; `max_in_flight` records the most builds ever holding it at
/// once.
pub struct FakeTree {
    pub dir: tempfile::TempDir,
    pub fail_sync: bool,
    pub fail_head: bool,
    pub synced: Arc<Mutex<Vec<String>>>,
    pub in_flight: Arc<AtomicUsize>,
    pub max_in_flight: Arc<AtomicUsize>,
}

impl FakeTree {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("temporary working tree"),
            fail_sync: false,
            fail_head: false,
            synced: Arc::default(),
            in_flight: Arc::default(),
            max_in_flight: Arc::default(),
        }
    }
}

impl Default for FakeTree {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkingTree for FakeTree {
    fn path(&self) -> &Path {
        self.dir.path()
    }

    async fn sync(&mut self, branch: &str) -> Result<Vec<u8>, TreeError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.synced
            .lock()
            .expect("synced lock")
            .push(branch.to_string());
        tokio::time::sleep(Duration::from_millis(5)).await;

        if self.fail_sync {
            return Err(TreeError::CommandFailed {
                command: format!("git checkout {}", branch),
                output: "error: pathspec did not match".to_string(),
            });
        }
        Ok(Vec::new())
    }

    async fn head(&self) -> Result<CommitHash, TreeError> {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if self.fail_head {
            return Err(TreeError::UnparsableHash("fatal: bad revision".to_string()));
        }
        CommitHash::parse(HASH).ok_or_else(|| TreeError::UnparsableHash(HASH.to_string()))
    }
}
