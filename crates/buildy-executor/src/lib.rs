//! Build execution for buildy.
//!
//! A single [`BuildExecutor`] owns the working tree and serves build requests
//! one at a time, in arrival order:
//! - sync the tree to the requested branch
//! - run the pipeline steps, stopping at the first failure
//! - resolve the checked-out commit
//! - persist the output and run the post-processing command

pub mod executor;
pub mod process;
pub mod tree;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use executor::{BuildExecutor, output_file_name};
pub use process::{StepOutput, StepStatus, run_step};
pub use tree::{GitWorkingTree, TreeError, WorkingTree};
