//! The build executor.

use buildy_config::{Config, PipelineConfig, PostConfig};
use buildy_core::{BuildId, BuildInbox, BuildResult, CommitHash};
use bytes::Bytes;
use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::process::run_step;
use crate::tree::{GitWorkingTree, WorkingTree};

/// Serves build requests one at a time against a single working tree.
///
/// Exclusivity is structural: the executor owns the tree, and [`run`] only
/// pulls the next request after the current one has been answered.
///
/// [`run`]: BuildExecutor::run
pub struct BuildExecutor {
    tree: Box<dyn WorkingTree>,
    pipeline: PipelineConfig,
    post: Option<PostConfig>,
}

impl BuildExecutor {
    pub fn new(
        tree: Box<dyn WorkingTree>,
        pipeline: PipelineConfig,
        post: Option<PostConfig>,
    ) -> Self {
        Self {
            tree,
            pipeline,
            post,
        }
    }

    /// Executor over a git checkout at the configured working path.
    pub fn from_config(config: &Config) -> Self {
        let tree = GitWorkingTree::new(&config.working_path, config.sync_timeout);
        Self::new(
            Box::new(tree),
            config.pipeline.clone(),
            config.post.clone(),
        )
    }

    /// Serve requests until every queue handle has been dropped.
    pub async fn run(mut self, mut inbox: BuildInbox) {
        info!(path = %self.tree.path().display(), "Executor started");

        while let Some(request) = inbox.recv().await {
            info!(build_id = %request.id(), branch = %request.branch(), "Build request received");

            let result = self.build(request.id(), request.branch()).await;
            let build_id = result.id;
            if request.respond(result).is_err() {
                warn!(build_id = %build_id, "Requester went away before the result was delivered");
            }
        }

        info!("Build queue closed, executor stopping");
    }

    /// Build the head of `branch`. Every failure ends up inside the result.
    pub async fn build(&mut self, id: BuildId, branch: &str) -> BuildResult {
        let (passed, output) = match self.tree.sync(branch).await {
            Ok(_) => self.run_pipeline(branch).await,
            Err(e) => {
                error!(branch = %branch, error = %e, "Failed to sync working tree");
                (false, format!("{}\n", e).into_bytes())
            }
        };

        // Resolved whatever the verdict: it names what was actually built.
        let hash = match self.tree.head().await {
            Ok(hash) => hash,
            Err(e) => {
                warn!(branch = %branch, error = %e, "Could not resolve commit hash");
                CommitHash::invalid()
            }
        };

        let (post_success, post_output) = match &self.post {
            Some(post) => self.post_process(post, branch, &hash, &output).await,
            None => (false, Vec::new()),
        };

        info!(
            build_id = %id,
            branch = %branch,
            hash = %hash.short(),
            passed,
            post_success,
            "Build finished"
        );

        BuildResult {
            id,
            branch: branch.to_string(),
            passed,
            hash,
            output: Bytes::from(output),
            post_success,
            post_output: Bytes::from(post_output),
            finished_at: Utc::now(),
        }
    }

    /// Run every step in order, stopping at the first failure.
    async fn run_pipeline(&self, branch: &str) -> (bool, Vec<u8>) {
        let mut output = Vec::new();

        for (idx, step) in self.pipeline.steps.iter().enumerate() {
            info!(branch = %branch, step = idx + 1, command = %step, "Running pipeline step");

            let result = run_step(step, self.tree.path(), self.pipeline.step_timeout).await;
            output.extend_from_slice(&result.output);

            if !result.succeeded() {
                info!(
                    branch = %branch,
                    step = idx + 1,
                    status = ?result.status,
                    skipped = self.pipeline.steps.len() - idx - 1,
                    "Pipeline step failed"
                );
                return (false, output);
            }
        }

        (true, output)
    }

    async fn post_process(
        &self,
        post: &PostConfig,
        branch: &str,
        hash: &CommitHash,
        output: &[u8],
    ) -> (bool, Vec<u8>) {
        let path = match persist_output(&post.output_dir, branch, hash, output).await {
            Ok(path) => path,
            Err(e) => {
                error!(dir = %post.output_dir.display(), error = %e, "Failed to persist build output");
                return (false, Vec::new());
            }
        };

        let command = post.command.with_arg(path.to_string_lossy());
        let result = run_step(&command, self.tree.path(), post.timeout).await;
        if !result.succeeded() {
            warn!(command = %command, status = ?result.status, "Post-processing failed");
        }

        (result.succeeded(), result.output)
    }
}

/// File name for a build's output: the percent-encoded branch and the hash.
/// Distinct branches never share a file, and `/` cannot escape the directory.
pub fn output_file_name(branch: &str, hash: &CommitHash) -> String {
    format!("{}-{}.log", urlencoding::encode(branch), hash)
}

async fn persist_output(
    dir: &Path,
    branch: &str,
    hash: &CommitHash,
    output: &[u8],
) -> std::io::Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(output_file_name(branch, hash));
    tokio::fs::write(&path, output).await?;
    Ok(path)
}
