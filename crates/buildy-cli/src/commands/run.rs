//! The `run` command: start every watcher and the executor.

use anyhow::{Context, Result};
use buildy_config::system::DEFAULT_SUBJECT_PREFIX;
use buildy_config::{Config, load_config};
use buildy_core::Notifier;
use buildy_executor::BuildExecutor;
use buildy_notify::{LogNotifier, MailNotifier};
use buildy_scheduler::{GitHubFeed, Orchestrator};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

pub async fn run(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)
        .with_context(|| format!("Failed to load config file: {}", config_path.display()))?;

    if !config.working_path.is_dir() {
        anyhow::bail!(
            "Working path {} is not a directory",
            config.working_path.display()
        );
    }

    info!(
        repo = %format!("{}/{}", config.source.owner, config.source.repo),
        branches = ?config.branches,
        working_path = %config.working_path.display(),
        "Starting buildy"
    );

    let feed = GitHubFeed::new(config.source.api_url.clone(), config.poll.timeout)
        .context("Failed to create GitHub client")?;
    let notifier = notifier(&config)?;
    let executor = BuildExecutor::from_config(&config);

    let orchestrator = Orchestrator::new(&config, executor, Arc::new(feed), notifier);

    tokio::select! {
        errors = orchestrator.run() => {
            for e in &errors {
                error!(error = %e, "Watcher stopped");
            }
            anyhow::bail!("All {} watchers stopped", errors.len())
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received interrupt, shutting down");
            Ok(())
        }
    }
}

fn notifier(config: &Config) -> Result<Arc<dyn Notifier>> {
    match &config.notify {
        Some(notify) => {
            let mail = MailNotifier::new(notify).context("Failed to create mail client")?;
            info!(recipients = notify.recipients.len(), "Mail notifications enabled");
            Ok(Arc::new(mail))
        }
        None => {
            info!("No notify block configured, build results go to the log only");
            Ok(Arc::new(LogNotifier::new(DEFAULT_SUBJECT_PREFIX)))
        }
    }
}
