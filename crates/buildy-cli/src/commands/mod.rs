//! CLI command implementations.

pub mod run;

use anyhow::{Context, Result};
use buildy_config::{Config, load_config};
use std::path::Path;

pub fn validate(path: &Path) -> Result<()> {
    let config = load_config(path)
        .with_context(|| format!("Invalid configuration: {}", path.display()))?;

    println!("Configuration is valid");
    print!("{}", summary(&config));
    Ok(())
}

fn summary(config: &Config) -> String {
    let mut lines = vec![
        format!(
            "  repository:   {}/{} ({})",
            config.source.owner, config.source.repo, config.source.api_url
        ),
        format!("  working path: {}", config.working_path.display()),
        format!("  branches:     {}", config.branches.join(", ")),
        format!(
            "  polling:      every {}s, timeout {}s",
            config.poll.interval.as_secs(),
            config.poll.timeout.as_secs()
        ),
        format!(
            "  pipeline:     {} step(s), timeout {}s each",
            config.pipeline.steps.len(),
            config.pipeline.step_timeout.as_secs()
        ),
    ];
    for step in &config.pipeline.steps {
        lines.push(format!("    - {}", step));
    }

    lines.push(match &config.post {
        Some(post) => format!(
            "  post:         {} -> {}",
            post.command,
            post.output_dir.display()
        ),
        None => "  post:         none".to_string(),
    });
    lines.push(match &config.notify {
        Some(notify) => format!(
            "  notify:       {} -> {}",
            notify.sender,
            notify.recipients.join(", ")
        ),
        None => "  notify:       log only".to_string(),
    });

    let mut out = lines.join("\n");
    out.push('\n');
    out
}
