//! System configuration parsing.
//!
//! ```kdl
//! source owner="acme" repo="widgets" token-env="GITHUB_TOKEN"
//! working-path "/srv/buildy/tree"
//! branches "main" "develop"
//! poll interval=5 timeout=30
//! pipeline step-timeout=1800 {
//!     step "make" "all"
//!     step "make" "test"
//! }
//! post output-dir="/srv/buildy/logs" {
//!     command "/usr/local/bin/publish-log"
//! }
//! notify sender="ci@example.com" endpoint="https://api.mailgun.net/v3/example.com/messages" api-key-env="MAILGUN_KEY" {
//!     recipient "dev@example.com"
//! }
//! ```

use crate::{ConfigError, ConfigResult};
use buildy_core::{Command, Secret};
use kdl::{KdlDocument, KdlNode};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

pub const DEFAULT_API_URL: &str = "https://api.github.com";
pub const DEFAULT_SUBJECT_PREFIX: &str = "[buildy]";

const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
const DEFAULT_POLL_TIMEOUT_SECS: u64 = 30;
const DEFAULT_SYNC_TIMEOUT_SECS: u64 = 300;
const DEFAULT_BUILD_WAIT_SECS: u64 = 7200;
const DEFAULT_STEP_TIMEOUT_SECS: u64 = 1800;
const DEFAULT_POST_TIMEOUT_SECS: u64 = 300;

/// Complete, validated configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub source: SourceConfig,
    /// The one local checkout every build runs in.
    pub working_path: PathBuf,
    pub branches: Vec<String>,
    pub poll: PollConfig,
    /// Deadline for switching and updating the working tree.
    pub sync_timeout: Duration,
    /// Deadline for a watcher to get a result back once it has a change.
    pub build_wait: Duration,
    pub pipeline: PipelineConfig,
    pub post: Option<PostConfig>,
    pub notify: Option<NotifyConfig>,
}

/// Where commits are polled from.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub owner: String,
    pub repo: String,
    pub token: Secret,
    pub api_url: Url,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            timeout: Duration::from_secs(DEFAULT_POLL_TIMEOUT_SECS),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub steps: Vec<Command>,
    pub step_timeout: Duration,
}

/// Output persistence plus one post-processing command.
#[derive(Debug, Clone)]
pub struct PostConfig {
    pub output_dir: PathBuf,
    pub command: Command,
    pub timeout: Duration,
}

/// Mail relay settings.
#[derive(Debug, Clone)]
pub struct NotifyConfig {
    pub sender: String,
    pub recipients: Vec<String>,
    pub subject_prefix: String,
    pub endpoint: Url,
    pub api_key: Secret,
    pub timeout: Duration,
}

/// Read and parse a configuration file.
pub fn load_config(path: &Path) -> ConfigResult<Config> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse configuration from KDL text, resolving `*-env` references from the
/// process environment.
pub fn parse_config(kdl: &str) -> ConfigResult<Config> {
    parse_config_with_env(kdl, |name| std::env::var(name).ok())
}

/// Parse configuration from KDL text with a custom environment lookup.
pub fn parse_config_with_env<F>(kdl: &str, env: F) -> ConfigResult<Config>
where
    F: Fn(&str) -> Option<String>,
{
    let doc: KdlDocument = kdl.parse()?;

    let mut source = None;
    let mut working_path = None;
    let mut branches = None;
    let mut poll = PollConfig::default();
    let mut sync_timeout = Duration::from_secs(DEFAULT_SYNC_TIMEOUT_SECS);
    let mut build_wait = Duration::from_secs(DEFAULT_BUILD_WAIT_SECS);
    let mut pipeline = None;
    let mut post = None;
    let mut notify = None;

    let mut seen: Vec<&str> = Vec::new();
    for node in doc.nodes() {
        let name = node.name().value();
        if seen.contains(&name) {
            return Err(ConfigError::Duplicate(format!("'{}' node", name)));
        }
        seen.push(name);

        match name {
            "source" => source = Some(parse_source(node, &env)?),
            "working-path" => {
                let path = get_first_string_arg(node)
                    .filter(|p| !p.is_empty())
                    .ok_or_else(|| ConfigError::MissingField("working-path".to_string()))?;
                working_path = Some(PathBuf::from(path));
            }
            "branches" => branches = Some(parse_branches(node)?),
            "poll" => poll = parse_poll(node)?,
            "sync" => {
                if let Some(timeout) = get_duration_prop(node, "timeout", "sync timeout")? {
                    sync_timeout = timeout;
                }
            }
            "build-wait" => {
                if let Some(timeout) = get_duration_prop(node, "timeout", "build-wait timeout")? {
                    build_wait = timeout;
                }
            }
            "pipeline" => pipeline = Some(parse_pipeline(node)?),
            "post" => post = Some(parse_post(node)?),
            "notify" => notify = Some(parse_notify(node, &env)?),
            other => return Err(ConfigError::UnknownNode(other.to_string())),
        }
    }

    Ok(Config {
        source: source.ok_or_else(|| ConfigError::MissingField("source".to_string()))?,
        working_path: working_path
            .ok_or_else(|| ConfigError::MissingField("working-path".to_string()))?,
        branches: branches.ok_or_else(|| ConfigError::MissingField("branches".to_string()))?,
        poll,
        sync_timeout,
        build_wait,
        pipeline: pipeline.ok_or_else(|| ConfigError::MissingField("pipeline".to_string()))?,
        post,
        notify,
    })
}

fn parse_source<F>(node: &KdlNode, env: &F) -> ConfigResult<SourceConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let owner = require_string_prop(node, "owner", "source owner")?;
    let repo = require_string_prop(node, "repo", "source repo")?;
    let token = resolve_secret(node, "token", "token-env", "source token", env)?;
    let api_url = parse_url(
        get_string_prop(node, "api-url").as_deref().unwrap_or(DEFAULT_API_URL),
        "source api-url",
    )?;

    Ok(SourceConfig {
        owner,
        repo,
        token,
        api_url,
    })
}

fn parse_branches(node: &KdlNode) -> ConfigResult<Vec<String>> {
    let branches = get_string_args(node, "branches")?;
    if branches.is_empty() {
        return Err(ConfigError::MissingField("branches".to_string()));
    }

    let mut seen: Vec<&str> = Vec::new();
    for branch in &branches {
        if branch.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "branches".to_string(),
                message: "branch names cannot be empty".to_string(),
            });
        }
        if branch.starts_with('-') {
            return Err(ConfigError::InvalidValue {
                field: "branches".to_string(),
                message: format!("branch '{}' would be read by git as an option", branch),
            });
        }
        if seen.contains(&branch.as_str()) {
            return Err(ConfigError::Duplicate(format!("branch '{}'", branch)));
        }
        seen.push(branch);
    }

    Ok(branches)
}

fn parse_poll(node: &KdlNode) -> ConfigResult<PollConfig> {
    let defaults = PollConfig::default();
    Ok(PollConfig {
        interval: get_duration_prop(node, "interval", "poll interval")?
            .unwrap_or(defaults.interval),
        timeout: get_duration_prop(node, "timeout", "poll timeout")?.unwrap_or(defaults.timeout),
    })
}

fn parse_pipeline(node: &KdlNode) -> ConfigResult<PipelineConfig> {
    let step_timeout = get_duration_prop(node, "step-timeout", "pipeline step-timeout")?
        .unwrap_or(Duration::from_secs(DEFAULT_STEP_TIMEOUT_SECS));

    let mut steps = Vec::new();
    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "step" => steps.push(parse_command(child, "pipeline step")?),
                other => return Err(ConfigError::UnknownNode(format!("pipeline.{}", other))),
            }
        }
    }

    if steps.is_empty() {
        return Err(ConfigError::MissingField("pipeline step".to_string()));
    }

    Ok(PipelineConfig {
        steps,
        step_timeout,
    })
}

fn parse_post(node: &KdlNode) -> ConfigResult<PostConfig> {
    let output_dir = PathBuf::from(require_string_prop(node, "output-dir", "post output-dir")?);
    let timeout = get_duration_prop(node, "timeout", "post timeout")?
        .unwrap_or(Duration::from_secs(DEFAULT_POST_TIMEOUT_SECS));

    let mut command = None;
    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "command" if command.is_some() => {
                    return Err(ConfigError::Duplicate("post command".to_string()));
                }
                "command" => command = Some(parse_command(child, "post command")?),
                other => return Err(ConfigError::UnknownNode(format!("post.{}", other))),
            }
        }
    }

    Ok(PostConfig {
        output_dir,
        command: command.ok_or_else(|| ConfigError::MissingField("post command".to_string()))?,
        timeout,
    })
}

fn parse_notify<F>(node: &KdlNode, env: &F) -> ConfigResult<NotifyConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let sender = require_string_prop(node, "sender", "notify sender")?;
    let subject_prefix = get_string_prop(node, "subject-prefix")
        .unwrap_or_else(|| DEFAULT_SUBJECT_PREFIX.to_string());
    let endpoint = parse_url(
        &require_string_prop(node, "endpoint", "notify endpoint")?,
        "notify endpoint",
    )?;
    let api_key = resolve_secret(node, "api-key", "api-key-env", "notify api-key", env)?;
    let timeout = get_duration_prop(node, "timeout", "notify timeout")?
        .unwrap_or(Duration::from_secs(DEFAULT_POLL_TIMEOUT_SECS));

    let mut recipients = Vec::new();
    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "recipient" => recipients.extend(get_string_args(child, "notify recipient")?),
                other => return Err(ConfigError::UnknownNode(format!("notify.{}", other))),
            }
        }
    }

    if recipients.is_empty() {
        return Err(ConfigError::MissingField("notify recipient".to_string()));
    }

    Ok(NotifyConfig {
        sender,
        recipients,
        subject_prefix,
        endpoint,
        api_key,
        timeout,
    })
}

/// A node whose positional arguments are a program followed by its arguments.
fn parse_command(node: &KdlNode, field: &str) -> ConfigResult<Command> {
    let mut parts = get_string_args(node, field)?.into_iter();
    let program = parts
        .next()
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ConfigError::MissingField(format!("{} program", field)))?;
    Ok(Command::new(program, parts))
}

fn resolve_secret<F>(
    node: &KdlNode,
    inline_key: &str,
    env_key: &str,
    field: &str,
    env: &F,
) -> ConfigResult<Secret>
where
    F: Fn(&str) -> Option<String>,
{
    let value = match (get_string_prop(node, inline_key), get_string_prop(node, env_key)) {
        (Some(value), None) => value,
        (None, Some(var)) => env(&var).ok_or(ConfigError::MissingEnv(var))?,
        (Some(_), Some(_)) => {
            return Err(ConfigError::InvalidValue {
                field: field.to_string(),
                message: format!("set only one of '{}' and '{}'", inline_key, env_key),
            });
        }
        (None, None) => return Err(ConfigError::MissingField(field.to_string())),
    };

    if value.is_empty() {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            message: "cannot be empty".to_string(),
        });
    }
    Ok(Secret::new(value))
}

fn parse_url(raw: &str, field: &str) -> ConfigResult<Url> {
    Url::parse(raw).map_err(|e| ConfigError::InvalidValue {
        field: field.to_string(),
        message: format!("'{}': {}", raw, e),
    })
}

// Helper functions for extracting values from KDL nodes

fn get_first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

/// All positional arguments, which must all be strings.
fn get_string_args(node: &KdlNode, field: &str) -> ConfigResult<Vec<String>> {
    node.entries()
        .iter()
        .filter(|e| e.name().is_none())
        .map(|e| {
            e.value()
                .as_string()
                .map(|s| s.to_string())
                .ok_or_else(|| ConfigError::InvalidValue {
                    field: field.to_string(),
                    message: format!("expected a string, found {}", e.value()),
                })
        })
        .collect()
}

fn get_string_prop(node: &KdlNode, name: &str) -> Option<String> {
    node.get(name)
        .and_then(|v| v.as_string())
        .map(|s| s.to_string())
}

fn require_string_prop(node: &KdlNode, name: &str, field: &str) -> ConfigResult<String> {
    get_string_prop(node, name)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ConfigError::MissingField(field.to_string()))
}

/// A whole number of seconds, strictly positive.
fn get_duration_prop(node: &KdlNode, name: &str, field: &str) -> ConfigResult<Option<Duration>> {
    let Some(value) = node.get(name) else {
        return Ok(None);
    };

    value
        .as_integer()
        .filter(|secs| *secs > 0)
        .and_then(|secs| u64::try_from(secs).ok())
        .map(|secs| Some(Duration::from_secs(secs)))
        .ok_or_else(|| ConfigError::InvalidValue {
            field: field.to_string(),
            message: format!("expected a positive number of seconds, found {}", value),
        })
}
