//! Commit identifiers and metadata.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Length of the abbreviated hash used in subjects and log lines.
pub const SHORT_HASH_LEN: usize = 7;

/// A commit hash as resolved from the working tree.
///
/// Resolution can fail without blocking a build result, so the type carries an
/// explicit sentinel (git's all-zero object id) instead of an `Option`. Every
/// consumer can format it, and [`CommitHash::is_valid`] tells them whether it
/// points at anything.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommitHash(String);

impl CommitHash {
    const INVALID: &'static str = "0000000000000000000000000000000000000000";

    /// The sentinel used when the hash could not be resolved.
    pub fn invalid() -> Self {
        Self(Self::INVALID.to_string())
    }

    /// Parse a hex object id, as printed by `git rev-parse`.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let well_formed = (SHORT_HASH_LEN..=64).contains(&raw.len())
            && raw.chars().all(|c| c.is_ascii_hexdigit());
        if !well_formed || raw.chars().all(|c| c == '0') {
            return None;
        }
        Some(Self(raw.to_ascii_lowercase()))
    }

    pub fn is_valid(&self) -> bool {
        self.0 != Self::INVALID
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First seven characters of the hash.
    pub fn short(&self) -> &str {
        self.0.get(..SHORT_HASH_LEN).unwrap_or(&self.0)
    }
}

impl fmt::Display for CommitHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Commit details used to enrich notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitMetadata {
    #[serde(rename = "sha")]
    pub hash: String,
    /// Canonical web page for the commit.
    #[serde(rename = "html_url")]
    pub web_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rev_parse_output() {
        let hash = CommitHash::parse("9FCEB02D0AE598E95DC970B74767F19372D61AF8\n").unwrap();
        assert_eq!(hash.as_str(), "9fceb02d0ae598e95dc970b74767f19372d61af8");
        assert_eq!(hash.short(), "9fceb02");
        assert!(hash.is_valid());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(CommitHash::parse("").is_none());
        assert!(CommitHash::parse("fatal: not a git repository").is_none());
        assert!(CommitHash::parse("abc").is_none());
        assert!(CommitHash::parse("0000000000000000000000000000000000000000").is_none());
    }

    #[test]
    fn test_invalid_sentinel() {
        let hash = CommitHash::invalid();
        assert!(!hash.is_valid());
        assert_eq!(hash.short(), "0000000");
    }

    #[test]
    fn test_metadata_decodes_github_commit() {
        let json = r#"{
            "sha": "9fceb02d0ae598e95dc970b74767f19372d61af8",
            "html_url": "https://github.com/octocat/hello/commit/9fceb02",
            "commit": { "message": "Fix all the bugs" }
        }"#;
        let meta: CommitMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(meta.hash, "9fceb02d0ae598e95dc970b74767f19372d61af8");
        assert_eq!(meta.web_url, "https://github.com/octocat/hello/commit/9fceb02");
    }
}
