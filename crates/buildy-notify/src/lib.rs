//! Notifiers for buildy.
//!
//! - [`MailNotifier`] posts a message to an HTTP mail relay
//! - [`LogNotifier`] only records the outcome in the log

pub mod log;
pub mod mail;
pub mod message;

pub use log::LogNotifier;
pub use mail::MailNotifier;
pub use message::Message;

#[cfg(test)]
pub(crate) mod testing {
    use buildy_core::{BuildId, BuildResult, CommitHash, CommitMetadata};
    use bytes::Bytes;
    use chrono::Utc;

    pub const SHA: &str = "9fceb02d0ae598e95dc970b74767f19372d61af8";

    pub fn result(passed: bool, post_output: &'static str) -> BuildResult {
        BuildResult {
            id: BuildId::new(),
            branch: "main".to_string(),
            passed,
            hash: CommitHash::parse(SHA).unwrap(),
            output: Bytes::from_static(b"make: ok\n"),
            post_success: !post_output.is_empty(),
            post_output: Bytes::from_static(post_output.as_bytes()),
            finished_at: Utc::now(),
        }
    }

    pub fn commit() -> CommitMetadata {
        CommitMetadata {
            hash: SHA.to_string(),
            web_url: format!("https://github.com/acme/widgets/commit/{}", SHA),
        }
    }
}
