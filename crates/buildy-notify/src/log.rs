//! Notifier that only writes to the log.

use async_trait::async_trait;
use buildy_core::{BuildNotice, Notifier, NotifyError};
use tracing::{info, warn};

use crate::message::Message;

/// Used when no mail relay is configured.
#[derive(Debug, Default)]
pub struct LogNotifier {
    subject_prefix: String,
}

impl LogNotifier {
    pub fn new(subject_prefix: impl Into<String>) -> Self {
        Self {
            subject_prefix: subject_prefix.into(),
        }
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn notify(&self, notice: BuildNotice<'_>) -> Result<(), NotifyError> {
        let message = Message::compose(&self.subject_prefix, &notice);
        let commit_url = notice.commit.map(|c| c.web_url.as_str()).unwrap_or("");

        if notice.result.passed {
            info!(branch = %notice.branch, commit_url = %commit_url, "{}", message.subject);
        } else {
            warn!(branch = %notice.branch, commit_url = %commit_url, "{}", message.subject);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{commit, result};

    #[tokio::test]
    async fn test_never_fails() {
        let notifier = LogNotifier::new("[buildy]");
        let commit = commit();
        for passed in [true, false] {
            let result = result(passed, "");
            let notice = BuildNotice {
                branch: "main",
                result: &result,
                commit: Some(&commit),
            };
            assert!(notifier.notify(notice).await.is_ok());
        }
        assert_eq!(notifier.name(), "log");
    }
}
