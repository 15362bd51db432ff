//! Message composition.

use buildy_core::BuildNotice;
use std::fmt::Write;

/// A rendered notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub subject: String,
    pub text: String,
}

impl Message {
    /// Render `notice` with the given subject prefix.
    ///
    /// The commit link is left out when the commit could not be looked up,
    /// and the build output link when post-processing printed nothing.
    pub fn compose(prefix: &str, notice: &BuildNotice<'_>) -> Self {
        let result = notice.result;
        let short = result.hash.short();
        let outcome = if result.passed { "Success" } else { "Failure" };

        let subject = format!("{} {} {}:{}", prefix, outcome, notice.branch, short)
            .trim_start()
            .to_string();

        let mut text = format!(
            "Commit {} to branch {} has {}.\n",
            short,
            notice.branch,
            result.verdict()
        );
        if let Some(commit) = notice.commit {
            let _ = writeln!(text, "See the commit here:\n{}", commit.web_url);
        }
        let post_output = String::from_utf8_lossy(&result.post_output);
        let post_output = post_output.trim();
        if !post_output.is_empty() {
            let _ = writeln!(text, "See the build output here:\n{}", post_output);
        }

        Self { subject, text }
    }
}
