//! Mail relay notifier.

use async_trait::async_trait;
use buildy_config::NotifyConfig;
use buildy_core::{BuildNotice, Notifier, NotifyError, Secret};
use reqwest::StatusCode;
use tracing::{debug, info};
use url::Url;

use crate::message::Message;

/// Sends one mail per build through an HTTP relay that accepts a
/// form-encoded message with basic authentication.
pub struct MailNotifier {
    client: reqwest::Client,
    endpoint: Url,
    api_key: Secret,
    sender: String,
    recipients: Vec<String>,
    subject_prefix: String,
}

impl MailNotifier {
    pub fn new(config: &NotifyConfig) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| NotifyError::Request(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            sender: config.sender.clone(),
            recipients: config.recipients.clone(),
            subject_prefix: config.subject_prefix.clone(),
        })
    }

    fn form<'a>(&'a self, message: &'a Message) -> Vec<(&'static str, &'a str)> {
        let mut form = vec![("from", self.sender.as_str())];
        form.extend(self.recipients.iter().map(|r| ("to", r.as_str())));
        form.push(("subject", message.subject.as_str()));
        form.push(("text", message.text.as_str()));
        form
    }
}

#[async_trait]
impl Notifier for MailNotifier {
    fn name(&self) -> &'static str {
        "mail"
    }

    async fn notify(&self, notice: BuildNotice<'_>) -> Result<(), NotifyError> {
        let message = Message::compose(&self.subject_prefix, &notice);
        debug!(branch = %notice.branch, subject = %message.subject, "Sending mail");

        let response = self
            .client
            .post(self.endpoint.clone())
            .basic_auth("api", Some(self.api_key.expose()))
            .form(&self.form(&message))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    NotifyError::Timeout(e.to_string())
                } else {
                    NotifyError::Request(e.to_string())
                }
            })?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        info!(branch = %notice.branch, recipients = self.recipients.len(), "Mail sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{commit, result};
    use axum::Router;
    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode as AxumStatus, header};
    use axum::response::{IntoResponse, Response};
    use axum::routing::post;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    type Received = Arc<Mutex<Vec<String>>>;

    // "api:key-test"
    const AUTH: &str = "Basic YXBpOmtleS10ZXN0";

    async fn messages(
        State(received): State<Received>,
        headers: HeaderMap,
        body: String,
    ) -> Response {
        if headers.get(header::AUTHORIZATION).is_none_or(|v| v != AUTH) {
            return (AxumStatus::UNAUTHORIZED, "Forbidden").into_response();
        }
        let form_encoded = headers
            .get(header::CONTENT_TYPE)
            .is_some_and(|v| v == "application/x-www-form-urlencoded");
        if !form_encoded {
            return AxumStatus::UNSUPPORTED_MEDIA_TYPE.into_response();
        }
        if body.contains("slow") {
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
        received.lock().unwrap().push(body);
        (AxumStatus::OK, r#"{"message":"Queued. Thank you."}"#).into_response()
    }

    async fn serve() -> (Url, Received) {
        let received = Received::default();
        let app = Router::new()
            .route("/v3/example.com/messages", post(messages))
            .with_state(received.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let url = Url::parse(&format!("http://{}/v3/example.com/messages", addr)).unwrap();
        (url, received)
    }

    fn config(endpoint: Url, api_key: &str) -> NotifyConfig {
        NotifyConfig {
            sender: "ci@example.com".to_string(),
            recipients: vec!["dev@example.com".to_string(), "ops@example.com".to_string()],
            subject_prefix: "[buildy]".to_string(),
            endpoint,
            api_key: Secret::new(api_key),
            timeout: Duration::from_secs(5),
        }
    }

    fn parse_form(body: &str) -> Vec<(String, String)> {
        url::form_urlencoded::parse(body.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    #[tokio::test]
    async fn test_sends_form_to_relay() {
        let (endpoint, received) = serve().await;
        let notifier = MailNotifier::new(&config(endpoint, "key-test")).unwrap();

        let result = result(false, "https://logs.example.com/1\n");
        let commit = commit();
        notifier
            .notify(BuildNotice {
                branch: "main",
                result: &result,
                commit: Some(&commit),
            })
            .await
            .unwrap();

        let bodies = received.lock().unwrap().clone();
        assert_eq!(bodies.len(), 1);
        let form = parse_form(&bodies[0]);

        let values = |key: &str| -> Vec<String> {
            form.iter()
                .filter(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
                .collect()
        };
        assert_eq!(values("from"), vec!["ci@example.com"]);
        assert_eq!(values("to"), vec!["dev@example.com", "ops@example.com"]);
        assert_eq!(values("subject"), vec!["[buildy] Failure main:9fceb02"]);
        let text = &values("text")[0];
        assert!(text.starts_with("Commit 9fceb02 to branch main has failed.\n"));
        assert!(text.contains("https://logs.example.com/1"));
    }

    #[tokio::test]
    async fn test_rejected_credentials() {
        let (endpoint, received) = serve().await;
        let notifier = MailNotifier::new(&config(endpoint, "wrong")).unwrap();

        let result = result(true, "");
        let err = notifier
            .notify(BuildNotice {
                branch: "main",
                result: &result,
                commit: None,
            })
            .await
            .unwrap_err();

        match err {
            NotifyError::Rejected { status, body } => {
                assert_eq!(status, 401);
                assert_eq!(body, "Forbidden");
            }
            other => panic!("expected rejection, got {:?}", other),
        }
        assert!(received.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_slow_relay_times_out() {
        let (endpoint, _received) = serve().await;
        let mut config = config(endpoint, "key-test");
        config.timeout = Duration::from_millis(200);
        let notifier = MailNotifier::new(&config).unwrap();

        let result = result(true, "");
        let err = notifier
            .notify(BuildNotice {
                branch: "slow",
                result: &result,
                commit: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, NotifyError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_unreachable_relay() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let endpoint = Url::parse(&format!("http://{}/messages", addr)).unwrap();
        let notifier = MailNotifier::new(&config(endpoint, "key-test")).unwrap();

        let result = result(true, "");
        let err = notifier
            .notify(BuildNotice {
                branch: "main",
                result: &result,
                commit: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, NotifyError::Request(_)));
    }
}
