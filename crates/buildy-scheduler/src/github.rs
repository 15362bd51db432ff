//! GitHub commit feed client.

use async_trait::async_trait;
use buildy_core::{CommitHash, CommitMetadata, Secret};
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, IF_MODIFIED_SINCE, LAST_MODIFIED};
use std::time::Duration;
use url::Url;

/// The branch a watcher follows and the credential used to read it.
#[derive(Debug, Clone)]
pub struct WatchTarget {
    pub owner: String,
    pub repo: String,
    pub branch: String,
    pub token: Secret,
}

/// Answer to a conditional read of a branch's commit list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedResponse {
    /// Nothing new since the freshness marker that was sent.
    Unchanged,
    /// New data, with the server's new freshness marker if it sent one.
    Changed {
        commits: Vec<CommitMetadata>,
        marker: Option<String>,
    },
}

/// Commit feed errors.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Unexpected status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("Parse error: {0}")]
    Parse(String),
}

impl FeedError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, FeedError::Timeout(_))
    }

    fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FeedError::Timeout(e.to_string())
        } else if e.is_decode() {
            FeedError::Parse(e.to_string())
        } else {
            FeedError::Request(e.to_string())
        }
    }
}

/// Source of commit information for watched branches.
#[async_trait]
pub trait CommitFeed: Send + Sync {
    /// Conditionally read the newest commit on the target branch. `marker` is
    /// the freshness marker from the last changed response, if any.
    async fn latest(
        &self,
        target: &WatchTarget,
        marker: Option<&str>,
    ) -> Result<FeedResponse, FeedError>;

    /// Look up one commit by hash.
    async fn commit(
        &self,
        target: &WatchTarget,
        hash: &CommitHash,
    ) -> Result<CommitMetadata, FeedError>;
}

/// GitHub REST API client.
pub struct GitHubFeed {
    client: reqwest::Client,
    api_url: Url,
}

impl GitHubFeed {
    /// Every request made through this client is bounded by `timeout`.
    pub fn new(api_url: Url, timeout: Duration) -> Result<Self, FeedError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("buildy-ci")
            .build()
            .map_err(|e| FeedError::Request(e.to_string()))?;

        Ok(Self { client, api_url })
    }

    fn commits_url(&self, target: &WatchTarget) -> String {
        format!(
            "{}/repos/{}/{}/commits",
            self.api_url.as_str().trim_end_matches('/'),
            urlencoding::encode(&target.owner),
            urlencoding::encode(&target.repo),
        )
    }

    fn get(&self, url: &str, target: &WatchTarget) -> reqwest::RequestBuilder {
        self.client
            .get(url)
            .bearer_auth(target.token.expose())
            .header(ACCEPT, "application/vnd.github+json")
    }
}

#[async_trait]
impl CommitFeed for GitHubFeed {
    async fn latest(
        &self,
        target: &WatchTarget,
        marker: Option<&str>,
    ) -> Result<FeedResponse, FeedError> {
        let url = format!(
            "{}?per_page=1&sha={}",
            self.commits_url(target),
            urlencoding::encode(&target.branch)
        );

        let mut request = self.get(&url, target);
        if let Some(marker) = marker {
            request = request.header(IF_MODIFIED_SINCE, marker);
        }

        let response = request.send().await.map_err(FeedError::from_reqwest)?;

        match response.status() {
            StatusCode::NOT_MODIFIED => Ok(FeedResponse::Unchanged),
            StatusCode::OK => {
                let marker = response
                    .headers()
                    .get(LAST_MODIFIED)
                    .and_then(|v| v.to_str().ok())
                    .map(|v| v.to_string());

                let commits: Vec<CommitMetadata> =
                    response.json().await.map_err(FeedError::from_reqwest)?;

                Ok(FeedResponse::Changed { commits, marker })
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(FeedError::UnexpectedStatus {
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }

    async fn commit(
        &self,
        target: &WatchTarget,
        hash: &CommitHash,
    ) -> Result<CommitMetadata, FeedError> {
        let url = format!("{}/{}", self.commits_url(target), hash);

        let response = self
            .get(&url, target)
            .send()
            .await
            .map_err(FeedError::from_reqwest)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(FeedError::UnexpectedStatus { status, body });
        }

        response.json().await.map_err(FeedError::from_reqwest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::extract::{Path, Query};
    use axum::http::{HeaderMap, StatusCode as AxumStatus, header};
    use axum::response::{IntoResponse, Response};
    use axum::routing::get;
    use serde_json::json;
    use std::collections::HashMap;

    const STAMP: &str = "Tue, 15 Nov 1994 12:45:26 GMT";
    const SHA: &str = "9fceb02d0ae598e95dc970b74767f19372d61af8";

    fn authorized(headers: &HeaderMap) -> bool {
        headers
            .get(header::AUTHORIZATION)
            .is_some_and(|v| v == "Bearer ghp_test")
    }

    async fn list_commits(
        Path((owner, repo)): Path<(String, String)>,
        Query(query): Query<HashMap<String, String>>,
        headers: HeaderMap,
    ) -> Response {
        if !authorized(&headers) {
            return AxumStatus::UNAUTHORIZED.into_response();
        }
        let per_page = query.get("per_page").map(String::as_str);
        if owner != "acme" || repo != "widgets" || per_page != Some("1") {
            return AxumStatus::BAD_REQUEST.into_response();
        }

        match query.get("sha").map(String::as_str) {
            Some("broken") => return (AxumStatus::OK, "not json").into_response(),
            Some("slow") => {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            Some("main") | Some("release/1.0") => {}
            _ => return AxumStatus::NOT_FOUND.into_response(),
        }

        if headers
            .get(header::IF_MODIFIED_SINCE)
            .is_some_and(|v| v == STAMP)
        {
            return AxumStatus::NOT_MODIFIED.into_response();
        }

        (
            AxumStatus::OK,
            [(header::LAST_MODIFIED, STAMP)],
            axum::Json(json!([{
                "sha": SHA,
                "html_url": format!("https://github.com/acme/widgets/commit/{}", SHA),
                "commit": { "message": "Fix the build" }
            }])),
        )
            .into_response()
    }

    async fn get_commit(Path((_, _, sha)): Path<(String, String, String)>) -> Response {
        if sha != SHA {
            return (AxumStatus::UNPROCESSABLE_ENTITY, "No commit found").into_response();
        }
        axum::Json(json!({
            "sha": SHA,
            "html_url": format!("https://github.com/acme/widgets/commit/{}", SHA),
        }))
        .into_response()
    }

    async fn serve() -> Url {
        let app = Router::new()
            .route("/repos/{owner}/{repo}/commits", get(list_commits))
            .route("/repos/{owner}/{repo}/commits/{sha}", get(get_commit));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        Url::parse(&format!("http://{}", addr)).unwrap()
    }

    fn target(branch: &str) -> WatchTarget {
        WatchTarget {
            owner: "acme".to_string(),
            repo: "widgets".to_string(),
            branch: branch.to_string(),
            token: Secret::new("ghp_test"),
        }
    }

    async fn feed() -> GitHubFeed {
        GitHubFeed::new(serve().await, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_first_poll_reports_change_and_marker() {
        let feed = feed().await;
        let response = feed.latest(&target("main"), None).await.unwrap();

        match response {
            FeedResponse::Changed { commits, marker } => {
                assert_eq!(commits.len(), 1);
                assert_eq!(commits[0].hash, SHA);
                assert_eq!(marker.as_deref(), Some(STAMP));
            }
            other => panic!("expected a change, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_marker_makes_poll_conditional() {
        let feed = feed().await;
        let response = feed.latest(&target("main"), Some(STAMP)).await.unwrap();
        assert_eq!(response, FeedResponse::Unchanged);

        let stale = feed
            .latest(&target("main"), Some("Mon, 14 Nov 1994 00:00:00 GMT"))
            .await
            .unwrap();
        assert!(matches!(stale, FeedResponse::Changed { .. }));
    }

    #[tokio::test]
    async fn test_branch_name_is_encoded() {
        let feed = feed().await;
        let response = feed.latest(&target("release/1.0"), None).await.unwrap();
        assert!(matches!(response, FeedResponse::Changed { .. }));
    }

    #[tokio::test]
    async fn test_unexpected_status_is_error() {
        let feed = feed().await;
        let err = feed.latest(&target("unknown"), None).await.unwrap_err();
        assert!(matches!(err, FeedError::UnexpectedStatus { status: 404, .. }));

        let mut bad_token = target("main");
        bad_token.token = Secret::new("wrong");
        let err = feed.latest(&bad_token, None).await.unwrap_err();
        assert!(matches!(err, FeedError::UnexpectedStatus { status: 401, .. }));
    }

    #[tokio::test]
    async fn test_undecodable_body() {
        let feed = feed().await;
        let err = feed.latest(&target("broken"), None).await.unwrap_err();
        assert!(matches!(err, FeedError::Parse(_)));
    }

    #[tokio::test]
    async fn test_slow_server_times_out() {
        let feed = GitHubFeed::new(serve().await, Duration::from_millis(200)).unwrap();
        let err = feed.latest(&target("slow"), None).await.unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_unreachable_server() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let url = Url::parse(&format!("http://{}", addr)).unwrap();
        let feed = GitHubFeed::new(url, Duration::from_secs(5)).unwrap();
        let err = feed.latest(&target("main"), None).await.unwrap_err();
        assert!(matches!(err, FeedError::Request(_)));
    }

    #[tokio::test]
    async fn test_commit_detail() {
        let feed = feed().await;
        let hash = CommitHash::parse(SHA).unwrap();
        let commit = feed.commit(&target("main"), &hash).await.unwrap();
        assert_eq!(
            commit.web_url,
            format!("https://github.com/acme/widgets/commit/{}", SHA)
        );

        let other = CommitHash::parse("deadbeefdeadbeef").unwrap();
        let err = feed.commit(&target("main"), &other).await.unwrap_err();
        assert!(matches!(err, FeedError::UnexpectedStatus { status: 422, .. }));
    }
}
