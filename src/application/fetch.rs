//! Downloads notebook files from their source-control web URLs.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, Url};
use thiserror::Error;
use tracing::{info, warn};

const GITHUB_HOSTS: [&str; 2] = ["github.com", "www.github.com"];
const RAW_CONTENT_HOST: &str = "raw.githubusercontent.com";

pub const DEFAULT_USER_AGENT: &str = concat!("nbpress/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid notebook URL `{url}`: {source}")]
    Url {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("request for `{url}` failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("request for `{url}` returned status {status}")]
    Status { url: String, status: u16 },
    #[error("request for `{url}` returned an empty body")]
    EmptyBody { url: String },
}

/// Anything that can produce raw notebook text for a source URL.
#[async_trait]
pub trait NotebookSource: Send + Sync {
    async fn fetch(&self, source_url: &str) -> Result<String, FetchError>;
}

/// Rewrite a GitHub web URL to its raw-content form.
///
/// `https://github.com/u/r/blob/main/a.ipynb` becomes
/// `https://raw.githubusercontent.com/u/r/main/a.ipynb`. Non-GitHub hosts keep
/// their host; the `/blob/` marker is removed either way.
pub fn raw_content_url(source_url: &str) -> Result<Url, FetchError> {
    let mut url = Url::parse(source_url).map_err(|source| FetchError::Url {
        url: source_url.to_string(),
        source,
    })?;

    if url
        .host_str()
        .is_some_and(|host| GITHUB_HOSTS.contains(&host))
    {
        url.set_host(Some(RAW_CONTENT_HOST))
            .map_err(|source| FetchError::Url {
                url: source_url.to_string(),
                source,
            })?;
    }

    if url.path().contains("/blob/") {
        let path = url.path().replacen("/blob/", "/", 1);
        url.set_path(&path);
    }

    Ok(url)
}

/// HTTP fetcher for GitHub-hosted notebooks.
#[derive(Debug, Clone)]
pub struct GithubFetcher {
    client: Client,
}

impl GithubFetcher {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl NotebookSource for GithubFetcher {
    async fn fetch(&self, source_url: &str) -> Result<String, FetchError> {
        let started_at = Instant::now();
        let url = raw_content_url(source_url)?;
        let raw_url = url.to_string();

        let http_error = |source| FetchError::Http {
            url: raw_url.clone(),
            source,
        };

        let response = self.client.get(url).send().await.map_err(http_error)?;
        let status = response.status();
        if !status.is_success() {
            warn!(
                target = "application::fetch",
                op = "fetch::notebook",
                result = "error",
                status = status.as_u16(),
                url = %raw_url,
                elapsed_ms = started_at.elapsed().as_millis() as u64,
                "Notebook download rejected"
            );
            return Err(FetchError::Status {
                url: raw_url,
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(http_error)?;
        if body.is_empty() {
            return Err(FetchError::EmptyBody { url: raw_url });
        }

        info!(
            target = "application::fetch",
            op = "fetch::notebook",
            result = "ok",
            url = %raw_url,
            body_bytes = body.len(),
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            "Notebook downloaded"
        );

        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::MockServer;

    fn fetcher() -> GithubFetcher {
        GithubFetcher::new(Duration::from_secs(5), DEFAULT_USER_AGENT).expect("fetcher")
    }

    #[test]
    fn rewrites_github_blob_urls() {
        let url = raw_content_url("https://github.com/user/repo/blob/main/posts/a.ipynb")
            .expect("url");
        assert_eq!(
            url.as_str(),
            "https://raw.githubusercontent.com/user/repo/main/posts/a.ipynb"
        );
    }

    #[test]
    fn leaves_raw_urls_alone() {
        let raw = "https://raw.githubusercontent.com/user/repo/main/a.ipynb";
        assert_eq!(raw_content_url(raw).expect("url").as_str(), raw);
    }

    #[test]
    fn rejects_unparseable_urls() {
        assert!(matches!(
            raw_content_url("not a url"),
            Err(FetchError::Url { .. })
        ));
    }

    #[tokio::test]
    async fn downloads_body_from_rewritten_path() {
        let server = MockServer::start_async().await;
        let mock = server.mock_async(|when, then| {
            when.method("GET").path("/user/repo/main/a.ipynb");
            then.status(200).body(r#"{"cells": []}"#);
        })
        .await;

        let body = fetcher()
            .fetch(&server.url("/user/repo/blob/main/a.ipynb"))
            .await
            .expect("body");

        mock.assert_async().await;
        assert_eq!(body, r#"{"cells": []}"#);
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let server = MockServer::start_async().await;
        server.mock_async(|when, then| {
            when.method("GET");
            then.status(404);
        })
        .await;

        let err = fetcher()
            .fetch(&server.url("/missing.ipynb"))
            .await
            .expect_err("404");
        assert!(matches!(err, FetchError::Status { status: 404, .. }));
    }

    #[tokio::test]
    async fn empty_body_is_an_error() {
        let server = MockServer::start_async().await;
        server.mock_async(|when, then| {
            when.method("GET");
            then.status(200).body("");
        })
        .await;

        let err = fetcher()
            .fetch(&server.url("/empty.ipynb"))
            .await
            .expect_err("empty");
        assert!(matches!(err, FetchError::EmptyBody { .. }));
    }
}
