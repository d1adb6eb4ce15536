//! Network retrieval of asset bytes
//!
//! [`AssetFetcher`] is the host's network primitive. [`HttpFetcher`] drives
//! a blocking `ureq` agent on tokio's blocking pool.

use crate::error::{FlagError, FlagResult};
use async_trait::async_trait;

/// Raw outcome of a retrieval
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl FetchResponse {
    pub fn ok(content_type: &str, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            content_type: Some(content_type.to_string()),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Media type without parameters (`image/svg+xml; charset=utf-8` -> `image/svg+xml`)
    pub fn media_type(&self) -> Option<&str> {
        self.content_type
            .as_deref()
            .and_then(|ct| ct.split(';').next())
            .map(str::trim)
            .filter(|ct| !ct.is_empty())
    }
}

/// Host network interface
///
/// Transport failures are `Err`; any HTTP status is `Ok`.
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    async fn request(&self, url: &str) -> FlagResult<FetchResponse>;
}

/// HTTP fetcher backed by `ureq`
#[derive(Clone)]
pub struct HttpFetcher {
    agent: ureq::Agent,
}

impl HttpFetcher {
    pub fn new() -> Self {
        let config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
        }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AssetFetcher for HttpFetcher {
    async fn request(&self, url: &str) -> FlagResult<FetchResponse> {
        let agent = self.agent.clone();
        let url = url.to_string();

        tokio::task::spawn_blocking(move || fetch_blocking(&agent, &url))
            .await
            .map_err(|e| FlagError::Internal(format!("fetch task failed: {}", e)))?
    }
}

fn fetch_blocking(agent: &ureq::Agent, url: &str) -> FlagResult<FetchResponse> {
    let mut response = agent
        .get(url)
        .call()
        .map_err(|e| FlagError::transport(url, e))?;

    let status = response.status().as_u16();
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = response
        .body_mut()
        .read_to_vec()
        .map_err(|e| FlagError::transport(url, e))?;

    Ok(FetchResponse {
        status,
        content_type,
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_range() {
        assert!(FetchResponse::ok("image/svg+xml", b"<svg/>".to_vec()).is_success());

        let not_found = FetchResponse {
            status: 404,
            content_type: None,
            body: Vec::new(),
        };
        assert!(!not_found.is_success());
    }

    #[test]
    fn media_type_strips_parameters() {
        let response = FetchResponse::ok("image/svg+xml; charset=utf-8", Vec::new());
        assert_eq!(response.media_type(), Some("image/svg+xml"));

        let bare = FetchResponse {
            status: 200,
            content_type: Some(" ".to_string()),
            body: Vec::new(),
        };
        assert_eq!(bare.media_type(), None);
    }

    #[tokio::test]
    async fn unreachable_host_is_a_transport_error() {
        let fetcher = HttpFetcher::new();
        let err = fetcher
            .request("http://127.0.0.1:9/1f1e6-1f1fa.svg")
            .await
            .unwrap_err();
        assert!(matches!(err, FlagError::Transport { .. }));
    }
}
