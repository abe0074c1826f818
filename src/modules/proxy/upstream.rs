//! Upstream HTTP client.

use super::config::UpstreamConfig;
use super::error::{ProxyError, ProxyResult};
use async_trait::async_trait;
use bytes::Bytes;
use http::header::HOST;
use http::{HeaderMap, Method, StatusCode};
use reqwest::redirect::Policy;
use std::fmt::Debug;
use tracing::debug;

/// Request to send upstream.
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    /// Inbound method, including non-standard ones.
    pub method: Method,
    /// Absolute `scheme://host/path?query` URL.
    pub url: String,
    /// Inbound headers, unmodified. [`HttpUpstream`] drops `Host` and lets
    /// the client derive it from `url`.
    pub headers: HeaderMap,
    /// Inbound body.
    pub body: Bytes,
}

/// A well-formed HTTP response from upstream, of any status.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    /// Status code.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Response body.
    pub body: Bytes,
}

impl UpstreamResponse {
    /// Response with no headers.
    #[must_use]
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }
}

/// Issues one upstream request per admitted inbound request.
///
/// `Ok` covers every well-formed response, 4xx and 5xx included. Anything
/// else is [`ProxyError::Transport`] or [`ProxyError::InvalidRequest`].
#[async_trait]
pub trait Upstream: Send + Sync + Debug {
    /// Send the request and read the full response.
    async fn forward(&self, request: UpstreamRequest) -> ProxyResult<UpstreamResponse>;
}

/// [`Upstream`] backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpUpstream {
    client: reqwest::Client,
}

impl HttpUpstream {
    /// Build the client from configuration.
    pub fn new(config: &UpstreamConfig) -> ProxyResult<Self> {
        let redirect = if config.follow_redirects {
            Policy::limited(config.max_redirects)
        } else {
            Policy::none()
        };

        let client = reqwest::ClientBuilder::new()
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .redirect(redirect)
            .no_proxy()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| ProxyError::InvalidConfig(format!("upstream client: {e}")))?;

        Ok(Self { client })
    }

    /// Wrap an existing client.
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn forward(&self, request: UpstreamRequest) -> ProxyResult<UpstreamResponse> {
        let UpstreamRequest {
            method,
            url,
            mut headers,
            body,
        } = request;

        // The url carries the same authority. A copied Host would follow
        // redirects to other origins.
        headers.remove(HOST);

        let request = self
            .client
            .request(method, url.as_str())
            .headers(headers)
            .body(body)
            .build()
            .map_err(|e| ProxyError::InvalidRequest(e.to_string()))?;

        let response = self
            .client
            .execute(request)
            .await
            .map_err(|e| ProxyError::Transport(e.to_string()))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| ProxyError::Transport(e.to_string()))?;

        debug!(%url, status = status.as_u16(), bytes = body.len(), "Upstream responded");

        Ok(UpstreamResponse {
            status,
            headers,
            body,
        })
    }
}
