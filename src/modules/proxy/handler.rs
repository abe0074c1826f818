//! Per-request proxy state machine.

use super::error::ProxyError;
use super::response::{self, ProxyResponse};
use super::scheme::{self, ConnectionInfo};
use super::upstream::{Upstream, UpstreamRequest};
use crate::modules::rate_limiting::RateLimiter;
use bytes::Bytes;
use http::header::HOST;
use http::request::Parts;
use http_body_util::BodyExt;
use hyper::body::Body;
use hyper::{Request, StatusCode};
use std::fmt::Display;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Proxy statistics.
#[derive(Debug, Default)]
pub struct ProxyStats {
    /// Requests received.
    pub requests_total: AtomicU64,
    /// Requests sent upstream that got a response.
    pub forwarded: AtomicU64,
    /// Requests rejected by the local limiter.
    pub rate_limited: AtomicU64,
    /// Upstream 429s replaced with the local rejection.
    pub upstream_rate_limited: AtomicU64,
    /// Upstream calls with no well-formed response.
    pub transport_failures: AtomicU64,
    /// Requests whose upstream scheme could not be determined.
    pub scheme_failures: AtomicU64,
    /// Requests answered with 400.
    pub bad_requests: AtomicU64,
    /// Open inbound connections.
    pub active_connections: AtomicU64,
}

impl ProxyStats {
    /// Create new stats.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a connection opened.
    pub fn connection_opened(&self) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a connection closed.
    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Forwards admitted requests to the host they were addressed to.
///
/// Holds a reference to the process-wide limiter; every admission decision
/// goes through [`RateLimiter::allow`].
#[derive(Debug)]
pub struct ProxyHandler {
    limiter: Arc<RateLimiter>,
    upstream: Arc<dyn Upstream>,
    trust_forwarded_proto: bool,
    stats: Arc<ProxyStats>,
}

impl ProxyHandler {
    /// Create a handler.
    #[must_use]
    pub fn new(limiter: Arc<RateLimiter>, upstream: Arc<dyn Upstream>) -> Self {
        Self {
            limiter,
            upstream,
            trust_forwarded_proto: true,
            stats: Arc::new(ProxyStats::new()),
        }
    }

    /// Whether `X-Forwarded-Proto` is consulted.
    #[must_use]
    pub fn with_trust_forwarded_proto(mut self, trust: bool) -> Self {
        self.trust_forwarded_proto = trust;
        self
    }

    /// Get statistics.
    #[must_use]
    pub fn stats(&self) -> &Arc<ProxyStats> {
        &self.stats
    }

    /// Get the limiter.
    #[must_use]
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Read the whole body, then [`handle`](Self::handle) the request.
    ///
    /// A body that cannot be read is answered with 400.
    pub async fn serve<B>(&self, request: Request<B>, connection: &ConnectionInfo) -> ProxyResponse
    where
        B: Body,
        B::Error: Display,
    {
        let (parts, body) = request.into_parts();
        match body.collect().await {
            Ok(collected) => {
                self.handle(Request::from_parts(parts, collected.to_bytes()), connection)
                    .await
            }
            Err(e) => {
                ProxyStats::incr(&self.stats.requests_total);
                self.client_error(&ProxyError::BodyRead(e.to_string()), &parts)
            }
        }
    }

    /// Run one request through limit check, forwarding and translation.
    ///
    /// Always produces exactly one response. A token consumed by the limiter
    /// is not returned if forwarding later fails.
    pub async fn handle(&self, request: Request<Bytes>, connection: &ConnectionInfo) -> ProxyResponse {
        ProxyStats::incr(&self.stats.requests_total);

        let (parts, body) = request.into_parts();

        let Some(host) = target_host(&parts) else {
            return self.client_error(&ProxyError::MissingHost, &parts);
        };

        if !self.limiter.allow(&host) {
            ProxyStats::incr(&self.stats.rate_limited);
            info!(%host, method = %parts.method, "Request rejected by rate limit");
            return response::rate_limited();
        }

        let scheme = match scheme::resolve(&parts.headers, connection, self.trust_forwarded_proto) {
            Ok(scheme) => scheme,
            Err(e) => {
                ProxyStats::incr(&self.stats.scheme_failures);
                warn!(%host, peer = ?connection.peer, error = %e, "Cannot forward request");
                return response::internal_error();
            }
        };

        let path = parts
            .uri
            .path_and_query()
            .map_or("/", |path_and_query| path_and_query.as_str());
        let url = format!("{scheme}://{host}{path}");

        let request = UpstreamRequest {
            method: parts.method,
            url,
            headers: parts.headers,
            body,
        };
        let method = request.method.clone();

        match self.upstream.forward(request).await {
            Ok(upstream) => {
                ProxyStats::incr(&self.stats.forwarded);
                if upstream.status == StatusCode::TOO_MANY_REQUESTS {
                    ProxyStats::incr(&self.stats.upstream_rate_limited);
                    info!(%host, "Upstream rate limit reached");
                }
                debug!(%host, %method, status = upstream.status.as_u16(), "Request forwarded");
                response::translate(upstream)
            }
            Err(e) => {
                ProxyStats::incr(&self.stats.transport_failures);
                warn!(%host, %method, error = %e, "Upstream request failed");
                response::internal_error()
            }
        }
    }

    fn client_error(&self, error: &ProxyError, parts: &Parts) -> ProxyResponse {
        ProxyStats::incr(&self.stats.bad_requests);
        debug!(method = %parts.method, uri = %parts.uri, error = %error, "Bad request");
        response::bad_request()
    }
}

/// Target authority: the absolute-form URI first, then `Host`.
fn target_host(parts: &Parts) -> Option<String> {
    let host = match parts.uri.authority() {
        Some(authority) => authority.as_str(),
        None => parts.headers.get(HOST)?.to_str().ok()?,
    };

    let host = host.trim();
    (!host.is_empty()).then(|| host.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::proxy::config::RATE_LIMITED_BODY;
    use crate::modules::proxy::error::ProxyResult;
    use crate::modules::proxy::upstream::UpstreamResponse;
    use crate::modules::rate_limiting::{HostLimit, ManualClock, RateLimitConfig};
    use async_trait::async_trait;
    use http::header::{CONTENT_TYPE, DATE};
    use http::{HeaderValue, Method};
    use http_body_util::Full;
    use std::sync::Mutex;

    /// Records every request and answers with a canned outcome.
    #[derive(Debug)]
    struct RecordingUpstream {
        outcome: Mutex<Option<ProxyResult<UpstreamResponse>>>,
        requests: Mutex<Vec<UpstreamRequest>>,
    }

    impl RecordingUpstream {
        fn responding(response: UpstreamResponse) -> Arc<Self> {
            Arc::new(Self {
                outcome: Mutex::new(Some(Ok(response))),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn failing(error: ProxyError) -> Arc<Self> {
            Arc::new(Self {
                outcome: Mutex::new(Some(Err(error))),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        fn last(&self) -> UpstreamRequest {
            self.requests.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl Upstream for RecordingUpstream {
        async fn forward(&self, request: UpstreamRequest) -> ProxyResult<UpstreamResponse> {
            self.requests.lock().unwrap().push(request);
            match self.outcome.lock().unwrap().as_ref() {
                Some(Ok(response)) => Ok(response.clone()),
                Some(Err(ProxyError::Transport(message))) => {
                    Err(ProxyError::Transport(message.clone()))
                }
                _ => Err(ProxyError::Transport("no outcome".to_string())),
            }
        }
    }

    fn limiter(hosts: &[(&str, f64)]) -> Arc<RateLimiter> {
        let config = hosts
            .iter()
            .fold(RateLimitConfig::new(), |config, (host, rate)| {
                config.with_host(HostLimit::new(*host, *rate))
            });
        Arc::new(RateLimiter::with_clock(&config, Arc::new(ManualClock::new())).unwrap())
    }

    fn ok_upstream() -> Arc<RecordingUpstream> {
        RecordingUpstream::responding(UpstreamResponse::new(StatusCode::OK, "ok"))
    }

    fn request(host: &str, uri: &str) -> Request<Bytes> {
        Request::builder()
            .uri(uri)
            .header(HOST, host)
            .body(Bytes::new())
            .unwrap()
    }

    fn plain() -> ConnectionInfo {
        ConnectionInfo::plain("127.0.0.1:40000".parse().unwrap())
    }

    async fn body_of(response: ProxyResponse) -> Bytes {
        response.into_body().collect().await.unwrap().to_bytes()
    }

    #[tokio::test]
    async fn test_forwards_to_same_host() {
        let upstream = ok_upstream();
        let handler = ProxyHandler::new(limiter(&[]), upstream.clone());

        let response = handler
            .handle(request("example.org", "/v1/items?page=2"), &plain())
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_of(response).await, "ok");
        assert_eq!(upstream.last().url, "http://example.org/v1/items?page=2");
        assert_eq!(handler.stats().forwarded.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_local_rejection_skips_upstream() {
        let upstream = ok_upstream();
        let handler = ProxyHandler::new(limiter(&[("api.twitter.com", 1.0)]), upstream.clone());

        let first = handler.handle(request("api.twitter.com", "/"), &plain()).await;
        assert_eq!(first.status(), StatusCode::OK);

        let second = handler.handle(request("api.twitter.com", "/"), &plain()).await;
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body_of(second).await, RATE_LIMITED_BODY.as_bytes());

        assert_eq!(upstream.calls(), 1);
        assert_eq!(handler.stats().rate_limited.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_exhausted_bucket_never_calls_upstream() {
        let upstream = ok_upstream();
        let handler = ProxyHandler::new(limiter(&[("bsapi.vmaibo.com", 2.0)]), upstream.clone());
        handler.limiter().allow("bsapi.vmaibo.com");
        handler.limiter().allow("bsapi.vmaibo.com");

        for _ in 0..5 {
            let response = handler.handle(request("bsapi.vmaibo.com", "/"), &plain()).await;
            assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        }
        assert_eq!(upstream.calls(), 0);
    }

    #[tokio::test]
    async fn test_header_allow_list() {
        let mut canned = UpstreamResponse::new(StatusCode::OK, "text");
        canned.headers.insert("x-custom", HeaderValue::from_static("1"));
        canned
            .headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        canned.headers.insert(
            DATE,
            HeaderValue::from_static("Sun, 18 Oct 2026 12:00:00 GMT"),
        );
        let handler = ProxyHandler::new(limiter(&[]), RecordingUpstream::responding(canned));

        let response = handler.handle(request("example.org", "/"), &plain()).await;
        assert!(response.headers().contains_key(CONTENT_TYPE));
        assert!(response.headers().contains_key(DATE));
        assert!(!response.headers().contains_key("x-custom"));
    }

    #[tokio::test]
    async fn test_upstream_429_body_substituted() {
        let upstream = RecordingUpstream::responding(UpstreamResponse::new(
            StatusCode::TOO_MANY_REQUESTS,
            "upstream says no",
        ));
        let handler = ProxyHandler::new(limiter(&[]), upstream);

        let response = handler.handle(request("example.org", "/"), &plain()).await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body_of(response).await, RATE_LIMITED_BODY.as_bytes());
        assert_eq!(handler.stats().upstream_rate_limited.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_upstream_error_passed_through() {
        let upstream = RecordingUpstream::responding(UpstreamResponse::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "down for maintenance",
        ));
        let handler = ProxyHandler::new(limiter(&[]), upstream);

        let response = handler.handle(request("example.org", "/"), &plain()).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_of(response).await, "down for maintenance");
    }

    #[tokio::test]
    async fn test_forwarded_proto_preferred() {
        let upstream = ok_upstream();
        let handler = ProxyHandler::new(limiter(&[]), upstream.clone());

        let mut req = request("example.org", "/secure");
        req.headers_mut()
            .insert("x-forwarded-proto", HeaderValue::from_static("https"));
        handler.handle(req, &plain()).await;

        assert_eq!(upstream.last().url, "https://example.org/secure");
    }

    #[tokio::test]
    async fn test_connection_scheme_fallback() {
        let upstream = ok_upstream();
        let handler = ProxyHandler::new(limiter(&[]), upstream.clone());

        handler.handle(request("example.org", "/"), &plain()).await;
        assert_eq!(upstream.last().url, "http://example.org/");

        let tls = ConnectionInfo::tls("127.0.0.1:40001".parse().unwrap());
        handler.handle(request("example.org", "/"), &tls).await;
        assert_eq!(upstream.last().url, "https://example.org/");
    }

    #[tokio::test]
    async fn test_ambiguous_scheme_is_500() {
        let upstream = ok_upstream();
        let handler = ProxyHandler::new(limiter(&[]), upstream.clone());

        let response = handler
            .handle(request("example.org", "/"), &ConnectionInfo::default())
            .await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body_of(response).await.is_empty());
        assert_eq!(upstream.calls(), 0);
        assert_eq!(handler.stats().scheme_failures.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_transport_failure_is_empty_500() {
        let upstream = RecordingUpstream::failing(ProxyError::Transport(
            "connection refused".to_string(),
        ));
        let handler = ProxyHandler::new(limiter(&[("example.org", 1.0)]), upstream.clone());

        let response = handler.handle(request("example.org", "/"), &plain()).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body_of(response).await.is_empty());
        assert_eq!(handler.stats().transport_failures.load(Ordering::Relaxed), 1);

        // The consumed token is not refunded.
        let response = handler.handle(request("example.org", "/"), &plain()).await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(upstream.calls(), 1);
    }

    #[tokio::test]
    async fn test_method_headers_and_body_copied() {
        let upstream = ok_upstream();
        let handler = ProxyHandler::new(limiter(&[]), upstream.clone());

        let req = Request::builder()
            .method(Method::PUT)
            .uri("/resource")
            .header(HOST, "example.org")
            .header("x-trace", "abc")
            .header(CONTENT_TYPE, "application/json")
            .body(Bytes::from_static(b"{\"a\":1}"))
            .unwrap();
        handler.handle(req, &plain()).await;

        let sent = upstream.last();
        assert_eq!(sent.method, Method::PUT);
        assert_eq!(sent.headers["x-trace"], "abc");
        assert_eq!(sent.headers[HOST], "example.org");
        assert_eq!(sent.headers[CONTENT_TYPE], "application/json");
        assert_eq!(sent.body, Bytes::from_static(b"{\"a\":1}"));
    }

    #[tokio::test]
    async fn test_non_standard_method() {
        let upstream = ok_upstream();
        let handler = ProxyHandler::new(limiter(&[]), upstream.clone());

        let req = Request::builder()
            .method(Method::from_bytes(b"PURGE").unwrap())
            .uri("/cache")
            .header(HOST, "example.org")
            .body(Bytes::new())
            .unwrap();
        let response = handler.handle(req, &plain()).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(upstream.last().method.as_str(), "PURGE");
    }

    #[tokio::test]
    async fn test_absolute_form_authority() {
        let upstream = ok_upstream();
        let handler = ProxyHandler::new(limiter(&[("api.twitter.com", 1.0)]), upstream.clone());

        let req = Request::builder()
            .uri("http://api.twitter.com/1.1/statuses")
            .body(Bytes::new())
            .unwrap();
        handler.handle(req, &plain()).await;
        assert_eq!(upstream.last().url, "http://api.twitter.com/1.1/statuses");

        let req = Request::builder()
            .uri("http://api.twitter.com/1.1/statuses")
            .body(Bytes::new())
            .unwrap();
        let response = handler.handle(req, &plain()).await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_host_with_port_shares_bucket() {
        let upstream = ok_upstream();
        let handler = ProxyHandler::new(limiter(&[("graph.facebook.com", 1.0)]), upstream.clone());

        handler
            .handle(request("graph.facebook.com:8080", "/"), &plain())
            .await;
        assert_eq!(upstream.last().url, "http://graph.facebook.com:8080/");

        let response = handler.handle(request("Graph.Facebook.com", "/"), &plain()).await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_missing_host_is_400() {
        let upstream = ok_upstream();
        let handler = ProxyHandler::new(limiter(&[]), upstream.clone());

        let req = Request::builder().uri("/").body(Bytes::new()).unwrap();
        let response = handler.handle(req, &plain()).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_of(response).await.is_empty());
        assert_eq!(upstream.calls(), 0);
        assert_eq!(handler.stats().bad_requests.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_serve_collects_body() {
        let upstream = ok_upstream();
        let handler = ProxyHandler::new(limiter(&[]), upstream.clone());

        let req = Request::builder()
            .method(Method::POST)
            .uri("/submit")
            .header(HOST, "example.org")
            .body(Full::new(Bytes::from_static(b"payload")))
            .unwrap();
        let response = handler.serve(req, &plain()).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(upstream.last().body, Bytes::from_static(b"payload"));
        assert_eq!(handler.stats().requests_total.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_untrusted_forwarded_proto() {
        let upstream = ok_upstream();
        let handler =
            ProxyHandler::new(limiter(&[]), upstream.clone()).with_trust_forwarded_proto(false);

        let mut req = request("example.org", "/");
        req.headers_mut()
            .insert("x-forwarded-proto", HeaderValue::from_static("https"));
        handler.handle(req, &plain()).await;

        assert_eq!(upstream.last().url, "http://example.org/");
    }
}
