//! Responses written back to the caller.

use super::config::{FORWARDED_RESPONSE_HEADERS, RATE_LIMITED_BODY};
use super::upstream::UpstreamResponse;
use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};

/// Response type produced by the proxy.
pub type ProxyResponse = Response<Full<Bytes>>;

/// Status and body with no headers.
fn with_status(status: StatusCode, body: Bytes) -> ProxyResponse {
    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    response
}

/// 429 with the fixed rejection body.
#[must_use]
pub fn rate_limited() -> ProxyResponse {
    with_status(
        StatusCode::TOO_MANY_REQUESTS,
        Bytes::from_static(RATE_LIMITED_BODY.as_bytes()),
    )
}

/// 500 with an empty body.
#[must_use]
pub fn internal_error() -> ProxyResponse {
    with_status(StatusCode::INTERNAL_SERVER_ERROR, Bytes::new())
}

/// 400 with an empty body.
#[must_use]
pub fn bad_request() -> ProxyResponse {
    with_status(StatusCode::BAD_REQUEST, Bytes::new())
}

/// Translate a well-formed upstream response.
///
/// An upstream 429 becomes the local rejection. Anything else keeps its
/// status and body and only the allow-listed headers.
#[must_use]
pub fn translate(upstream: UpstreamResponse) -> ProxyResponse {
    if upstream.status == StatusCode::TOO_MANY_REQUESTS {
        return rate_limited();
    }

    let mut response = with_status(upstream.status, upstream.body);
    let headers = response.headers_mut();
    for name in &FORWARDED_RESPONSE_HEADERS {
        if let Some(value) = upstream.headers.get(name) {
            if !value.is_empty() {
                headers.insert(name.clone(), value.clone());
            }
        }
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::{CONTENT_TYPE, DATE, LOCATION};
    use http::HeaderValue;
    use http_body_util::BodyExt;

    async fn body_of(response: ProxyResponse) -> Bytes {
        response.into_body().collect().await.unwrap().to_bytes()
    }

    #[tokio::test]
    async fn test_rate_limited_shape() {
        let response = rate_limited();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().is_empty());
        assert_eq!(body_of(response).await, RATE_LIMITED_BODY.as_bytes());
    }

    #[tokio::test]
    async fn test_empty_error_bodies() {
        let response = internal_error();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body_of(response).await.is_empty());

        let response = bad_request();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_of(response).await.is_empty());
    }

    #[tokio::test]
    async fn test_translate_filters_headers() {
        let mut upstream = UpstreamResponse::new(StatusCode::OK, "hello");
        upstream
            .headers
            .insert("x-custom", HeaderValue::from_static("1"));
        upstream
            .headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        upstream.headers.insert(
            DATE,
            HeaderValue::from_static("Sun, 18 Oct 2026 12:00:00 GMT"),
        );
        upstream
            .headers
            .insert("content-encoding", HeaderValue::from_static("gzip"));

        let response = translate(upstream);
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "text/plain");
        assert_eq!(response.headers()[DATE], "Sun, 18 Oct 2026 12:00:00 GMT");
        assert!(response.headers().get("x-custom").is_none());
        assert!(response.headers().get("content-encoding").is_none());
        assert_eq!(body_of(response).await, "hello");
    }

    #[tokio::test]
    async fn test_translate_passes_errors_through() {
        let mut upstream = UpstreamResponse::new(StatusCode::NOT_FOUND, "missing");
        upstream
            .headers
            .insert(LOCATION, HeaderValue::from_static("/elsewhere"));

        let response = translate(upstream);
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()[LOCATION], "/elsewhere");
        assert_eq!(body_of(response).await, "missing");
    }

    #[tokio::test]
    async fn test_translate_replaces_upstream_429_body() {
        let mut upstream = UpstreamResponse::new(StatusCode::TOO_MANY_REQUESTS, "upstream says no");
        upstream
            .headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));

        let response = translate(upstream);
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body_of(response).await, RATE_LIMITED_BODY.as_bytes());
    }

    #[tokio::test]
    async fn test_translate_empty_body() {
        let response = translate(UpstreamResponse::new(StatusCode::NO_CONTENT, Bytes::new()));
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(body_of(response).await.is_empty());
    }
}
