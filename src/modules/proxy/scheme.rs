//! Upstream scheme resolution.

use super::error::{ProxyError, ProxyResult};
use http::HeaderMap;
use std::fmt;
use std::net::SocketAddr;

/// Forwarded-protocol header consulted before the connection's own scheme.
pub const X_FORWARDED_PROTO: &str = "x-forwarded-proto";

/// URL scheme for the upstream request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    /// Plain HTTP.
    Http,
    /// HTTP over TLS.
    Https,
}

impl Scheme {
    /// Parse an exact `http` or `https` token.
    #[must_use]
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "http" => Some(Self::Http),
            "https" => Some(Self::Https),
            _ => None,
        }
    }

    /// Scheme name as written in a URL.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inbound transport details for one connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// Scheme the connection speaks, if known.
    pub scheme: Option<Scheme>,
    /// Remote peer.
    pub peer: Option<SocketAddr>,
}

impl ConnectionInfo {
    /// A plain TCP connection.
    #[must_use]
    pub fn plain(peer: SocketAddr) -> Self {
        Self {
            scheme: Some(Scheme::Http),
            peer: Some(peer),
        }
    }

    /// A TLS-terminated connection.
    #[must_use]
    pub fn tls(peer: SocketAddr) -> Self {
        Self {
            scheme: Some(Scheme::Https),
            peer: Some(peer),
        }
    }
}

/// Pick the upstream scheme.
///
/// An `X-Forwarded-Proto` of exactly `http` or `https` wins when trusted;
/// otherwise the connection's scheme is used.
pub fn resolve(
    headers: &HeaderMap,
    connection: &ConnectionInfo,
    trust_forwarded_proto: bool,
) -> ProxyResult<Scheme> {
    let forwarded = trust_forwarded_proto
        .then(|| headers.get(X_FORWARDED_PROTO))
        .flatten()
        .and_then(|value| value.to_str().ok())
        .and_then(Scheme::from_token);

    forwarded
        .or(connection.scheme)
        .ok_or(ProxyError::SchemeAmbiguous)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn forwarded(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(X_FORWARDED_PROTO, HeaderValue::from_static(value));
        headers
    }

    fn peer() -> SocketAddr {
        "127.0.0.1:50000".parse().unwrap()
    }

    #[test]
    fn test_forwarded_proto_preferred() {
        let scheme = resolve(&forwarded("https"), &ConnectionInfo::plain(peer()), true).unwrap();
        assert_eq!(scheme, Scheme::Https);

        let scheme = resolve(&forwarded("http"), &ConnectionInfo::tls(peer()), true).unwrap();
        assert_eq!(scheme, Scheme::Http);
    }

    #[test]
    fn test_connection_fallback() {
        let headers = HeaderMap::new();
        assert_eq!(
            resolve(&headers, &ConnectionInfo::plain(peer()), true).unwrap(),
            Scheme::Http
        );
        assert_eq!(
            resolve(&headers, &ConnectionInfo::tls(peer()), true).unwrap(),
            Scheme::Https
        );
    }

    #[test]
    fn test_unrecognized_forwarded_value_falls_back() {
        for value in ["HTTPS", "ws", "https, http", ""] {
            let scheme =
                resolve(&forwarded(value), &ConnectionInfo::plain(peer()), true).unwrap();
            assert_eq!(scheme, Scheme::Http, "value {value:?}");
        }
    }

    #[test]
    fn test_untrusted_forwarded_proto_ignored() {
        let scheme = resolve(&forwarded("https"), &ConnectionInfo::plain(peer()), false).unwrap();
        assert_eq!(scheme, Scheme::Http);
    }

    #[test]
    fn test_ambiguous_scheme() {
        let err = resolve(&HeaderMap::new(), &ConnectionInfo::default(), true).unwrap_err();
        assert!(matches!(err, ProxyError::SchemeAmbiguous));

        let err = resolve(&forwarded("ftp"), &ConnectionInfo::default(), true).unwrap_err();
        assert!(matches!(err, ProxyError::SchemeAmbiguous));
    }

    #[test]
    fn test_forwarded_proto_without_connection_scheme() {
        let scheme = resolve(&forwarded("https"), &ConnectionInfo::default(), true).unwrap();
        assert_eq!(scheme, Scheme::Https);
    }
}
