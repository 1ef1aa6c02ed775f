//! Reverse-proxy header normalization.
//!
//! Exactly one proxy sits in front of the service, so only the last value of
//! each `X-Forwarded-*` header is trusted. Anything further left was written
//! by the client and is ignored.

use axum::{
    extract::{ConnectInfo, Request},
    http::{HeaderMap, HeaderValue, Uri, header},
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;

const X_FORWARDED_FOR: &str = "x-forwarded-for";
const X_FORWARDED_PROTO: &str = "x-forwarded-proto";
const X_FORWARDED_HOST: &str = "x-forwarded-host";

/// The request as the client addressed it, before the proxy hop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardedRequest {
    pub client_addr: Option<String>,
    pub scheme: String,
    pub host: Option<String>,
}

impl ForwardedRequest {
    pub fn from_parts(headers: &HeaderMap, uri: &Uri, peer: Option<SocketAddr>) -> Self {
        let client_addr = trusted_hop(headers, X_FORWARDED_FOR)
            .or_else(|| peer.map(|addr| addr.ip().to_string()));

        let scheme = trusted_hop(headers, X_FORWARDED_PROTO)
            .map(|s| s.to_ascii_lowercase())
            .or_else(|| uri.scheme_str().map(str::to_string))
            .unwrap_or_else(|| "http".to_string());

        let host = trusted_hop(headers, X_FORWARDED_HOST)
            .or_else(|| {
                headers
                    .get(header::HOST)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string)
            })
            .or_else(|| uri.authority().map(|a| a.to_string()));

        Self {
            client_addr,
            scheme,
            host,
        }
    }

    /// Absolute URL for `path` when the host is known, else `path` as is
    pub fn absolute_url(&self, path: &str) -> String {
        match self.host {
            Some(ref host) => format!("{}://{}{}", self.scheme, host, path),
            None => path.to_string(),
        }
    }
}

/// Last comma-separated value of a header, trimmed
fn trusted_hop(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(name)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .last()
        .map(str::to_string)
}

/// Rewrite `Host` from the trusted forwarded host and expose the
/// normalized view to handlers as an extension.
pub async fn normalize_forwarded_headers(mut request: Request, next: Next) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    let forwarded = ForwardedRequest::from_parts(request.headers(), request.uri(), peer);

    if let Some(value) = forwarded
        .host
        .as_deref()
        .and_then(|h| HeaderValue::from_str(h).ok())
    {
        request.headers_mut().insert(header::HOST, value);
    }

    tracing::trace!(
        client = ?forwarded.client_addr,
        scheme = %forwarded.scheme,
        host = ?forwarded.host,
        "Forwarded request"
    );

    request.extensions_mut().insert(forwarded);
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(headers: &[(&str, &str)]) -> (HeaderMap, Uri) {
        let mut builder = Request::builder().uri("/api/v1/captcha");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let (parts, _) = builder.body(()).unwrap().into_parts();
        (parts.headers, parts.uri)
    }

    #[test]
    fn test_trusts_only_last_hop() {
        let (headers, uri) = parts(&[
            ("X-Forwarded-For", "6.6.6.6, 203.0.113.7"),
            ("X-Forwarded-Proto", "http, HTTPS"),
            ("X-Forwarded-Host", "evil.example, captcha.example.org"),
            ("Host", "10.0.0.5:8888"),
        ]);

        let forwarded = ForwardedRequest::from_parts(&headers, &uri, None);
        assert_eq!(forwarded.client_addr.as_deref(), Some("203.0.113.7"));
        assert_eq!(forwarded.scheme, "https");
        assert_eq!(forwarded.host.as_deref(), Some("captcha.example.org"));
    }

    #[test]
    fn test_falls_back_to_connection() {
        let (headers, uri) = parts(&[("Host", "localhost:8888")]);
        let peer: SocketAddr = "192.0.2.10:41000".parse().unwrap();

        let forwarded = ForwardedRequest::from_parts(&headers, &uri, Some(peer));
        assert_eq!(forwarded.client_addr.as_deref(), Some("192.0.2.10"));
        assert_eq!(forwarded.scheme, "http");
        assert_eq!(forwarded.host.as_deref(), Some("localhost:8888"));
    }

    #[test]
    fn test_absolute_url() {
        let (headers, uri) = parts(&[
            ("X-Forwarded-Proto", "https"),
            ("X-Forwarded-Host", "captcha.example.org"),
        ]);
        let forwarded = ForwardedRequest::from_parts(&headers, &uri, None);
        assert_eq!(
            forwarded.absolute_url("/api/v1/captcha/abc/image"),
            "https://captcha.example.org/api/v1/captcha/abc/image"
        );

        let (headers, uri) = parts(&[]);
        let forwarded = ForwardedRequest::from_parts(&headers, &uri, None);
        assert_eq!(forwarded.host, None);
        assert_eq!(forwarded.absolute_url("/x"), "/x");
    }
}
