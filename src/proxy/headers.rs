// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Header plumbing between the inbound request, the upstream call and the
//! relayed response.

use axum::{
    body::Body,
    http::{
        header::{CONNECTION, HOST},
        HeaderMap, HeaderName,
    },
    response::Response,
};

use crate::upstream::UpstreamResponse;

/// Inbound headers minus `Host`; the upstream client sets its own.
pub fn outbound_headers(inbound: &HeaderMap) -> HeaderMap {
    let mut headers = inbound.clone();
    headers.remove(HOST);
    headers
}

/// Connection-scoped headers that describe the upstream hop, not the
/// payload.
const HOP_BY_HOP: [&str; 7] = [
    "connection",
    "keep-alive",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Status, end-to-end headers and body as the upstream sent them.
///
/// The body is already buffered, so the upstream's framing is dropped and
/// the server frames the response itself.
pub fn relay(upstream: UpstreamResponse) -> Response {
    let mut response = Response::new(Body::from(upstream.body));
    *response.status_mut() = upstream.status;
    *response.headers_mut() = end_to_end(upstream.headers);
    response
}

fn end_to_end(mut headers: HeaderMap) -> HeaderMap {
    let listed: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Bytes},
        http::{HeaderValue, StatusCode},
    };

    #[test]
    fn host_is_dropped_and_everything_else_kept() {
        let mut inbound = HeaderMap::new();
        inbound.insert(HOST, HeaderValue::from_static("proxy.local:8080"));
        inbound.insert("content-type", HeaderValue::from_static("application/json"));
        inbound.append("x-tag", HeaderValue::from_static("a"));
        inbound.append("x-tag", HeaderValue::from_static("b"));

        let outbound = outbound_headers(&inbound);

        assert!(outbound.get(HOST).is_none());
        assert_eq!(outbound["content-type"], "application/json");
        let tags: Vec<_> = outbound.get_all("x-tag").iter().collect();
        assert_eq!(tags, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn relay_copies_status_headers_and_body() {
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", HeaderValue::from_static("30"));
        headers.append("set-cookie", HeaderValue::from_static("a=1"));
        headers.append("set-cookie", HeaderValue::from_static("b=2"));

        let response = relay(UpstreamResponse {
            status: StatusCode::SERVICE_UNAVAILABLE,
            headers,
            body: Bytes::from_static(b"overloaded"),
        });

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers()["retry-after"], "30");
        assert_eq!(response.headers().get_all("set-cookie").iter().count(), 2);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"overloaded");
    }

    #[test]
    fn relay_drops_upstream_framing_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("transfer-encoding", HeaderValue::from_static("chunked"));
        headers.insert(CONNECTION, HeaderValue::from_static("keep-alive, x-hop"));
        headers.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        headers.insert("x-hop", HeaderValue::from_static("1"));
        headers.insert("trailer", HeaderValue::from_static("x-checksum"));
        headers.insert("content-type", HeaderValue::from_static("text/plain"));
        headers.insert("x-up", HeaderValue::from_static("1"));

        let response = relay(UpstreamResponse {
            status: StatusCode::CREATED,
            headers,
            body: Bytes::from_static(b"hello"),
        });

        let relayed = response.headers();
        for name in ["transfer-encoding", "connection", "keep-alive", "x-hop", "trailer"] {
            assert!(relayed.get(name).is_none(), "{name} was relayed");
        }
        assert_eq!(relayed["content-type"], "text/plain");
        assert_eq!(relayed["x-up"], "1");
    }
}
