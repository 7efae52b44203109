// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Signing Forwarder
//!
//! Per request: read the raw body, sign it with a fresh nonce and
//! timestamp, forward it to the upstream, relay whatever comes back.
//!
//! ```text
//! received -> signed -> forwarded -> relayed(status, headers, body)
//!                                 \-> abandoned (logged + reported, no response)
//! ```
//!
//! Upstream 4xx/5xx responses are relayed like any other. Only a missing
//! upstream response (or an internal failure before forwarding) abandons
//! the request; no status is invented for the caller.

use std::net::SocketAddr;

use axum::{
    body::to_bytes,
    extract::{ConnectInfo, Request, State},
    http::{request::Parts, Method, Version},
    response::Response,
};
use tracing::{error, info, warn};

use super::headers::{outbound_headers, relay};
use crate::error::ForwardError;
use crate::reporter::FailureEvent;
use crate::state::ProxyState;

/// What gets logged about each exchange.
#[derive(Debug, Clone)]
struct Exchange {
    method: Method,
    version: Version,
    target: String,
    caller: Option<SocketAddr>,
}

impl Exchange {
    fn caller_ip(&self) -> String {
        self.caller
            .map(|addr| addr.ip().to_string())
            .unwrap_or_default()
    }

    fn version_text(&self) -> String {
        format!("{:?}", self.version)
    }

    fn log_relayed(&self, status: u16) {
        if status >= 400 {
            warn!(
                protocol = "HTTP",
                http_version = %self.version_text(),
                method = %self.method,
                status,
                target = %self.target,
                caller_ip = %self.caller_ip(),
                "Upstream answered with error status"
            );
        } else {
            info!(
                protocol = "HTTP",
                http_version = %self.version_text(),
                method = %self.method,
                status,
                target = %self.target,
                caller_ip = %self.caller_ip(),
                "Request relayed"
            );
        }
    }

    fn log_failure(&self, error: &ForwardError) {
        error!(
            method = %self.method,
            target = %self.target,
            caller_ip = %self.caller_ip(),
            error = %error,
            "Proxy internal error"
        );
    }
}

/// Fallback handler for every method and path.
pub async fn forward(
    State(state): State<ProxyState>,
    request: Request,
) -> Result<Response, ForwardError> {
    let caller = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let (parts, body) = request.into_parts();

    let exchange = Exchange {
        method: parts.method.clone(),
        version: parts.version,
        target: state.upstream.target_url(path_and_query(&parts)),
        caller,
    };

    let result = match to_bytes(body, usize::MAX).await {
        Ok(body) => relay_signed(&state, &parts, body).await,
        Err(e) => Err(ForwardError::ReadBody(e)),
    };

    match result {
        Ok(response) => {
            exchange.log_relayed(response.status().as_u16());
            Ok(response)
        }
        Err(e) => {
            exchange.log_failure(&e);
            state.reporter.capture(
                FailureEvent::error("Proxy Internal Error")
                    .with_error(&e)
                    .with_context("url", exchange.target.clone())
                    .with_context("method", exchange.method.to_string()),
            );
            Err(e)
        }
    }
}

async fn relay_signed(
    state: &ProxyState,
    parts: &Parts,
    body: axum::body::Bytes,
) -> Result<Response, ForwardError> {
    let signature = state.signer.sign(&body)?;

    let mut headers = outbound_headers(&parts.headers);
    signature.apply(&mut headers);

    let upstream = state
        .upstream
        .send(parts.method.clone(), path_and_query(parts), headers, body)
        .await?;

    Ok(relay(upstream))
}

fn path_and_query(parts: &Parts) -> &str {
    parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/")
}
