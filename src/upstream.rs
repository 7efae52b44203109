// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Outbound HTTP client bound to the upstream metrics service.
//!
//! Any HTTP status is a successful round-trip. Only a missing response
//! (DNS failure, refused connection, timeout, broken body) is an error,
//! and it is always [`UpstreamError::NoResponse`].

use std::time::Duration;

use axum::body::Bytes;
use axum::http::{HeaderMap, Method, StatusCode};
use reqwest::{redirect, Client};
use url::Url;

/// Used when `CUSTOM_REQUEST_TIMEOUT_MS` is not set.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),

    #[error("no response from {url}: {source}")]
    NoResponse {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

impl UpstreamError {
    /// Best-effort short cause, used for operator-facing messages.
    pub fn cause_text(&self) -> String {
        let source = match self {
            UpstreamError::Build(e) | UpstreamError::NoResponse { source: e, .. } => e,
        };
        if source.is_timeout() {
            "timeout".to_string()
        } else if source.is_connect() {
            format!("connection failed: {source}")
        } else {
            source.to_string()
        }
    }
}

/// A complete upstream response, body fully buffered.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Reusable, connection-pooled client. Cloning shares the pool.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    base_url: String,
    http: Client,
}

impl UpstreamClient {
    pub fn new(base_url: &Url, timeout: Duration) -> Result<Self, UpstreamError> {
        let http = Client::builder()
            .timeout(timeout)
            .redirect(redirect::Policy::none())
            .build()
            .map_err(UpstreamError::Build)?;

        Ok(Self {
            base_url: base_url.as_str().trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Base URL joined with an origin-form request target (`/path?query`).
    pub fn target_url(&self, path_and_query: &str) -> String {
        if path_and_query.starts_with('/') {
            format!("{}{}", self.base_url, path_and_query)
        } else {
            format!("{}/{}", self.base_url, path_and_query)
        }
    }

    pub async fn get(&self, path_and_query: &str) -> Result<UpstreamResponse, UpstreamError> {
        self.send(Method::GET, path_and_query, HeaderMap::new(), Bytes::new())
            .await
    }

    /// Perform one request. Never retried.
    pub async fn send(
        &self,
        method: Method,
        path_and_query: &str,
        headers: HeaderMap,
        body: Bytes,
    ) -> Result<UpstreamResponse, UpstreamError> {
        let url = self.target_url(path_and_query);
        let no_response = |source| UpstreamError::NoResponse {
            url: url.clone(),
            source,
        };

        let response = self
            .http
            .request(method, &url)
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(no_response)?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(no_response)?;

        Ok(UpstreamResponse {
            status,
            headers,
            body,
        })
    }
}
