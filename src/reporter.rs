// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Failure reporting.
//!
//! Components hand structured failure events to a [`Reporter`]. The handle
//! is cheap to clone and never blocks the caller: when no sink is
//! configured every call is a no-op, and the HTTP sink delivers events on
//! background tasks.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::task::TaskTracker;
use tracing::debug;
use url::Url;

use crate::config::FailureReportConfig;

/// Upper bound for waiting on in-flight deliveries when closing.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

const DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
}

/// A single failure event.
#[derive(Debug, Clone, Serialize)]
pub struct FailureEvent {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub message: String,
    pub error: Option<String>,
    pub context: BTreeMap<String, String>,
}

impl FailureEvent {
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, message)
    }

    fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            severity,
            message: message.into(),
            error: None,
            context: BTreeMap::new(),
        }
    }

    /// Attach the error that caused the event.
    pub fn with_error(mut self, error: &dyn fmt::Display) -> Self {
        self.error = Some(error.to_string());
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Destination for failure events.
pub trait FailureSink: Send + Sync {
    /// Accept an event. Must not block.
    fn capture(&self, event: FailureEvent);

    /// Wait for pending deliveries to settle.
    fn close(&self, _timeout: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async {})
    }
}

/// Handle held by every component that reports failures.
#[derive(Clone, Default)]
pub struct Reporter {
    sink: Option<Arc<dyn FailureSink>>,
}

impl Reporter {
    pub fn new(sink: Arc<dyn FailureSink>) -> Self {
        Self { sink: Some(sink) }
    }

    pub fn disabled() -> Self {
        Self { sink: None }
    }

    /// Build from configuration; no endpoint means a disabled reporter.
    pub fn from_config(config: Option<&FailureReportConfig>) -> Result<Self, reqwest::Error> {
        match config {
            Some(config) => {
                let sink = HttpSink::new(config.url.clone(), config.key.clone())?;
                Ok(Self::new(Arc::new(sink)))
            }
            None => Ok(Self::disabled()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    pub fn capture(&self, event: FailureEvent) {
        if let Some(sink) = &self.sink {
            sink.capture(event);
        }
    }

    pub async fn close(&self, timeout: Duration) {
        if let Some(sink) = &self.sink {
            sink.close(timeout).await;
        }
    }
}

impl fmt::Debug for Reporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reporter")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

/// Posts each event as JSON to a collector endpoint.
pub struct HttpSink {
    endpoint: Url,
    key: Option<String>,
    client: reqwest::Client,
    tasks: TaskTracker,
}

impl HttpSink {
    pub fn new(endpoint: Url, key: Option<String>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(DELIVERY_TIMEOUT)
            .build()?;

        Ok(Self {
            endpoint,
            key,
            client,
            tasks: TaskTracker::new(),
        })
    }
}

impl FailureSink for HttpSink {
    fn capture(&self, event: FailureEvent) {
        let mut request = self.client.post(self.endpoint.clone()).json(&event);
        if let Some(key) = &self.key {
            request = request.bearer_auth(key);
        }

        self.tasks.spawn(async move {
            match request.send().await {
                Ok(response) if response.status().is_success() => {}
                Ok(response) => debug!(
                    event_id = %event.event_id,
                    status = %response.status(),
                    "Failure collector rejected event"
                ),
                Err(e) => debug!(
                    event_id = %event.event_id,
                    error = %e,
                    "Failed to deliver failure event"
                ),
            }
        });
    }

    fn close(&self, timeout: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            self.tasks.close();
            if tokio::time::timeout(timeout, self.tasks.wait()).await.is_err() {
                debug!(
                    pending = self.tasks.len(),
                    "Gave up waiting for failure event deliveries"
                );
            }
        })
    }
}

/// Keeps every captured event in memory.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct RecordingSink {
    events: std::sync::Mutex<Vec<FailureEvent>>,
}

#[cfg(test)]
impl RecordingSink {
    pub(crate) fn events(&self) -> Vec<FailureEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl FailureSink for RecordingSink {
    fn capture(&self, event: FailureEvent) {
        self.events.lock().unwrap().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::State, http::HeaderMap, routing::post, Json, Router};
    use tokio::sync::mpsc;

    #[test]
    fn disabled_reporter_swallows_events() {
        let reporter = Reporter::disabled();
        assert!(!reporter.is_enabled());
        reporter.capture(FailureEvent::error("nobody listens"));
    }

    #[test]
    fn events_reach_the_sink() {
        let sink = Arc::new(RecordingSink::default());
        let reporter = Reporter::new(sink.clone());

        reporter.capture(
            FailureEvent::error("Proxy Internal Error")
                .with_error(&"connection refused")
                .with_context("url", "http://upstream/ingest"),
        );

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].severity, Severity::Error);
        assert_eq!(events[0].error.as_deref(), Some("connection refused"));
        assert_eq!(events[0].context["url"], "http://upstream/ingest");
    }

    #[test]
    fn event_serializes_with_snake_case_severity() {
        let event = FailureEvent::warning("clock unverified");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["severity"], "warning");
        assert_eq!(json["message"], "clock unverified");
        assert!(!json["event_id"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn http_sink_posts_json_with_bearer_key() {
        let (tx, mut rx) = mpsc::unbounded_channel::<(Option<String>, serde_json::Value)>();

        async fn collect(
            State(tx): State<mpsc::UnboundedSender<(Option<String>, serde_json::Value)>>,
            headers: HeaderMap,
            Json(body): Json<serde_json::Value>,
        ) {
            let auth = headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let _ = tx.send((auth, body));
        }

        let app = Router::new().route("/events", post(collect)).with_state(tx);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let endpoint = Url::parse(&format!("http://{addr}/events")).unwrap();
        let reporter = Reporter::from_config(Some(&FailureReportConfig {
            url: endpoint,
            key: Some("k3y".into()),
        }))
        .unwrap();

        reporter.capture(FailureEvent::error("boom").with_context("url", "http://x"));
        reporter.close(Duration::from_secs(5)).await;

        let (auth, body) = rx.recv().await.expect("event delivered");
        assert_eq!(auth.as_deref(), Some("Bearer k3y"));
        assert_eq!(body["message"], "boom");
        assert_eq!(body["severity"], "error");
        assert_eq!(body["context"]["url"], "http://x");
    }
}
