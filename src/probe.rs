// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Connectivity Probe
//!
//! One best-effort GET against the upstream's readiness endpoint at
//! startup. It never retries and never gates request handling; a failure
//! is an early operational signal only.

use std::time::Duration;

use serde::Deserialize;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::reporter::{FailureEvent, Reporter};
use crate::upstream::{UpstreamClient, UpstreamError, UpstreamResponse};

/// Readiness endpoint of the metrics service.
pub const HEALTH_CHECK_PATH: &str = "/core/v1/health/readiness";

/// Lets the failure report go out before the log line.
const FAILURE_LOG_DELAY: Duration = Duration::from_millis(300);

const UNREACHABLE_MESSAGE: &str = "The proxy attempted to verify that the Metrics server is reachable, but was unsuccessful. Requests are likely to fail.";

const NO_INFORMATION: &str = "No error information.";

#[derive(Debug)]
pub enum ProbeOutcome {
    Reachable,
    Unreachable { cause: String },
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// Start the probe in the background. Callers are not expected to await it.
pub fn spawn(client: UpstreamClient, reporter: Reporter) -> JoinHandle<ProbeOutcome> {
    tokio::spawn(async move { probe(&client, &reporter).await })
}

pub async fn probe(client: &UpstreamClient, reporter: &Reporter) -> ProbeOutcome {
    let cause = match client.get(HEALTH_CHECK_PATH).await {
        Ok(response) if response.status.is_success() => {
            info!(upstream = %client.base_url(), "Metrics server is reachable");
            return ProbeOutcome::Reachable;
        }
        Ok(response) => status_cause(&response),
        Err(e) => transport_cause(&e),
    };

    reporter.capture(
        FailureEvent::error(format!("[ PROXY ERROR ] - {UNREACHABLE_MESSAGE}"))
            .with_context("error_information", cause.clone())
            .with_context("url", client.target_url(HEALTH_CHECK_PATH)),
    );

    tokio::time::sleep(FAILURE_LOG_DELAY).await;
    error!(
        upstream = %client.base_url(),
        cause = %cause,
        "{UNREACHABLE_MESSAGE}"
    );

    ProbeOutcome::Unreachable { cause }
}

/// Body `message` if the upstream sent one, else the status code.
fn status_cause(response: &UpstreamResponse) -> String {
    serde_json::from_slice::<ErrorBody>(&response.body)
        .ok()
        .and_then(|body| body.message)
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| format!("HTTP {}", response.status))
}

fn transport_cause(error: &UpstreamError) -> String {
    let text = error.cause_text();
    if text.trim().is_empty() {
        NO_INFORMATION.to_string()
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter::RecordingSink;
    use axum::{http::StatusCode, routing::get, Json, Router};
    use std::sync::Arc;
    use url::Url;

    async fn upstream_with(app: Router) -> UpstreamClient {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        UpstreamClient::new(
            &Url::parse(&format!("http://{addr}")).unwrap(),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn healthy_upstream_reports_nothing() {
        let client = upstream_with(Router::new().route(HEALTH_CHECK_PATH, get(|| async { "ok" }))).await;
        let sink = Arc::new(RecordingSink::default());

        let outcome = probe(&client, &Reporter::new(sink.clone())).await;

        assert!(matches!(outcome, ProbeOutcome::Reachable));
        assert!(sink.events().is_empty());
    }

    #[tokio::test]
    async fn error_body_message_is_the_cause() {
        let app = Router::new().route(
            HEALTH_CHECK_PATH,
            get(|| async {
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(serde_json::json!({ "message": "database warming up" })),
                )
            }),
        );
        let client = upstream_with(app).await;
        let sink = Arc::new(RecordingSink::default());

        let outcome = probe(&client, &Reporter::new(sink.clone())).await;

        match outcome {
            ProbeOutcome::Unreachable { cause } => assert_eq!(cause, "database warming up"),
            other => panic!("unexpected outcome: {other:?}"),
        }
        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].context["error_information"], "database warming up");
    }

    #[tokio::test]
    async fn status_is_the_cause_without_a_message() {
        let client = upstream_with(Router::new()).await;

        let outcome = probe(&client, &Reporter::disabled()).await;

        match outcome {
            ProbeOutcome::Unreachable { cause } => assert_eq!(cause, "HTTP 404 Not Found"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn refused_connection_is_reported_once() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let client = UpstreamClient::new(
            &Url::parse(&format!("http://{addr}")).unwrap(),
            Duration::from_secs(5),
        )
        .unwrap();
        let sink = Arc::new(RecordingSink::default());

        let outcome = spawn(client, Reporter::new(sink.clone())).await.unwrap();

        assert!(matches!(outcome, ProbeOutcome::Unreachable { .. }));
        assert_eq!(sink.events().len(), 1);
    }
}
