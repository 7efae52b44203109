// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::net::SocketAddr;
use std::process::ExitCode;

use metrics_signature_proxy::{
    clock::{self, ClockDriftGuard},
    config::ProxyConfig,
    logging::{self, LogFormat},
    ntp::NtpClient,
    probe, proxy,
    reporter::{FailureEvent, Reporter, DEFAULT_CLOSE_TIMEOUT},
    server::{self, ShutdownOutcome, DEFAULT_SHUTDOWN_GRACE},
    state::ProxyState,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    logging::init(LogFormat::from_env());

    let config = match ProxyConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            for field in e.fields() {
                error!(env = field.env, reason = %field.reason, "Invalid configuration");
            }
            error!(error = %e, "Environment variables are missing or invalid");
            return ExitCode::FAILURE;
        }
    };

    let reporter = match Reporter::from_config(config.failure_report.as_ref()) {
        Ok(reporter) => reporter,
        Err(e) => {
            error!(error = %e, "Failed to initialize failure reporting");
            return ExitCode::FAILURE;
        }
    };

    let state = match ProxyState::from_config(&config, reporter.clone()) {
        Ok(state) => state,
        Err(e) => {
            error!(error = %e, "Failed to initialize proxy");
            return ExitCode::FAILURE;
        }
    };

    let shutdown = CancellationToken::new();

    let (_, clock_fatal) = clock::spawn_guard(
        ClockDriftGuard::new(NtpClient::new(config.ntp_server.clone()), reporter.clone()),
        shutdown.clone(),
    );

    probe::spawn(state.upstream.clone(), reporter.clone());

    let addr = SocketAddr::new(config.host, config.port);
    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(%addr, error = %e, "Failed to bind listener");
            reporter.capture(FailureEvent::error("Failed to bind listener").with_error(&e));
            reporter.close(DEFAULT_CLOSE_TIMEOUT).await;
            return ExitCode::FAILURE;
        }
    };

    info!(
        %addr,
        upstream = %state.upstream.base_url(),
        "Metrics signature proxy listening"
    );

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            server::shutdown_signal().await;
            info!("Shutdown signal received");
            shutdown.cancel();
        });
    }

    let outcome = server::serve(
        listener,
        proxy::router(state),
        shutdown,
        DEFAULT_SHUTDOWN_GRACE,
    )
    .await;

    if outcome == ShutdownOutcome::ForcedAfterGrace {
        reporter.capture(FailureEvent::error(
            "Graceful shutdown error: connections were still open after the grace period",
        ));
    }

    reporter.close(DEFAULT_CLOSE_TIMEOUT).await;

    if outcome == ShutdownOutcome::ForcedAfterGrace || clock_fatal.is_cancelled() {
        return ExitCode::FAILURE;
    }

    info!("Goodbye");
    ExitCode::SUCCESS
}
