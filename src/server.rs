// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # HTTP Server and Shutdown
//!
//! An explicit accept loop instead of `axum::serve` so that a forwarder
//! failure can close the connection without any response being written:
//! a response carrying the [`Abandoned`] marker becomes a service error,
//! which makes hyper drop the HTTP/1 connection or reset the HTTP/2 stream.
//!
//! ## Shutdown
//!
//! One [`CancellationToken`] drives shutdown. Once cancelled, the listener
//! is dropped, in-flight connections are asked to finish, and after the
//! grace period the server gives up on them.

use std::net::SocketAddr;
use std::time::Duration;

use axum::{body::Body, extract::ConnectInfo, response::Response, Router};
use hyper::body::Incoming;
use hyper_util::{
    rt::{TokioExecutor, TokioIo},
    server::{conn::auto, graceful::GracefulShutdown},
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use tracing::{debug, error, info, warn};

use crate::error::Abandoned;

/// Time allowed for in-flight requests once shutdown starts.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Every connection finished within the grace period.
    Drained,
    /// Connections were still open when the grace period ran out.
    ForcedAfterGrace,
}

/// Serve `app` until `shutdown` is cancelled.
pub async fn serve(
    listener: TcpListener,
    app: Router,
    shutdown: CancellationToken,
    grace: Duration,
) -> ShutdownOutcome {
    let builder = auto::Builder::new(TokioExecutor::new());
    let graceful = GracefulShutdown::new();

    loop {
        let (stream, remote) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    warn!(error = %e, "Failed to accept connection");
                    continue;
                }
            },
            _ = shutdown.cancelled() => break,
        };

        let app = app.clone();
        let service = hyper::service::service_fn(move |request: hyper::Request<Incoming>| {
            handle(app.clone(), remote, request)
        });

        let conn = builder
            .serve_connection(TokioIo::new(stream), service)
            .into_owned();
        let conn = graceful.watch(conn);

        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(remote = %remote, error = %e, "Connection closed with error");
            }
        });
    }

    drop(listener);
    info!("Closing gracefully");

    tokio::select! {
        _ = graceful.shutdown() => ShutdownOutcome::Drained,
        _ = tokio::time::sleep(grace) => {
            error!(grace_secs = grace.as_secs(), "Forcing the server to close");
            ShutdownOutcome::ForcedAfterGrace
        }
    }
}

async fn handle(
    app: Router,
    remote: SocketAddr,
    request: hyper::Request<Incoming>,
) -> Result<Response, Abandoned> {
    let mut request = request.map(Body::new);
    request.extensions_mut().insert(ConnectInfo(remote));

    let mut response = match app.oneshot(request).await {
        Ok(response) => response,
        Err(never) => match never {},
    };

    match response.extensions_mut().remove::<Abandoned>() {
        Some(abandoned) => Err(abandoned),
        None => Ok(response),
    }
}

/// Resolves on SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
