// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Clock Drift Guard
//!
//! Signed requests carry a millisecond timestamp that the upstream uses to
//! reject replays, so the proxy must not run on a host whose clock is off.
//! At startup the local clock is compared once against network time:
//!
//! - drift of more than one whole minute is fatal;
//! - failing to reach the time server is only a warning.

use std::future::Future;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::ntp::{NtpClient, NtpError};
use crate::reporter::{FailureEvent, Reporter};

/// Largest tolerated drift, in whole minutes.
pub const MAX_DRIFT_MINUTES: i64 = 1;

/// Source of trusted time.
pub trait NetworkClock: Send + Sync {
    fn network_time(&self) -> impl Future<Output = Result<DateTime<Utc>, NtpError>> + Send;
}

impl NetworkClock for NtpClient {
    fn network_time(&self) -> impl Future<Output = Result<DateTime<Utc>, NtpError>> + Send {
        self.fetch_network_time()
    }
}

/// Outcome of one clock check.
#[derive(Debug)]
pub enum ClockCheck {
    Verified {
        drift_minutes: i64,
    },
    Drifted {
        local: DateTime<Utc>,
        network: DateTime<Utc>,
        drift_minutes: i64,
    },
    Unavailable(NtpError),
}

impl ClockCheck {
    /// Compare two instants. Whole minutes are truncated toward zero.
    pub fn evaluate(local: DateTime<Utc>, network: DateTime<Utc>) -> Self {
        let drift_minutes = drift_minutes(local, network);
        if drift_minutes > MAX_DRIFT_MINUTES {
            ClockCheck::Drifted {
                local,
                network,
                drift_minutes,
            }
        } else {
            ClockCheck::Verified { drift_minutes }
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, ClockCheck::Drifted { .. })
    }
}

pub fn drift_minutes(local: DateTime<Utc>, network: DateTime<Utc>) -> i64 {
    (local - network).num_minutes().abs()
}

pub struct ClockDriftGuard<C> {
    clock: C,
    reporter: Reporter,
}

impl<C: NetworkClock> ClockDriftGuard<C> {
    pub fn new(clock: C, reporter: Reporter) -> Self {
        Self { clock, reporter }
    }

    /// Run the check, log and report the verdict.
    ///
    /// Local time is sampled after the network answer arrives.
    pub async fn run(&self) -> ClockCheck {
        info!("Time checking is underway");

        let check = match self.clock.network_time().await {
            Ok(network) => ClockCheck::evaluate(Utc::now(), network),
            Err(e) => ClockCheck::Unavailable(e),
        };

        match &check {
            ClockCheck::Verified { drift_minutes } => {
                info!(drift_minutes, "Time verification complete");
            }
            ClockCheck::Drifted {
                local,
                network,
                drift_minutes,
            } => {
                error!(
                    utc_time = %network.to_rfc3339(),
                    system_time = %local.to_rfc3339(),
                    drift_minutes,
                    "The system time is out of sync with UTC"
                );
                self.reporter.capture(
                    FailureEvent::error("The system time is out of sync with UTC")
                        .with_context("utc_time", network.to_rfc3339())
                        .with_context("system_time", local.to_rfc3339())
                        .with_context("drift_minutes", drift_minutes.to_string()),
                );
            }
            ClockCheck::Unavailable(e) => {
                warn!(
                    error = %e,
                    "Unable to get current time for verification. The system time may be incorrect"
                );
                self.reporter.capture(
                    FailureEvent::warning(
                        "Unable to get current time for verification. The system time may be incorrect",
                    )
                    .with_error(e),
                );
            }
        }

        check
    }
}

/// Run the guard beside the server.
///
/// A drifted clock cancels `shutdown` and the returned token; the token
/// stays untouched for every other verdict.
pub fn spawn_guard<C>(
    guard: ClockDriftGuard<C>,
    shutdown: CancellationToken,
) -> (JoinHandle<ClockCheck>, CancellationToken)
where
    C: NetworkClock + 'static,
{
    let fatal = CancellationToken::new();
    let task = {
        let fatal = fatal.clone();
        tokio::spawn(async move {
            let check = guard.run().await;
            if check.is_fatal() {
                fatal.cancel();
                shutdown.cancel();
            }
            check
        })
    };
    (task, fatal)
}
