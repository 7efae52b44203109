// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Metrics Signature Proxy - Authenticating reverse proxy for metrics ingestion
//!
//! Every inbound request is signed with HMAC-SHA3-512 over a fresh nonce,
//! a millisecond timestamp and the raw body, then forwarded to a single
//! upstream. The upstream response is relayed back unchanged.
//!
//! ## Modules
//!
//! - `proxy` - Signing forwarder (Axum fallback handler)
//! - `signing` - Nonce generation and HMAC computation
//! - `upstream` - Shared HTTP client for the metrics server
//! - `ntp` / `clock` - Startup clock verification against NTP
//! - `probe` - Startup reachability check of the metrics server
//! - `reporter` - Failure event reporting
//! - `server` - Accept loop and graceful shutdown

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;
pub mod ntp;
pub mod probe;
pub mod proxy;
pub mod reporter;
pub mod server;
pub mod signing;
pub mod state;
pub mod upstream;
