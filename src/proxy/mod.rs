// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::ProxyState;

pub mod forward;
pub mod headers;

/// Every method on every path goes through the signing forwarder.
pub fn router(state: ProxyState) -> Router {
    Router::new()
        .fallback(forward::forward)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
