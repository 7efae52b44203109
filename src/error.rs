// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    body::Body,
    response::{IntoResponse, Response},
};

use crate::signing::SigningError;
use crate::upstream::UpstreamError;

/// Internal failures of the forwarding path.
///
/// None of these produce a status code for the caller: the request is
/// abandoned and the connection closed without a response.
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("failed to read inbound request body: {0}")]
    ReadBody(#[source] axum::Error),

    #[error("failed to sign request: {0}")]
    Signing(#[from] SigningError),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

/// Response extension telling the server to drop the connection instead
/// of writing the response it is attached to.
#[derive(Debug, Clone, thiserror::Error)]
#[error("request abandoned: {reason}")]
pub struct Abandoned {
    pub reason: String,
}

impl IntoResponse for ForwardError {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::empty());
        response.extensions_mut().insert(Abandoned {
            reason: self.to_string(),
        });
        response
    }
}
