// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::config::ProxyConfig;
use crate::reporter::Reporter;
use crate::signing::{RequestSigner, SigningError};
use crate::upstream::{UpstreamClient, UpstreamError};

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error(transparent)]
    Signing(#[from] SigningError),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

/// Process-lifetime state shared by every request. Never mutated after
/// startup.
#[derive(Clone, Debug)]
pub struct ProxyState {
    pub upstream: UpstreamClient,
    pub signer: Arc<RequestSigner>,
    pub reporter: Reporter,
}

impl ProxyState {
    pub fn new(upstream: UpstreamClient, signer: RequestSigner, reporter: Reporter) -> Self {
        Self {
            upstream,
            signer: Arc::new(signer),
            reporter,
        }
    }

    pub fn from_config(config: &ProxyConfig, reporter: Reporter) -> Result<Self, StateError> {
        let upstream = UpstreamClient::new(&config.upstream_url, config.request_timeout)?;
        let signer = RequestSigner::new(&config.hmac_secret)?;
        Ok(Self::new(upstream, signer, reporter))
    }
}
