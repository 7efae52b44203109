// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is read from the environment once at startup and is
//! immutable afterwards. Every invalid or missing variable is collected so
//! the operator sees all problems in a single run.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `PORT` | Server bind port (digits only) | Required |
//! | `METRICS_API_URL_TARGET` | Upstream base URL | Required |
//! | `HMAC_SECRET` | Shared signing secret | Required |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `CUSTOM_REQUEST_TIMEOUT_MS` | Upstream request timeout in ms | `600000` |
//! | `FAILURE_REPORT_URL` | Failure event endpoint | Disabled |
//! | `FAILURE_REPORT_KEY` | Bearer key for the failure endpoint | None |
//! | `NTP_SERVER` | Time server used for the clock check | `pool.ntp.org:123` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info` |

use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use url::Url;

use crate::ntp::DEFAULT_NTP_SERVER;
use crate::upstream::DEFAULT_REQUEST_TIMEOUT;

pub const PORT_ENV: &str = "PORT";
pub const UPSTREAM_URL_ENV: &str = "METRICS_API_URL_TARGET";
pub const HMAC_SECRET_ENV: &str = "HMAC_SECRET";
pub const HOST_ENV: &str = "HOST";
pub const REQUEST_TIMEOUT_ENV: &str = "CUSTOM_REQUEST_TIMEOUT_MS";
pub const FAILURE_REPORT_URL_ENV: &str = "FAILURE_REPORT_URL";
pub const FAILURE_REPORT_KEY_ENV: &str = "FAILURE_REPORT_KEY";
pub const NTP_SERVER_ENV: &str = "NTP_SERVER";

/// Read by [`crate::logging::init`] before the rest of the configuration.
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

/// One offending environment variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub env: &'static str,
    pub reason: String,
}

impl FieldError {
    fn new(env: &'static str, reason: impl Into<String>) -> Self {
        Self {
            env,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing environment definitions: {}", join_envs(.0))]
    Missing(Vec<FieldError>),

    #[error("incorrect environment definitions: {}", join_envs(.0))]
    Invalid(Vec<FieldError>),
}

impl ConfigError {
    pub fn fields(&self) -> &[FieldError] {
        match self {
            ConfigError::Missing(fields) | ConfigError::Invalid(fields) => fields,
        }
    }
}

fn join_envs(fields: &[FieldError]) -> String {
    fields
        .iter()
        .map(|f| f.env)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Where failure events are delivered, when enabled.
#[derive(Clone)]
pub struct FailureReportConfig {
    pub url: Url,
    pub key: Option<String>,
}

impl fmt::Debug for FailureReportConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FailureReportConfig")
            .field("url", &self.url.as_str())
            .field("key", &self.key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Clone)]
pub struct ProxyConfig {
    pub host: IpAddr,
    pub port: u16,
    pub upstream_url: Url,
    pub hmac_secret: String,
    pub request_timeout: Duration,
    pub ntp_server: String,
    pub failure_report: Option<FailureReportConfig>,
}

impl fmt::Debug for ProxyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("upstream_url", &self.upstream_url.as_str())
            .field("hmac_secret", &"<redacted>")
            .field("request_timeout", &self.request_timeout)
            .field("ntp_server", &self.ntp_server)
            .field("failure_report", &self.failure_report)
            .finish()
    }
}

impl ProxyConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load through an arbitrary lookup. Required settings are validated
    /// first; optional settings are only checked once those pass.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mut missing = Vec::new();

        let port = match non_empty(PORT_ENV) {
            Some(raw) => match parse_port(&raw) {
                Ok(port) => Some(port),
                Err(reason) => {
                    missing.push(FieldError::new(PORT_ENV, reason));
                    None
                }
            },
            None => {
                missing.push(FieldError::new(PORT_ENV, "required"));
                None
            }
        };

        let upstream_url = match non_empty(UPSTREAM_URL_ENV) {
            Some(raw) => match parse_http_url(&raw) {
                Ok(url) => Some(url),
                Err(reason) => {
                    missing.push(FieldError::new(UPSTREAM_URL_ENV, reason));
                    None
                }
            },
            None => {
                missing.push(FieldError::new(UPSTREAM_URL_ENV, "required"));
                None
            }
        };

        let hmac_secret = non_empty(HMAC_SECRET_ENV);
        if hmac_secret.is_none() {
            missing.push(FieldError::new(HMAC_SECRET_ENV, "required"));
        }

        let (Some(port), Some(upstream_url), Some(hmac_secret)) = (port, upstream_url, hmac_secret)
        else {
            return Err(ConfigError::Missing(missing));
        };

        let mut invalid = Vec::new();

        let host = match non_empty(HOST_ENV) {
            Some(raw) => raw.trim().parse::<IpAddr>().unwrap_or_else(|_| {
                invalid.push(FieldError::new(HOST_ENV, "must be an IP address"));
                IpAddr::V4(Ipv4Addr::UNSPECIFIED)
            }),
            None => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        };

        let request_timeout = match non_empty(REQUEST_TIMEOUT_ENV) {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => Duration::from_millis(ms),
                _ => {
                    invalid.push(FieldError::new(
                        REQUEST_TIMEOUT_ENV,
                        "must be a positive integer (milliseconds)",
                    ));
                    DEFAULT_REQUEST_TIMEOUT
                }
            },
            None => DEFAULT_REQUEST_TIMEOUT,
        };

        let failure_report = match non_empty(FAILURE_REPORT_URL_ENV) {
            Some(raw) => match parse_http_url(&raw) {
                Ok(url) => Some(FailureReportConfig {
                    url,
                    key: non_empty(FAILURE_REPORT_KEY_ENV),
                }),
                Err(reason) => {
                    invalid.push(FieldError::new(FAILURE_REPORT_URL_ENV, reason));
                    None
                }
            },
            None => None,
        };

        let ntp_server = non_empty(NTP_SERVER_ENV)
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|| DEFAULT_NTP_SERVER.to_string());

        if !invalid.is_empty() {
            return Err(ConfigError::Invalid(invalid));
        }

        Ok(Self {
            host,
            port,
            upstream_url,
            hmac_secret,
            request_timeout,
            ntp_server,
            failure_report,
        })
    }
}

fn parse_port(raw: &str) -> Result<u16, &'static str> {
    let raw = raw.trim();
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err("PORT must be a valid number");
    }
    raw.parse::<u16>().map_err(|_| "PORT must fit in 0-65535")
}

fn parse_http_url(raw: &str) -> Result<Url, &'static str> {
    let url = Url::parse(raw.trim()).map_err(|_| "must be an absolute URL")?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        _ => Err("scheme must be http or https"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn required() -> Vec<(&'static str, &'static str)> {
        vec![
            (PORT_ENV, "8080"),
            (UPSTREAM_URL_ENV, "https://metrics.example.com"),
            (HMAC_SECRET_ENV, "s3cret"),
        ]
    }

    #[test]
    fn defaults_when_only_required_vars_present() {
        let config = ProxyConfig::from_lookup(env(&required())).expect("valid config");

        assert_eq!(config.port, 8080);
        assert_eq!(config.host, IpAddr::from([0, 0, 0, 0]));
        assert_eq!(config.upstream_url.as_str(), "https://metrics.example.com/");
        assert_eq!(config.hmac_secret, "s3cret");
        assert_eq!(config.request_timeout, Duration::from_secs(600));
        assert_eq!(config.ntp_server, "pool.ntp.org:123");
        assert!(config.failure_report.is_none());
    }

    #[test]
    fn reads_optional_vars() {
        let mut pairs = required();
        pairs.extend([
            (HOST_ENV, "127.0.0.1"),
            (REQUEST_TIMEOUT_ENV, "2500"),
            (FAILURE_REPORT_URL_ENV, "https://errors.example.com/events"),
            (FAILURE_REPORT_KEY_ENV, "report-key"),
            (NTP_SERVER_ENV, "time.example.com:123"),
        ]);

        let config = ProxyConfig::from_lookup(env(&pairs)).expect("valid config");

        assert_eq!(config.host, IpAddr::from([127, 0, 0, 1]));
        assert_eq!(config.request_timeout, Duration::from_millis(2500));
        assert_eq!(config.ntp_server, "time.example.com:123");
        let report = config.failure_report.expect("reporting enabled");
        assert_eq!(report.url.as_str(), "https://errors.example.com/events");
        assert_eq!(report.key.as_deref(), Some("report-key"));
    }

    #[test]
    fn all_missing_required_vars_are_listed() {
        let err = ProxyConfig::from_lookup(env(&[])).unwrap_err();

        assert!(matches!(err, ConfigError::Missing(_)));
        let envs: Vec<_> = err.fields().iter().map(|f| f.env).collect();
        assert_eq!(envs, vec![PORT_ENV, UPSTREAM_URL_ENV, HMAC_SECRET_ENV]);
    }

    #[test]
    fn non_numeric_port_is_rejected() {
        let mut pairs = required();
        pairs[0] = (PORT_ENV, "80a");

        let err = ProxyConfig::from_lookup(env(&pairs)).unwrap_err();

        assert_eq!(err.fields().len(), 1);
        assert_eq!(err.fields()[0].env, PORT_ENV);
        assert_eq!(err.fields()[0].reason, "PORT must be a valid number");
    }

    #[test]
    fn empty_secret_counts_as_missing() {
        let mut pairs = required();
        pairs[2] = (HMAC_SECRET_ENV, "   ");

        let err = ProxyConfig::from_lookup(env(&pairs)).unwrap_err();

        assert_eq!(err.fields()[0].env, HMAC_SECRET_ENV);
    }

    #[test]
    fn zero_or_garbage_timeout_is_invalid() {
        for raw in ["0", "-5", "ten"] {
            let mut pairs = required();
            pairs.push((REQUEST_TIMEOUT_ENV, raw));

            let err = ProxyConfig::from_lookup(env(&pairs)).unwrap_err();

            assert!(matches!(err, ConfigError::Invalid(_)), "input {raw}");
            assert_eq!(err.fields()[0].env, REQUEST_TIMEOUT_ENV);
        }
    }

    #[test]
    fn non_http_upstream_is_rejected() {
        let mut pairs = required();
        pairs[1] = (UPSTREAM_URL_ENV, "ftp://metrics.example.com");

        let err = ProxyConfig::from_lookup(env(&pairs)).unwrap_err();

        assert_eq!(err.fields()[0].env, UPSTREAM_URL_ENV);
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let mut pairs = required();
        pairs.extend([
            (FAILURE_REPORT_URL_ENV, "https://errors.example.com"),
            (FAILURE_REPORT_KEY_ENV, "report-key"),
        ]);
        let config = ProxyConfig::from_lookup(env(&pairs)).unwrap();

        let rendered = format!("{config:?}");

        assert!(!rendered.contains("s3cret"));
        assert!(!rendered.contains("report-key"));
        assert!(rendered.contains("<redacted>"));
    }
}
