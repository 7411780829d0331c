// Health endpoint client
//
// One GET per check. A probe only counts as healthy when the status is 2xx
// AND the JSON body carries a success indicator; anything else is an error
// the caller folds into an "unreachable" outcome.

use std::time::{Duration, Instant};

use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::transport::TransportConfig;

/// Status strings accepted as a success indicator.
const HEALTHY_STATUSES: &[&str] = &["ok", "healthy", "up"];

/// Body shape of the backend health endpoint.
///
/// Backends answer either `{"success": true}` or `{"status": "ok"}`;
/// unknown fields are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthBody {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl HealthBody {
    /// Whether the body carries a success indicator.
    pub fn is_healthy(&self) -> bool {
        if let Some(success) = self.success {
            return success;
        }
        self.status.as_deref().is_some_and(|s| {
            HEALTHY_STATUSES
                .iter()
                .any(|ok| s.eq_ignore_ascii_case(ok))
        })
    }
}

/// Result of a healthy probe.
#[derive(Debug, Clone)]
pub struct HealthReport {
    pub status: u16,
    pub latency: Duration,
    pub message: Option<String>,
}

/// HTTP client for the backend health endpoint.
#[derive(Debug, Clone)]
pub struct HealthClient {
    http: reqwest::Client,
}

impl HealthClient {
    /// Create a client from a `TransportConfig`.
    pub fn new(transport: &TransportConfig) -> Result<Self, Error> {
        Ok(Self {
            http: transport.build_client()?,
        })
    }

    /// Create a client around a pre-built `reqwest::Client`.
    pub fn from_reqwest(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// Probe `endpoint` once, bounded by `timeout`.
    pub async fn check(&self, endpoint: &Url, timeout: Duration) -> Result<HealthReport, Error> {
        debug!("GET {}", endpoint);
        let started = Instant::now();

        let resp = self
            .http
            .get(endpoint.clone())
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| map_transport(e, timeout))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::UnexpectedStatus {
                status: status.as_u16(),
            });
        }

        let body = resp.text().await.map_err(|e| map_transport(e, timeout))?;
        let parsed: HealthBody =
            serde_json::from_str(&body).map_err(|e| Error::Deserialization {
                message: e.to_string(),
                body: body.clone(),
            })?;

        if !parsed.is_healthy() {
            return Err(Error::Unhealthy {
                detail: parsed
                    .message
                    .or(parsed.status)
                    .unwrap_or_else(|| "no success indicator".into()),
            });
        }

        Ok(HealthReport {
            status: status.as_u16(),
            latency: started.elapsed(),
            message: parsed.message,
        })
    }
}

fn map_transport(err: reqwest::Error, timeout: Duration) -> Error {
    if err.is_timeout() {
        Error::Timeout {
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }
    } else {
        Error::Transport(err)
    }
}
