use thiserror::Error;

/// Top-level error type for the `vigil-api` crate.
///
/// Covers every way a health probe can fail. `vigil-core` never surfaces
/// these to mode consumers: any error here is folded into an "unreachable"
/// probe outcome and only shows up in counters and logs.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request timed out.
    #[error("Health check timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// TLS handshake or client construction error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Response ────────────────────────────────────────────────────
    /// Backend answered with a non-success HTTP status.
    #[error("Unexpected HTTP status {status}")]
    UnexpectedStatus { status: u16 },

    /// Body was not the expected JSON shape, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    /// Body parsed but did not carry a success indicator.
    #[error("Backend reported unhealthy: {detail}")]
    Unhealthy { detail: String },
}

impl Error {
    /// Returns `true` if the failure happened before any response arrived.
    pub fn is_transport(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            Self::Timeout { .. } => true,
            _ => false,
        }
    }

    /// Returns `true` if this is a timeout of either kind.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout(),
            Self::Timeout { .. } => true,
            _ => false,
        }
    }
}
