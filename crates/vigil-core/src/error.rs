// ── Core error types ──
//
// Invalid-input errors raised synchronously by the control plane. Probe
// failures never appear here: they are recorded as unreachable outcomes.
// Transition failures have their own type, `SwitchError`, since they are a
// normal result of `switch_mode` rather than a fault.

use thiserror::Error;

use crate::model::{Mode, OfflinePolicy};

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Input errors ─────────────────────────────────────────────────
    #[error("Unknown mode: {name}")]
    UnknownMode { name: String },

    #[error("Unknown poll profile: {name}")]
    UnknownProfile { name: String },

    #[error("Invalid poll profile '{name}': {reason}")]
    InvalidProfile { name: String, reason: String },

    #[error("Default mode {mode} cannot require connectivity with policy {policy}")]
    InvalidDefaultMode { mode: Mode, policy: OfflinePolicy },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Probe transport setup ────────────────────────────────────────
    #[error("Health probe setup failed: {0}")]
    Probe(#[from] vigil_api::Error),
}
