// ── Mode lifecycle hooks ──
//
// Collaborators implement `ModeHandler` for the modes they care about.
// Every hook defaults to a no-op, so a handler only overrides what it
// needs.

use async_trait::async_trait;
use serde_json::Value;
use strum::Display;
use thiserror::Error;

use crate::model::Mode;

/// Passed to [`ModeHandler::on_enter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnterContext {
    /// Mode being entered.
    pub mode: Mode,
    /// Mode that was active before the transition.
    pub prev_mode: Mode,
}

/// Passed to [`ModeHandler::on_exit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitContext {
    /// Mode being left.
    pub mode: Mode,
    pub next_mode: Mode,
}

/// Which hook failed during a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum HookPhase {
    Exit,
    Enter,
}

/// Failure reported by a lifecycle hook.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HookError {
    message: String,
}

impl HookError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<String> for HookError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for HookError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Lifecycle hooks bound to one mode.
///
/// Hooks run outside every controller lock and may call back into the
/// controller for read-only queries. They have no timeout: a hook that
/// never resolves stalls the transition that invoked it.
#[async_trait]
pub trait ModeHandler: Send + Sync {
    /// Called after the controller has switched into this mode.
    async fn on_enter(&self, _ctx: EnterContext) -> Result<(), HookError> {
        Ok(())
    }

    /// Called before the controller leaves this mode. An error aborts the
    /// transition.
    async fn on_exit(&self, _ctx: ExitContext) -> Result<(), HookError> {
        Ok(())
    }

    /// Payload forwarded by [`ModeController::update`](super::ModeController::update)
    /// while this mode is active.
    fn on_update(&self, _payload: &Value) {}
}
