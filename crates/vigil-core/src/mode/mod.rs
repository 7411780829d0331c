// ── Mode controller ──
//
// Owns the single active mode, the overlay stack, and the handler
// registry. Transitions are guarded by the lock flag and the per-mode
// connectivity policy, then run exit/enter hooks around the state change.

mod handler;

use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use strum::Display;
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::connectivity::ConnectivityMonitor;
use crate::events::{ConnectivityEvent, EventBus, ModeEvent};
use crate::model::{ConnectivityVerdict, Mode, ModePolicyTable, OfflinePolicy};

pub use handler::{EnterContext, ExitContext, HookError, HookPhase, ModeHandler};

// ── Options and results ──────────────────────────────────────────

/// Modifiers for [`ModeController::switch_mode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SwitchOptions {
    /// Bypass the lock and the same-mode short circuit.
    pub force: bool,
    /// Suspend the current mode on the stack instead of abandoning it.
    pub overlay: bool,
    pub skip_connectivity_check: bool,
}

impl SwitchOptions {
    pub fn forced() -> Self {
        Self {
            force: true,
            ..Self::default()
        }
    }

    pub fn overlay() -> Self {
        Self {
            overlay: true,
            ..Self::default()
        }
    }

    pub fn skip_connectivity_check(mut self) -> Self {
        self.skip_connectivity_check = true;
        self
    }
}

/// Why a mode may not be entered, or is entered with a caveat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum EnterReason {
    Locked,
    Offline,
    /// Allowed, but the backend is offline.
    Warn,
}

/// Result of [`ModeController::can_enter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EnterCheck {
    pub allowed: bool,
    pub reason: Option<EnterReason>,
}

impl EnterCheck {
    const fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    const fn warn() -> Self {
        Self {
            allowed: true,
            reason: Some(EnterReason::Warn),
        }
    }

    const fn deny(reason: EnterReason) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
        }
    }
}

/// Successful transition result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchOutcome {
    Changed { from: Mode, to: Mode },
    /// Target was already active; nothing ran.
    Unchanged,
}

/// Why a transition did not happen.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SwitchError {
    #[error("mode controller is locked; cannot enter {mode}")]
    Locked { mode: Mode },

    #[error("cannot enter {mode}: {reason}")]
    Blocked { mode: Mode, reason: EnterReason },

    #[error("unknown mode: {name}")]
    UnknownMode { name: String },

    #[error("no mode to go back to")]
    NoHistory,

    #[error("{phase} hook for {mode} failed: {source}")]
    Hook {
        mode: Mode,
        phase: HookPhase,
        #[source]
        source: HookError,
    },
}

/// Observable controller state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModeState {
    pub current: Mode,
    pub previous: Option<Mode>,
    /// Modes suspended by overlay transitions, most recent last.
    pub stack: Vec<Mode>,
    pub locked: bool,
}

impl ModeState {
    fn new(current: Mode) -> Self {
        Self {
            current,
            previous: None,
            stack: Vec::new(),
            locked: false,
        }
    }
}

/// What a successful transition does to the overlay stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StackOp {
    Push,
    Clear,
    Pop,
}

// ── Controller ───────────────────────────────────────────────────

/// Mode state machine.
///
/// Cheaply cloneable via `Arc<ModeInner>`. Callers are expected to await
/// one `switch_mode` before issuing the next; use [`lock`](Self::lock)
/// around multi-step work that must not race a mode change.
#[derive(Clone)]
pub struct ModeController {
    inner: Arc<ModeInner>,
}

struct ModeInner {
    policies: ModePolicyTable,
    monitor: ConnectivityMonitor,
    handlers: DashMap<Mode, Arc<dyn ModeHandler>>,
    state: watch::Sender<ModeState>,
    events: EventBus<ModeEvent>,
}

impl ModeController {
    /// Create a controller in the table's default mode.
    pub fn new(policies: ModePolicyTable, monitor: ConnectivityMonitor) -> Self {
        let (state, _) = watch::channel(ModeState::new(policies.default_mode()));
        Self {
            inner: Arc::new(ModeInner {
                policies,
                monitor,
                handlers: DashMap::new(),
                state,
                events: EventBus::new(),
            }),
        }
    }

    // ── Handler registry ─────────────────────────────────────────

    /// Bind `handler` to `mode`, returning the handler it replaced.
    pub fn register_handler(
        &self,
        mode: Mode,
        handler: Arc<dyn ModeHandler>,
    ) -> Option<Arc<dyn ModeHandler>> {
        debug!(%mode, "registering mode handler");
        self.inner.handlers.insert(mode, handler)
    }

    pub fn unregister_handler(&self, mode: Mode) -> Option<Arc<dyn ModeHandler>> {
        self.inner.handlers.remove(&mode).map(|(_, h)| h)
    }

    fn handler(&self, mode: Mode) -> Option<Arc<dyn ModeHandler>> {
        self.inner.handlers.get(&mode).map(|h| Arc::clone(h.value()))
    }

    // ── Guards ───────────────────────────────────────────────────

    /// Whether `mode` may be entered right now.
    pub fn can_enter(&self, mode: Mode) -> EnterCheck {
        if self.inner.state.borrow().locked {
            return EnterCheck::deny(EnterReason::Locked);
        }
        self.connectivity_check(mode)
    }

    fn connectivity_check(&self, mode: Mode) -> EnterCheck {
        let policy = self.inner.policies.policy(mode);
        if !policy.requires_connectivity || !self.inner.monitor.verdict().is_offline() {
            return EnterCheck::allow();
        }
        match policy.offline_policy {
            OfflinePolicy::Block => EnterCheck::deny(EnterReason::Offline),
            OfflinePolicy::Warn => EnterCheck::warn(),
            OfflinePolicy::Allow => EnterCheck::allow(),
        }
    }

    // ── Transitions ──────────────────────────────────────────────

    /// Switch to `mode`.
    ///
    /// Guard rejections are also announced as [`ModeEvent::Blocked`]. On a
    /// hook failure the controller's own bookkeeping is restored, but hooks
    /// that already ran are not compensated.
    pub async fn switch_mode(
        &self,
        mode: Mode,
        options: SwitchOptions,
    ) -> Result<SwitchOutcome, SwitchError> {
        let op = if options.overlay {
            StackOp::Push
        } else {
            StackOp::Clear
        };
        self.transition(mode, options, op).await
    }

    /// Like [`switch_mode`](Self::switch_mode) but takes a mode name.
    pub async fn switch_mode_named(
        &self,
        name: &str,
        options: SwitchOptions,
    ) -> Result<SwitchOutcome, SwitchError> {
        let mode = Mode::parse(name).map_err(|_| SwitchError::UnknownMode {
            name: name.to_owned(),
        })?;
        self.switch_mode(mode, options).await
    }

    /// Resume the most recently suspended mode, else the previous one.
    pub async fn go_back(&self) -> Result<SwitchOutcome, SwitchError> {
        let (top, previous) = {
            let state = self.inner.state.borrow();
            (state.stack.last().copied(), state.previous)
        };

        if let Some(target) = top {
            return self
                .transition(target, SwitchOptions::default(), StackOp::Pop)
                .await;
        }
        match previous {
            Some(target) => self.switch_mode(target, SwitchOptions::default()).await,
            None => Err(SwitchError::NoHistory),
        }
    }

    /// Switch to the default mode without consulting connectivity.
    pub async fn go_to_default(&self) -> Result<SwitchOutcome, SwitchError> {
        let target = self.inner.policies.default_mode();
        self.switch_mode(target, SwitchOptions::default().skip_connectivity_check())
            .await
    }

    async fn transition(
        &self,
        to: Mode,
        options: SwitchOptions,
        op: StackOp,
    ) -> Result<SwitchOutcome, SwitchError> {
        let before = self.inner.state.borrow().clone();
        let from = before.current;

        if before.locked && !options.force {
            debug!(%to, "mode switch refused: locked");
            return Err(SwitchError::Locked { mode: to });
        }

        if to == from && !options.force {
            if op == StackOp::Pop {
                self.inner.state.send_modify(|s| {
                    s.stack.pop();
                });
            }
            return Ok(SwitchOutcome::Unchanged);
        }

        if !options.skip_connectivity_check {
            let check = self.connectivity_check(to);
            match (check.allowed, check.reason) {
                (false, reason) => {
                    let reason = reason.unwrap_or(EnterReason::Offline);
                    info!(%to, %reason, "mode switch blocked");
                    self.inner
                        .events
                        .emit(ModeEvent::Blocked { mode: to, reason });
                    return Err(SwitchError::Blocked { mode: to, reason });
                }
                (true, Some(reason)) => {
                    warn!(%to, "entering mode while backend is offline");
                    self.inner
                        .events
                        .emit(ModeEvent::Warning { mode: to, reason });
                }
                (true, None) => {}
            }
        }

        self.inner.events.emit(ModeEvent::BeforeChange {
            from,
            to,
            options,
        });

        if let Some(handler) = self.handler(from) {
            if let Err(err) = handler
                .on_exit(ExitContext {
                    mode: from,
                    next_mode: to,
                })
                .await
            {
                return Err(self.fail(from, to, HookPhase::Exit, err));
            }
        }

        self.inner.state.send_modify(|s| {
            s.previous = Some(from);
            s.current = to;
            match op {
                StackOp::Push => s.stack.push(from),
                StackOp::Clear => s.stack.clear(),
                StackOp::Pop => {
                    s.stack.pop();
                }
            }
        });

        if let Some(handler) = self.handler(to) {
            if let Err(err) = handler
                .on_enter(EnterContext {
                    mode: to,
                    prev_mode: from,
                })
                .await
            {
                self.inner.state.send_modify(|s| {
                    s.current = before.current;
                    s.previous = before.previous;
                    s.stack.clone_from(&before.stack);
                });
                return Err(self.fail(from, to, HookPhase::Enter, err));
            }
        }

        info!(%from, %to, overlay = options.overlay, "mode changed");
        self.inner.events.emit(ModeEvent::Changed { from, to, options });
        Ok(SwitchOutcome::Changed { from, to })
    }

    fn fail(&self, from: Mode, to: Mode, phase: HookPhase, err: HookError) -> SwitchError {
        let mode = match phase {
            HookPhase::Exit => from,
            HookPhase::Enter => to,
        };
        warn!(%from, %to, %phase, error = %err, "mode transition failed");
        self.inner.events.emit(ModeEvent::TransitionFailed {
            from,
            to,
            phase,
            message: err.message().to_owned(),
        });
        SwitchError::Hook {
            mode,
            phase,
            source: err,
        }
    }

    /// Forward `payload` to the active mode's handler.
    pub fn update(&self, payload: &Value) {
        let current = self.current_mode();
        if let Some(handler) = self.handler(current) {
            handler.on_update(payload);
        }
    }

    // ── Locking ──────────────────────────────────────────────────

    pub fn lock(&self) {
        if self.inner.state.send_if_modified(|s| !std::mem::replace(&mut s.locked, true)) {
            debug!("mode controller locked");
        }
    }

    pub fn unlock(&self) {
        if self.inner.state.send_if_modified(|s| std::mem::replace(&mut s.locked, false)) {
            debug!("mode controller unlocked");
        }
    }

    pub fn is_locked(&self) -> bool {
        self.inner.state.borrow().locked
    }

    // ── Connectivity loss ────────────────────────────────────────

    /// Leave the active mode if it cannot run offline.
    ///
    /// Returns the mode that was left. Does nothing once the verdict has
    /// recovered. Honors the lock like any other non-forced switch.
    pub async fn revert_if_blocked(&self) -> Option<Mode> {
        if !self.inner.monitor.verdict().is_offline() {
            debug!("verdict no longer offline, staying put");
            return None;
        }
        let from = self.current_mode();
        if !self.inner.policies.policy(from).blocks_offline() {
            return None;
        }

        warn!(mode = %from, "connectivity lost, leaving mode");
        match self.go_to_default().await {
            Ok(SwitchOutcome::Changed { to, .. }) => {
                self.inner.events.emit(ModeEvent::ForcedExit {
                    from,
                    to,
                    verdict: ConnectivityVerdict::Offline,
                });
                Some(from)
            }
            Ok(SwitchOutcome::Unchanged) => None,
            Err(e) => {
                warn!(error = %e, mode = %from, "forced exit failed");
                None
            }
        }
    }

    /// Spawn the task that reacts to the monitor's offline notifications.
    pub fn spawn_connectivity_guard(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let mut rx = self.inner.monitor.events().subscribe();
        let controller = self.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    event = rx.recv() => match event {
                        Ok(ConnectivityEvent::Offline) => {
                            controller.revert_if_blocked().await;
                        }
                        Ok(_) => {}
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "connectivity events lagged");
                            controller.revert_if_blocked().await;
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            }
            debug!("connectivity guard stopped");
        })
    }

    // ── Diagnostics ──────────────────────────────────────────────

    pub fn current_mode(&self) -> Mode {
        self.inner.state.borrow().current
    }

    pub fn previous_mode(&self) -> Option<Mode> {
        self.inner.state.borrow().previous
    }

    /// Point-in-time copy of the controller state.
    pub fn state(&self) -> ModeState {
        self.inner.state.borrow().clone()
    }

    pub fn watch_state(&self) -> watch::Receiver<ModeState> {
        self.inner.state.subscribe()
    }

    pub fn policies(&self) -> &ModePolicyTable {
        &self.inner.policies
    }

    pub fn monitor(&self) -> &ConnectivityMonitor {
        &self.inner.monitor
    }

    pub fn events(&self) -> &EventBus<ModeEvent> {
        &self.inner.events
    }
}

impl std::fmt::Debug for ModeController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModeController")
            .field("state", &*self.inner.state.borrow())
            .field("handlers", &self.inner.handlers.len())
            .finish_non_exhaustive()
    }
}
