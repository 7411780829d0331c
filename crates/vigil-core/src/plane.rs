// ── Control plane ──
//
// Wires one ConnectivityMonitor to one ModeController and owns the
// background task that connects them.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::ControlPlaneConfig;
use crate::connectivity::{ConnectivityMonitor, DelayedStart, HealthProbe};
use crate::error::CoreError;
use crate::mode::ModeController;

/// Monitor plus controller, started and stopped together.
///
/// Cheaply cloneable via `Arc<PlaneInner>`.
#[derive(Clone)]
pub struct ControlPlane {
    inner: Arc<PlaneInner>,
}

struct PlaneInner {
    monitor: ConnectivityMonitor,
    modes: ModeController,
    start_delay: Option<Duration>,
    cancel: Mutex<Option<CancellationToken>>,
    guard: Mutex<Option<JoinHandle<()>>>,
    pending: Mutex<Option<DelayedStart>>,
}

impl ControlPlane {
    /// Build a control plane probing over HTTP.
    pub fn new(config: ControlPlaneConfig) -> Result<Self, CoreError> {
        let monitor = ConnectivityMonitor::new(config.monitor)?;
        let modes = ModeController::new(config.policies, monitor.clone());
        Ok(Self::from_parts(monitor, modes, config.start_delay))
    }

    /// Build a control plane around a custom probe.
    pub fn with_probe(
        config: ControlPlaneConfig,
        probe: Arc<dyn HealthProbe>,
    ) -> Result<Self, CoreError> {
        let monitor = ConnectivityMonitor::with_probe(config.monitor, probe)?;
        let modes = ModeController::new(config.policies, monitor.clone());
        Ok(Self::from_parts(monitor, modes, config.start_delay))
    }

    /// Assemble from existing components. `modes` should observe `monitor`.
    pub fn from_parts(
        monitor: ConnectivityMonitor,
        modes: ModeController,
        start_delay: Option<Duration>,
    ) -> Self {
        Self {
            inner: Arc::new(PlaneInner {
                monitor,
                modes,
                start_delay,
                cancel: Mutex::new(None),
                guard: Mutex::new(None),
                pending: Mutex::new(None),
            }),
        }
    }

    pub fn monitor(&self) -> &ConnectivityMonitor {
        &self.inner.monitor
    }

    pub fn modes(&self) -> &ModeController {
        &self.inner.modes
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Spawn the connectivity guard and begin polling.
    ///
    /// With a configured start delay the first probe is deferred. Calling
    /// `start` on a started plane is a no-op.
    pub fn start(&self) -> Result<(), CoreError> {
        {
            let mut cancel = self.inner.cancel.lock();
            if cancel.is_some() {
                debug!("control plane already started");
                return Ok(());
            }
            let token = CancellationToken::new();
            let handle = self.inner.modes.spawn_connectivity_guard(token.child_token());
            *self.inner.guard.lock() = Some(handle);
            *cancel = Some(token);
        }

        match self.inner.start_delay {
            Some(delay) => {
                let pending = self.inner.monitor.delayed_start(delay, None)?;
                *self.inner.pending.lock() = Some(pending);
            }
            None => {
                self.inner.monitor.start(None)?;
            }
        }

        info!(
            mode = %self.inner.modes.current_mode(),
            delay = ?self.inner.start_delay,
            "control plane started"
        );
        Ok(())
    }

    /// Stop polling and wait for the guard task to exit.
    pub async fn shutdown(&self) {
        let token = self.inner.cancel.lock().take();
        let Some(token) = token else {
            return;
        };
        token.cancel();

        if let Some(pending) = self.inner.pending.lock().take() {
            pending.cancel();
        }
        self.inner.monitor.stop();

        let guard = self.inner.guard.lock().take();
        if let Some(handle) = guard {
            let _ = handle.await;
        }
        info!("control plane shut down");
    }

    pub fn is_started(&self) -> bool {
        self.inner.cancel.lock().is_some()
    }
}

impl std::fmt::Debug for ControlPlane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlPlane")
            .field("monitor", &self.inner.monitor)
            .field("modes", &self.inner.modes)
            .field("started", &self.is_started())
            .finish()
    }
}
