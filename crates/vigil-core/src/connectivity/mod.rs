// ── Connectivity monitor ──
//
// Turns a noisy periodic reachability probe into a debounced verdict and
// broadcasts verdict transitions. Knows nothing about modes.

mod probe;
mod status;

use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::{ArcSwap, ArcSwapOption};
use chrono::Utc;
use indexmap::IndexMap;
use parking_lot::Mutex;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::MonitorConfig;
use crate::error::CoreError;
use crate::events::{ConnectivityEvent, EventBus};
use crate::model::ConnectivityVerdict;
use crate::profile::{PollProfile, ProfileOverrides};

pub use probe::{HealthProbe, HttpProbe, MockConfig, MockProbe, ProbeOutcome};
pub use status::{ConnectivityStatus, VerdictChange};

/// How [`ConnectivityMonitor::start_for_mode`] should (re)start polling.
#[derive(Debug, Clone, Default)]
pub struct StartOptions {
    /// Start now when the monitor is stopped.
    pub immediate: bool,
    /// Otherwise schedule a delayed start after this long.
    pub delay: Option<Duration>,
    pub overrides: ProfileOverrides,
}

// ── Monitor ──────────────────────────────────────────────────────

/// Periodic backend reachability monitor.
///
/// Cheaply cloneable via `Arc<MonitorInner>`. Must be started from within
/// a Tokio runtime.
#[derive(Clone)]
pub struct ConnectivityMonitor {
    inner: Arc<MonitorInner>,
}

struct MonitorInner {
    profiles: IndexMap<String, PollProfile>,
    active: ArcSwap<PollProfile>,
    probe: Arc<dyn HealthProbe>,
    mock: ArcSwapOption<MockProbe>,
    status: watch::Sender<ConnectivityStatus>,
    events: EventBus<ConnectivityEvent>,
    control: Mutex<Control>,
}

/// Scheduling state. Held only for short synchronous sections, never
/// across an await.
#[derive(Default)]
struct Control {
    poll: Option<PollTask>,
    in_flight: Option<Ticket>,
    delayed: Option<Ticket>,
    next_ticket: u64,
}

impl Control {
    fn issue(&mut self) -> Ticket {
        self.next_ticket += 1;
        Ticket {
            id: self.next_ticket,
            cancel: CancellationToken::new(),
        }
    }
}

struct PollTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

#[derive(Clone)]
struct Ticket {
    id: u64,
    cancel: CancellationToken,
}

impl ConnectivityMonitor {
    /// Build a monitor probing over HTTP.
    pub fn new(config: MonitorConfig) -> Result<Self, CoreError> {
        let probe = Arc::new(HttpProbe::new(
            &config.transport,
            &config.profile_transports,
        )?);
        Self::with_probe(config, probe)
    }

    /// Build a monitor around a custom probe.
    pub fn with_probe(
        config: MonitorConfig,
        probe: Arc<dyn HealthProbe>,
    ) -> Result<Self, CoreError> {
        config.validate()?;

        let profiles: IndexMap<String, PollProfile> = config
            .profiles
            .into_iter()
            .map(|p| (p.name.clone(), p))
            .collect();
        let active = profiles
            .get(&config.active_profile)
            .cloned()
            .ok_or_else(|| CoreError::UnknownProfile {
                name: config.active_profile.clone(),
            })?;

        let mut status = ConnectivityStatus::new(active.name.clone());
        status.mock_enabled = config.mock.is_some();
        let (status, _) = watch::channel(status);

        Ok(Self {
            inner: Arc::new(MonitorInner {
                profiles,
                active: ArcSwap::from_pointee(active),
                probe,
                mock: ArcSwapOption::from(config.mock.map(|m| Arc::new(MockProbe::new(&m)))),
                status,
                events: EventBus::new(),
                control: Mutex::new(Control::default()),
            }),
        })
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Start polling: one probe now, then one every `interval`.
    ///
    /// No-op when already running. Cancels a pending delayed start.
    pub fn start(&self, profile: Option<&str>) -> Result<&Self, CoreError> {
        let selected = profile.map(|name| self.lookup(name)).transpose()?;

        let mut control = self.inner.control.lock();
        if control.poll.is_some() {
            debug!("connectivity monitor already running");
            return Ok(self);
        }
        if let Some(pending) = control.delayed.take() {
            pending.cancel.cancel();
            debug!("immediate start superseded delayed start");
        }

        let profile_change = selected.and_then(|p| self.set_active(p));
        let active = self.inner.active.load_full();

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(poll_task(self.clone(), active.interval, cancel.clone()));
        control.poll = Some(PollTask { cancel, handle });
        self.inner.status.send_modify(|s| s.running = true);
        drop(control);

        info!(
            profile = %active.name,
            interval = ?active.interval,
            threshold = active.failure_threshold,
            "connectivity monitor started"
        );
        if let Some((previous, current)) = profile_change {
            self.inner
                .events
                .emit(ConnectivityEvent::ProfileChanged { previous, current });
        }
        Ok(self)
    }

    /// Stop polling, abort any in-flight probe, and drop a pending
    /// delayed start. Idempotent.
    pub fn stop(&self) {
        let mut control = self.inner.control.lock();
        let was_running = if let Some(task) = control.poll.take() {
            task.cancel.cancel();
            task.handle.abort();
            true
        } else {
            false
        };
        if let Some(probe) = control.in_flight.take() {
            probe.cancel.cancel();
        }
        if let Some(pending) = control.delayed.take() {
            pending.cancel.cancel();
        }
        self.inner.status.send_if_modified(|s| {
            let changed = s.running;
            s.running = false;
            changed
        });
        drop(control);

        if was_running {
            info!("connectivity monitor stopped");
        }
    }

    /// Schedule a `start()` after `delay`, replacing any pending one.
    pub fn delayed_start(
        &self,
        delay: Duration,
        profile_override: Option<&str>,
    ) -> Result<DelayedStart, CoreError> {
        if let Some(name) = profile_override {
            self.lookup(name)?;
        }
        let profile = profile_override.map(str::to_owned);

        let ticket = {
            let mut control = self.inner.control.lock();
            if let Some(previous) = control.delayed.take() {
                previous.cancel.cancel();
                debug!("replacing pending delayed start");
            }
            let ticket = control.issue();
            control.delayed = Some(ticket.clone());
            ticket
        };

        let (tx, rx) = oneshot::channel();
        let monitor = self.clone();
        let task_ticket = ticket.clone();
        let task_profile = profile.clone();
        tokio::spawn(async move {
            let started = tokio::select! {
                biased;
                () = task_ticket.cancel.cancelled() => {
                    monitor.clear_delayed(task_ticket.id);
                    false
                }
                () = tokio::time::sleep(delay) => {
                    if monitor.clear_delayed(task_ticket.id) {
                        monitor.start(task_profile.as_deref()).is_ok()
                    } else {
                        false
                    }
                }
            };
            let _ = tx.send(started);
        });

        debug!(?delay, ?profile, "delayed start scheduled");
        self.inner
            .events
            .emit(ConnectivityEvent::DelayedStartScheduled { delay, profile });

        Ok(DelayedStart {
            cancel: ticket.cancel,
            started: rx,
        })
    }

    /// Switch to `profile_name` (with overrides) and restart or defer.
    pub fn start_for_mode(
        &self,
        profile_name: &str,
        options: StartOptions,
    ) -> Result<Option<DelayedStart>, CoreError> {
        let profile = self.lookup(profile_name)?.apply(&options.overrides);
        profile.validate()?;

        let previous = self.inner.active.load().name.clone();
        self.inner.active.store(Arc::new(profile));
        self.inner
            .status
            .send_modify(|s| s.profile = profile_name.to_owned());
        info!(%previous, current = %profile_name, "poll profile changed");
        self.inner.events.emit(ConnectivityEvent::ProfileChanged {
            previous,
            current: profile_name.to_owned(),
        });

        if self.is_running() {
            self.stop();
            self.start(None)?;
            return Ok(None);
        }
        if options.immediate {
            self.start(None)?;
            return Ok(None);
        }
        match options.delay {
            Some(delay) => self.delayed_start(delay, None).map(Some),
            None => Ok(None),
        }
    }

    // ── Probing ──────────────────────────────────────────────────

    /// Run one probe outside the schedule.
    ///
    /// Supersedes a still-pending probe. Returns `None` when this probe is
    /// itself superseded or the monitor is stopped before it completes.
    pub async fn check_health(&self) -> Option<ProbeOutcome> {
        self.run_probe().await
    }

    async fn run_probe(&self) -> Option<ProbeOutcome> {
        let profile = self.inner.active.load_full();

        let ticket = {
            let mut control = self.inner.control.lock();
            if let Some(previous) = control.in_flight.take() {
                previous.cancel.cancel();
                debug!("superseding in-flight probe");
            }
            let ticket = control.issue();
            control.in_flight = Some(ticket.clone());
            ticket
        };

        let mut checking = None;
        self.inner
            .status
            .send_if_modified(|s| {
                checking = s.begin_check();
                checking.is_some()
            });
        self.inner.events.emit(ConnectivityEvent::CheckStarted {
            profile: profile.name.clone(),
        });
        if let Some(change) = checking {
            self.announce(change);
        }

        let probe = self.current_probe();
        let outcome = tokio::select! {
            biased;
            () = ticket.cancel.cancelled() => {
                debug!("probe aborted before completion");
                return None;
            }
            res = tokio::time::timeout(profile.timeout, probe.probe(&profile)) => {
                res.unwrap_or_else(|_| {
                    ProbeOutcome::unreachable(format!(
                        "timed out after {}ms",
                        profile.timeout.as_millis()
                    ))
                })
            }
        };

        // Cancellation is checked under the control lock so a concurrent
        // stop() either wins entirely or observes the applied result.
        let (change, consecutive_failures) = {
            let mut control = self.inner.control.lock();
            if ticket.cancel.is_cancelled() {
                debug!("discarding stale probe result");
                return None;
            }
            if control.in_flight.as_ref().is_some_and(|t| t.id == ticket.id) {
                control.in_flight = None;
            }
            let mut change = None;
            let mut failures = 0;
            self.inner.status.send_modify(|s| {
                change = s.record(&outcome, profile.failure_threshold, Utc::now());
                failures = s.consecutive_failures;
            });
            (change, failures)
        };

        if let ProbeOutcome::Unreachable { reason } = &outcome {
            debug!(%reason, consecutive_failures, "backend unreachable");
        }
        self.inner.events.emit(ConnectivityEvent::CheckCompleted {
            outcome: outcome.clone(),
            consecutive_failures,
        });
        if let Some(change) = change {
            self.announce(change);
        }
        Some(outcome)
    }

    fn current_probe(&self) -> Arc<dyn HealthProbe> {
        if let Some(mock) = self.inner.mock.load_full() {
            return mock;
        }
        Arc::clone(&self.inner.probe)
    }

    // ── Overrides ────────────────────────────────────────────────

    /// Set the verdict to `Online`, bypassing probe and hysteresis.
    pub fn force_online(&self) {
        warn!("connectivity verdict forced online");
        self.override_verdict(ConnectivityVerdict::Online);
    }

    /// Set the verdict to `Offline`, bypassing probe and hysteresis.
    pub fn force_offline(&self) {
        warn!("connectivity verdict forced offline");
        self.override_verdict(ConnectivityVerdict::Offline);
    }

    fn override_verdict(&self, verdict: ConnectivityVerdict) {
        let mut change = None;
        self.inner.status.send_if_modified(|s| {
            if verdict.is_online() {
                s.consecutive_failures = 0;
            }
            change = s.set_verdict(verdict);
            change.is_some()
        });
        if let Some(change) = change {
            self.announce(change);
        }
    }

    /// Replace the real probe with a simulated one.
    pub fn enable_mock_mode(&self, config: &MockConfig) {
        self.inner.mock.store(Some(Arc::new(MockProbe::new(config))));
        self.inner.status.send_modify(|s| s.mock_enabled = true);
        info!(
            is_online = config.is_online,
            delay = ?config.response_delay,
            failure_probability = config.failure_probability,
            "mock mode enabled"
        );
    }

    /// Restore the real probe.
    pub fn disable_mock_mode(&self) {
        if self.inner.mock.swap(None).is_some() {
            self.inner.status.send_modify(|s| s.mock_enabled = false);
            info!("mock mode disabled");
        }
    }

    /// Flip the simulated backend and apply the verdict immediately.
    ///
    /// Returns `false` (and does nothing) when mock mode is off.
    pub fn set_mock_online(&self, online: bool) -> bool {
        let Some(mock) = self.inner.mock.load_full() else {
            debug!("set_mock_online ignored: mock mode disabled");
            return false;
        };
        mock.set_online(online);
        self.override_verdict(if online {
            ConnectivityVerdict::Online
        } else {
            ConnectivityVerdict::Offline
        });
        true
    }

    // ── Diagnostics ──────────────────────────────────────────────

    pub fn verdict(&self) -> ConnectivityVerdict {
        self.inner.status.borrow().verdict
    }

    pub fn is_online(&self) -> bool {
        self.verdict().is_online()
    }

    pub fn is_running(&self) -> bool {
        self.inner.control.lock().poll.is_some()
    }

    pub fn is_mock_enabled(&self) -> bool {
        self.inner.mock.load().is_some()
    }

    /// Point-in-time copy of counters and verdict.
    pub fn status(&self) -> ConnectivityStatus {
        self.inner.status.borrow().clone()
    }

    /// Subscribe to status changes.
    pub fn watch_status(&self) -> watch::Receiver<ConnectivityStatus> {
        self.inner.status.subscribe()
    }

    /// The profile currently in effect, overrides included.
    pub fn active_profile(&self) -> Arc<PollProfile> {
        self.inner.active.load_full()
    }

    /// Configured profiles in declaration order.
    pub fn profiles(&self) -> impl Iterator<Item = &PollProfile> {
        self.inner.profiles.values()
    }

    pub fn events(&self) -> &EventBus<ConnectivityEvent> {
        &self.inner.events
    }

    // ── Helpers ──────────────────────────────────────────────────

    fn lookup(&self, name: &str) -> Result<PollProfile, CoreError> {
        self.inner
            .profiles
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::UnknownProfile { name: name.into() })
    }

    /// Install `profile`, returning `(previous, current)` names if it changed.
    fn set_active(&self, profile: PollProfile) -> Option<(String, String)> {
        let previous = self.inner.active.load().name.clone();
        let current = profile.name.clone();
        self.inner.active.store(Arc::new(profile));
        self.inner
            .status
            .send_if_modified(|s| {
                let changed = s.profile != current;
                s.profile.clone_from(&current);
                changed
            })
            .then_some((previous, current))
    }

    /// Returns `true` if `id` was still the pending delayed start.
    fn clear_delayed(&self, id: u64) -> bool {
        let mut control = self.inner.control.lock();
        if control.delayed.as_ref().is_some_and(|t| t.id == id) {
            control.delayed = None;
            true
        } else {
            false
        }
    }

    fn announce(&self, change: VerdictChange) {
        info!(previous = %change.previous, current = %change.current, "connectivity verdict changed");
        self.inner.events.emit(ConnectivityEvent::VerdictChanged {
            previous: change.previous,
            current: change.current,
        });
        match change.current {
            ConnectivityVerdict::Online => self.inner.events.emit(ConnectivityEvent::Online),
            ConnectivityVerdict::Offline => self.inner.events.emit(ConnectivityEvent::Offline),
            ConnectivityVerdict::Unknown | ConnectivityVerdict::Checking => {}
        }
    }
}

impl std::fmt::Debug for ConnectivityMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectivityMonitor")
            .field("status", &*self.inner.status.borrow())
            .finish_non_exhaustive()
    }
}

// ── Delayed start handle ─────────────────────────────────────────

/// Pending [`ConnectivityMonitor::delayed_start`].
///
/// Awaiting it yields `true` once polling has actually begun, `false` if
/// the start was cancelled or replaced.
pub struct DelayedStart {
    cancel: CancellationToken,
    started: oneshot::Receiver<bool>,
}

impl DelayedStart {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl IntoFuture for DelayedStart {
    type Output = bool;
    type IntoFuture = Pin<Box<dyn Future<Output = bool> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move { self.started.await.unwrap_or(false) })
    }
}

impl std::fmt::Debug for DelayedStart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DelayedStart")
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

// ── Background task ──────────────────────────────────────────────

/// Probe on a fixed interval until cancelled. The first tick fires
/// immediately.
async fn poll_task(monitor: ConnectivityMonitor, period: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                monitor.run_probe().await;
            }
        }
    }
}
