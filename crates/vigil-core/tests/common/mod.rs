// Shared fixtures for vigil-core integration tests.
#![allow(dead_code, clippy::unwrap_used)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use url::Url;

use vigil_core::{
    ConnectivityEvent, ConnectivityMonitor, EventBus, HealthProbe, ModeEvent, MonitorConfig,
    PollProfile, ProbeOutcome,
};

pub fn endpoint() -> Url {
    Url::parse("http://127.0.0.1:8080/api/health").unwrap()
}

pub fn ok() -> ProbeOutcome {
    ProbeOutcome::Reachable {
        latency: Duration::from_millis(3),
    }
}

pub fn fail() -> ProbeOutcome {
    ProbeOutcome::unreachable("connection refused")
}

// ── Probes ──────────────────────────────────────────────────────────

/// Answers from a script; unreachable once the script runs out.
#[derive(Default)]
pub struct ScriptedProbe {
    script: Mutex<VecDeque<ProbeOutcome>>,
    calls: Mutex<u32>,
}

impl ScriptedProbe {
    pub fn new(outcomes: Vec<ProbeOutcome>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(outcomes.into_iter().collect()),
            calls: Mutex::new(0),
        })
    }

    pub fn push(&self, outcome: ProbeOutcome) {
        self.script.lock().push_back(outcome);
    }

    pub fn calls(&self) -> u32 {
        *self.calls.lock()
    }
}

#[async_trait]
impl HealthProbe for ScriptedProbe {
    async fn probe(&self, _profile: &PollProfile) -> ProbeOutcome {
        *self.calls.lock() += 1;
        self.script.lock().pop_front().unwrap_or_else(fail)
    }
}

/// Blocks every probe until released.
#[derive(Default)]
pub struct GatedProbe {
    pub entered: Notify,
    pub release: Notify,
}

#[async_trait]
impl HealthProbe for GatedProbe {
    async fn probe(&self, _profile: &PollProfile) -> ProbeOutcome {
        self.entered.notify_one();
        self.release.notified().await;
        ok()
    }
}

// ── Builders ────────────────────────────────────────────────────────

pub fn profile(name: &str) -> PollProfile {
    PollProfile::new(name, endpoint())
        .with_interval(Duration::from_secs(5))
        .with_timeout(Duration::from_secs(1))
        .with_failure_threshold(2)
}

pub fn monitor_config() -> MonitorConfig {
    MonitorConfig {
        profiles: vec![
            profile("default"),
            profile("fast").with_interval(Duration::from_millis(500)),
        ],
        active_profile: "default".into(),
        ..MonitorConfig::new(endpoint())
    }
}

pub fn monitor(probe: Arc<dyn HealthProbe>) -> ConnectivityMonitor {
    ConnectivityMonitor::with_probe(monitor_config(), probe).unwrap()
}

// ── Event capture ───────────────────────────────────────────────────

/// Records every event emitted on a bus via a synchronous listener.
pub struct Recorder<E> {
    seen: Arc<Mutex<Vec<E>>>,
}

impl<E: Clone + Send + 'static> Recorder<E> {
    pub fn attach(bus: &EventBus<E>) -> Self {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        bus.listen(move |e: &E| sink.lock().push(e.clone()));
        Self { seen }
    }

    pub fn events(&self) -> Vec<E> {
        self.seen.lock().clone()
    }

    pub fn count(&self, f: impl Fn(&E) -> bool) -> usize {
        self.seen.lock().iter().filter(|e| f(e)).count()
    }
}

pub fn offline_count(rec: &Recorder<ConnectivityEvent>) -> usize {
    rec.count(|e| matches!(e, ConnectivityEvent::Offline))
}

pub fn online_count(rec: &Recorder<ConnectivityEvent>) -> usize {
    rec.count(|e| matches!(e, ConnectivityEvent::Online))
}

pub fn changed_count(rec: &Recorder<ModeEvent>) -> usize {
    rec.count(|e| matches!(e, ModeEvent::Changed { .. }))
}
