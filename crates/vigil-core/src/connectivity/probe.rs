// ── Reachability probes ──
//
// A probe answers one question per call: is the backend reachable right
// now? Errors never escape; every failure is an `Unreachable` outcome.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tracing::debug;

use vigil_api::{HealthClient, TransportConfig};

use crate::error::CoreError;
use crate::profile::PollProfile;

/// Binary result of a single probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Reachable { latency: Duration },
    Unreachable { reason: String },
}

impl ProbeOutcome {
    pub fn unreachable(reason: impl Into<String>) -> Self {
        Self::Unreachable {
            reason: reason.into(),
        }
    }

    pub fn is_reachable(&self) -> bool {
        matches!(self, Self::Reachable { .. })
    }
}

/// Backend reachability check.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn probe(&self, profile: &PollProfile) -> ProbeOutcome;
}

// ── HTTP probe ───────────────────────────────────────────────────

/// Probes the profile's endpoint over HTTP.
///
/// Each profile with its own transport gets a dedicated client, so API
/// keys and TLS settings follow the active profile.
pub struct HttpProbe {
    fallback: HealthClient,
    clients: HashMap<String, HealthClient>,
}

impl HttpProbe {
    /// One client per entry in `profiles`, `fallback` for the rest.
    pub fn new(
        fallback: &TransportConfig,
        profiles: &HashMap<String, TransportConfig>,
    ) -> Result<Self, CoreError> {
        let clients = profiles
            .iter()
            .map(|(name, transport)| Ok((name.clone(), HealthClient::new(transport)?)))
            .collect::<Result<HashMap<_, _>, CoreError>>()?;
        Ok(Self {
            fallback: HealthClient::new(fallback)?,
            clients,
        })
    }

    fn client_for(&self, profile: &str) -> &HealthClient {
        self.clients.get(profile).unwrap_or(&self.fallback)
    }
}

#[async_trait]
impl HealthProbe for HttpProbe {
    async fn probe(&self, profile: &PollProfile) -> ProbeOutcome {
        let client = self.client_for(&profile.name);
        match client.check(&profile.endpoint, profile.timeout).await {
            Ok(report) => ProbeOutcome::Reachable {
                latency: report.latency,
            },
            Err(e) => {
                debug!(endpoint = %profile.endpoint, error = %e, "health probe failed");
                ProbeOutcome::unreachable(e.to_string())
            }
        }
    }
}

// ── Mock probe ───────────────────────────────────────────────────

/// Settings for the simulated probe used by demos and diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct MockConfig {
    pub is_online: bool,
    pub response_delay: Duration,
    /// Chance in `[0, 1]` that a probe fails regardless of `is_online`.
    pub failure_probability: f64,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            is_online: true,
            response_delay: Duration::from_millis(100),
            failure_probability: 0.0,
        }
    }
}

/// Simulated probe: waits `response_delay`, then answers per its settings.
#[derive(Debug)]
pub struct MockProbe {
    online: AtomicBool,
    response_delay: Duration,
    failure_probability: f64,
}

impl MockProbe {
    pub fn new(config: &MockConfig) -> Self {
        Self {
            online: AtomicBool::new(config.is_online),
            response_delay: config.response_delay,
            failure_probability: config.failure_probability.clamp(0.0, 1.0),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    fn roll_failure(&self) -> bool {
        self.failure_probability > 0.0 && rand::thread_rng().gen_bool(self.failure_probability)
    }
}

#[async_trait]
impl HealthProbe for MockProbe {
    async fn probe(&self, _profile: &PollProfile) -> ProbeOutcome {
        if !self.response_delay.is_zero() {
            tokio::time::sleep(self.response_delay).await;
        }

        if self.roll_failure() {
            return ProbeOutcome::unreachable("simulated failure");
        }
        if self.is_online() {
            ProbeOutcome::Reachable {
                latency: self.response_delay,
            }
        } else {
            ProbeOutcome::unreachable("simulated offline")
        }
    }
}
