// ── Runtime control-plane configuration ──
//
// These types describe how the control plane runs: which poll profiles
// exist, which one is active at startup, and how each mode reacts to
// connectivity loss. They never touch disk; `vigil-config` builds them.

use std::collections::HashMap;
use std::time::Duration;

use url::Url;

use vigil_api::TransportConfig;

use crate::connectivity::MockConfig;
use crate::error::CoreError;
use crate::model::ModePolicyTable;
use crate::profile::{DEFAULT_PROFILE, PollProfile};

/// Configuration for a [`ConnectivityMonitor`](crate::ConnectivityMonitor).
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Available profiles, in declaration order.
    pub profiles: Vec<PollProfile>,
    /// Profile active at construction.
    pub active_profile: String,
    /// HTTP transport for profiles without their own entry.
    pub transport: TransportConfig,
    /// Per-profile transport (API key, TLS), keyed by profile name.
    pub profile_transports: HashMap<String, TransportConfig>,
    /// Start in mock mode with these settings.
    pub mock: Option<MockConfig>,
}

impl MonitorConfig {
    /// Single `default` profile probing `endpoint`.
    pub fn new(endpoint: Url) -> Self {
        Self {
            profiles: vec![PollProfile::new(DEFAULT_PROFILE, endpoint)],
            active_profile: DEFAULT_PROFILE.into(),
            transport: TransportConfig::default(),
            profile_transports: HashMap::new(),
            mock: None,
        }
    }

    /// Check that every profile is usable and the active one exists.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.profiles.is_empty() {
            return Err(CoreError::Config {
                message: "at least one poll profile is required".into(),
            });
        }
        for profile in &self.profiles {
            profile.validate()?;
        }
        if !self.profiles.iter().any(|p| p.name == self.active_profile) {
            return Err(CoreError::UnknownProfile {
                name: self.active_profile.clone(),
            });
        }
        if let Some(name) = self
            .profile_transports
            .keys()
            .find(|name| !self.profiles.iter().any(|p| &p.name == *name))
        {
            return Err(CoreError::UnknownProfile { name: name.clone() });
        }
        Ok(())
    }
}

/// Everything needed to build a [`ControlPlane`](crate::ControlPlane).
#[derive(Debug, Clone)]
pub struct ControlPlaneConfig {
    pub monitor: MonitorConfig,
    pub policies: ModePolicyTable,
    /// Defer the first probe by this long after `ControlPlane::start`.
    pub start_delay: Option<Duration>,
}

impl ControlPlaneConfig {
    pub fn new(endpoint: Url) -> Self {
        Self {
            monitor: MonitorConfig::new(endpoint),
            policies: ModePolicyTable::default(),
            start_delay: None,
        }
    }
}
