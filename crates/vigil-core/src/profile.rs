// ── Poll profiles ──
//
// Named bundles of probe settings. The monitor always runs under exactly
// one active profile; modes that need tighter polling switch profiles via
// `ConnectivityMonitor::start_for_mode`.

use std::time::Duration;

use serde::Serialize;
use url::Url;

use crate::error::CoreError;

pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(5000);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(3000);
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 2;

/// Name of the profile every monitor starts with.
pub const DEFAULT_PROFILE: &str = "default";

/// Probe configuration bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PollProfile {
    pub name: String,
    pub endpoint: Url,
    pub interval: Duration,
    pub timeout: Duration,
    /// Consecutive failures required before the verdict flips offline.
    pub failure_threshold: u32,
}

impl PollProfile {
    /// Profile with default timing against `endpoint`.
    pub fn new(name: impl Into<String>, endpoint: Url) -> Self {
        Self {
            name: name.into(),
            endpoint,
            interval: DEFAULT_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Reject settings the scheduler cannot run with.
    pub fn validate(&self) -> Result<(), CoreError> {
        let invalid = |reason: &str| CoreError::InvalidProfile {
            name: self.name.clone(),
            reason: reason.into(),
        };

        if self.name.trim().is_empty() {
            return Err(invalid("name must not be empty"));
        }
        if self.interval.is_zero() {
            return Err(invalid("interval must be greater than zero"));
        }
        if self.timeout.is_zero() {
            return Err(invalid("timeout must be greater than zero"));
        }
        if self.failure_threshold == 0 {
            return Err(invalid("failure_threshold must be at least 1"));
        }
        if !matches!(self.endpoint.scheme(), "http" | "https") {
            return Err(invalid("endpoint must be an http(s) URL"));
        }
        Ok(())
    }

    /// Apply per-start overrides on top of this profile.
    pub fn apply(&self, overrides: &ProfileOverrides) -> Self {
        Self {
            name: self.name.clone(),
            endpoint: overrides
                .endpoint
                .clone()
                .unwrap_or_else(|| self.endpoint.clone()),
            interval: overrides.interval.unwrap_or(self.interval),
            timeout: overrides.timeout.unwrap_or(self.timeout),
            failure_threshold: overrides
                .failure_threshold
                .unwrap_or(self.failure_threshold),
        }
    }
}

/// Optional per-field overrides for a named profile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileOverrides {
    pub endpoint: Option<Url>,
    pub interval: Option<Duration>,
    pub timeout: Option<Duration>,
    pub failure_threshold: Option<u32>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn endpoint() -> Url {
        Url::parse("http://127.0.0.1:8080/api/health").unwrap()
    }

    #[test]
    fn defaults_match_documented_values() {
        let p = PollProfile::new("default", endpoint());
        assert_eq!(p.interval, Duration::from_secs(5));
        assert_eq!(p.timeout, Duration::from_secs(3));
        assert_eq!(p.failure_threshold, 2);
        assert!(p.validate().is_ok());
    }

    #[test]
    fn zero_threshold_is_invalid() {
        let p = PollProfile::new("fast", endpoint()).with_failure_threshold(0);
        let err = p.validate().unwrap_err();
        assert!(matches!(err, CoreError::InvalidProfile { name, .. } if name == "fast"));
    }

    #[test]
    fn non_http_endpoint_is_invalid() {
        let p = PollProfile::new("ws", Url::parse("ws://127.0.0.1/live").unwrap());
        assert!(p.validate().is_err());
    }

    #[test]
    fn overrides_only_touch_given_fields() {
        let base = PollProfile::new("default", endpoint());
        let merged = base.apply(&ProfileOverrides {
            interval: Some(Duration::from_secs(1)),
            ..ProfileOverrides::default()
        });
        assert_eq!(merged.interval, Duration::from_secs(1));
        assert_eq!(merged.timeout, base.timeout);
        assert_eq!(merged.endpoint, base.endpoint);
    }
}
