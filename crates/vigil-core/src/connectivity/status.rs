// ── Verdict bookkeeping ──
//
// Asymmetric hysteresis: one success recovers immediately, degradation
// needs `failure_threshold` consecutive failures.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::probe::ProbeOutcome;
use crate::model::ConnectivityVerdict;

/// A change in the externally visible verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerdictChange {
    pub previous: ConnectivityVerdict,
    pub current: ConnectivityVerdict,
}

/// Diagnostics snapshot of the monitor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectivityStatus {
    pub verdict: ConnectivityVerdict,
    pub consecutive_failures: u32,
    pub total_checks: u64,
    pub successful_checks: u64,
    pub last_check: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    /// Name of the active poll profile.
    pub profile: String,
    pub running: bool,
    pub mock_enabled: bool,
}

impl ConnectivityStatus {
    pub(crate) fn new(profile: String) -> Self {
        Self {
            verdict: ConnectivityVerdict::Unknown,
            consecutive_failures: 0,
            total_checks: 0,
            successful_checks: 0,
            last_check: None,
            last_success: None,
            profile,
            running: false,
            mock_enabled: false,
        }
    }

    /// Share of successful probes, `None` before the first probe.
    pub fn success_rate(&self) -> Option<f64> {
        if self.total_checks == 0 {
            return None;
        }
        Some(self.successful_checks as f64 / self.total_checks as f64)
    }

    /// Apply one probe outcome under `threshold`.
    pub(crate) fn record(
        &mut self,
        outcome: &ProbeOutcome,
        threshold: u32,
        now: DateTime<Utc>,
    ) -> Option<VerdictChange> {
        self.total_checks += 1;
        self.last_check = Some(now);

        if outcome.is_reachable() {
            self.consecutive_failures = 0;
            self.successful_checks += 1;
            self.last_success = Some(now);
            self.set_verdict(ConnectivityVerdict::Online)
        } else {
            self.consecutive_failures = self.consecutive_failures.saturating_add(1);
            if self.consecutive_failures >= threshold {
                self.set_verdict(ConnectivityVerdict::Offline)
            } else {
                None
            }
        }
    }

    /// Move `Unknown` to `Checking` when a probe begins.
    pub(crate) fn begin_check(&mut self) -> Option<VerdictChange> {
        if self.verdict == ConnectivityVerdict::Unknown {
            self.set_verdict(ConnectivityVerdict::Checking)
        } else {
            None
        }
    }

    pub(crate) fn set_verdict(&mut self, verdict: ConnectivityVerdict) -> Option<VerdictChange> {
        let previous = self.verdict;
        self.verdict = verdict;
        (previous != verdict).then_some(VerdictChange {
            previous,
            current: verdict,
        })
    }
}
