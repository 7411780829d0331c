//! `vigil check`: one probe against the active profile.

use serde::Serialize;

use vigil_core::{ConnectivityMonitor, ConnectivityVerdict, ProbeOutcome};

use crate::cli::{CheckArgs, GlobalOpts};
use crate::config;
use crate::error::CliError;
use crate::output;

#[derive(Debug, Serialize)]
struct CheckReport {
    profile: String,
    endpoint: String,
    verdict: ConnectivityVerdict,
    reachable: bool,
    latency_ms: Option<f64>,
    reason: Option<String>,
    mock: bool,
}

impl CheckReport {
    fn detail(&self, color: bool) -> String {
        use std::fmt::Write;
        let mut out = String::new();
        let _ = writeln!(out, "Profile:   {}", self.profile);
        let _ = writeln!(out, "Endpoint:  {}", self.endpoint);
        let _ = write!(
            out,
            "Verdict:   {}",
            output::verdict_label(self.verdict, color)
        );
        if let Some(ms) = self.latency_ms {
            let _ = write!(out, "\nLatency:   {ms:.1}ms");
        }
        if let Some(ref reason) = self.reason {
            let _ = write!(out, "\nReason:    {reason}");
        }
        if self.mock {
            let _ = write!(out, "\nMock:      yes");
        }
        out
    }
}

pub async fn handle(args: CheckArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let plane_config = config::build_plane_config(global, Some(&args.mock))?;
    let monitor = ConnectivityMonitor::new(plane_config.monitor)?;
    let profile = monitor.active_profile();

    tracing::debug!(endpoint = %profile.endpoint, "running single probe");
    // The only probe in flight, so it is never superseded.
    let outcome = monitor
        .check_health()
        .await
        .unwrap_or_else(|| ProbeOutcome::unreachable("probe aborted"));

    let (latency_ms, reason) = match &outcome {
        ProbeOutcome::Reachable { latency } => (Some(latency.as_secs_f64() * 1000.0), None),
        ProbeOutcome::Unreachable { reason } => (None, Some(reason.clone())),
    };
    let report = CheckReport {
        profile: profile.name.clone(),
        endpoint: profile.endpoint.to_string(),
        verdict: if outcome.is_reachable() {
            ConnectivityVerdict::Online
        } else {
            ConnectivityVerdict::Offline
        },
        reachable: outcome.is_reachable(),
        latency_ms,
        reason,
        mock: monitor.is_mock_enabled(),
    };

    let color = output::should_color(&global.color);
    let out = output::render_single(
        &global.output,
        &report,
        |r| r.detail(color),
        |r| r.verdict.to_string(),
    )?;
    output::print_output(&out, global.quiet);

    match outcome {
        ProbeOutcome::Reachable { .. } => Ok(()),
        ProbeOutcome::Unreachable { reason } => Err(CliError::Unreachable {
            endpoint: report.endpoint,
            reason,
        }),
    }
}
