//! `vigil profiles`: configured poll profiles.

use serde::Serialize;
use tabled::Tabled;

use crate::cli::GlobalOpts;
use crate::config;
use crate::error::CliError;
use crate::output;

#[derive(Debug, Serialize)]
struct ProfileEntry {
    name: String,
    endpoint: String,
    interval_ms: u64,
    timeout_ms: u64,
    failure_threshold: u32,
    active: bool,
}

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct ProfileRow {
    #[tabled(rename = "")]
    marker: &'static str,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Endpoint")]
    endpoint: String,
    #[tabled(rename = "Interval")]
    interval: String,
    #[tabled(rename = "Timeout")]
    timeout: String,
    #[tabled(rename = "Threshold")]
    threshold: u32,
}

impl From<&ProfileEntry> for ProfileRow {
    fn from(p: &ProfileEntry) -> Self {
        Self {
            marker: if p.active { "*" } else { "" },
            name: p.name.clone(),
            endpoint: p.endpoint.clone(),
            interval: format!("{}ms", p.interval_ms),
            timeout: format!("{}ms", p.timeout_ms),
            threshold: p.failure_threshold,
        }
    }
}

fn millis(d: std::time::Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(global: &GlobalOpts) -> Result<(), CliError> {
    let plane_config = config::build_plane_config(global, None)?;
    let active = plane_config.monitor.active_profile;

    let entries: Vec<ProfileEntry> = plane_config
        .monitor
        .profiles
        .into_iter()
        .map(|p| ProfileEntry {
            active: p.name == active,
            interval_ms: millis(p.interval),
            timeout_ms: millis(p.timeout),
            failure_threshold: p.failure_threshold,
            endpoint: p.endpoint.to_string(),
            name: p.name,
        })
        .collect();

    let out = output::render_list(
        &global.output,
        &entries,
        |p| ProfileRow::from(p),
        |p| p.name.clone(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
