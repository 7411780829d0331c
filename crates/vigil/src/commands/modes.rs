//! `vigil modes`: per-mode connectivity policy table.

use serde::Serialize;
use tabled::Tabled;

use vigil_core::{Mode, OfflinePolicy};

use crate::cli::GlobalOpts;
use crate::config;
use crate::error::CliError;
use crate::output;

#[derive(Debug, Serialize)]
struct ModeEntry {
    mode: Mode,
    requires_connectivity: bool,
    offline_policy: OfflinePolicy,
    default: bool,
}

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct ModeRow {
    #[tabled(rename = "Mode")]
    mode: String,
    #[tabled(rename = "Needs Backend")]
    requires: &'static str,
    #[tabled(rename = "When Offline")]
    policy: String,
    #[tabled(rename = "Default")]
    default: &'static str,
}

impl From<&ModeEntry> for ModeRow {
    fn from(e: &ModeEntry) -> Self {
        Self {
            mode: e.mode.to_string(),
            requires: if e.requires_connectivity { "yes" } else { "no" },
            policy: if e.requires_connectivity {
                e.offline_policy.to_string()
            } else {
                "-".into()
            },
            default: if e.default { "*" } else { "" },
        }
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = config::load(global)?;
    let table = cfg.policy_table()?;

    let entries: Vec<ModeEntry> = table
        .entries()
        .into_iter()
        .map(|(mode, policy)| ModeEntry {
            mode,
            requires_connectivity: policy.requires_connectivity,
            offline_policy: policy.offline_policy,
            default: mode == table.default_mode(),
        })
        .collect();

    let out = output::render_list(
        &global.output,
        &entries,
        |e| ModeRow::from(e),
        |e| e.mode.to_string(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
