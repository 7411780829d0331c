// ── Domain model ──
//
// Closed enums for modes and connectivity verdicts, plus the per-mode
// policy table. Tables are built once at startup and never mutated.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};

use crate::error::CoreError;

// ── Mode ─────────────────────────────────────────────────────────

/// Top-level operating mode of the application.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Mode {
    /// Default 3D plant viewer.
    MainViewer,
    /// Editing equipment placement and mappings.
    EquipmentEdit,
    /// Live equipment telemetry.
    Monitoring,
    /// Historical trends and reports.
    Analytics,
    /// Replay of recorded sessions.
    Playback,
    Settings,
}

impl Mode {
    /// Parse a mode name, mapping failure to [`CoreError::UnknownMode`].
    pub fn parse(name: &str) -> Result<Self, CoreError> {
        name.parse().map_err(|_| CoreError::UnknownMode {
            name: name.to_owned(),
        })
    }
}

// ── Connectivity verdict ─────────────────────────────────────────

/// The monitor's current reachability conclusion.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ConnectivityVerdict {
    /// No probe has run yet.
    #[default]
    Unknown,
    /// First probe in flight.
    Checking,
    Online,
    Offline,
}

impl ConnectivityVerdict {
    pub fn is_online(self) -> bool {
        self == Self::Online
    }

    pub fn is_offline(self) -> bool {
        self == Self::Offline
    }
}

// ── Offline policy ───────────────────────────────────────────────

/// What happens when a connectivity-requiring mode is entered offline.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum OfflinePolicy {
    /// Refuse entry while offline; forced out when the backend drops.
    Block,
    /// Allow entry but flag it to the operator.
    Warn,
    /// Connectivity is ignored.
    Allow,
}

/// Static attributes of a mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModePolicy {
    pub requires_connectivity: bool,
    pub offline_policy: OfflinePolicy,
}

impl ModePolicy {
    pub const fn new(requires_connectivity: bool, offline_policy: OfflinePolicy) -> Self {
        Self {
            requires_connectivity,
            offline_policy,
        }
    }

    /// Whether a connectivity loss must force the operator out of this mode.
    pub fn blocks_offline(&self) -> bool {
        self.requires_connectivity && self.offline_policy == OfflinePolicy::Block
    }

    /// Built-in policy for each mode.
    pub fn builtin(mode: Mode) -> Self {
        match mode {
            Mode::MainViewer | Mode::Playback | Mode::Settings => {
                Self::new(false, OfflinePolicy::Allow)
            }
            Mode::EquipmentEdit | Mode::Analytics => Self::new(true, OfflinePolicy::Warn),
            Mode::Monitoring => Self::new(true, OfflinePolicy::Block),
        }
    }
}

// ── Policy table ─────────────────────────────────────────────────

/// Per-mode policies plus the designated default mode.
#[derive(Debug, Clone)]
pub struct ModePolicyTable {
    policies: HashMap<Mode, ModePolicy>,
    default_mode: Mode,
}

impl ModePolicyTable {
    /// Build a table from built-in policies with `overrides` applied.
    ///
    /// The default mode must always be enterable, so it may not carry a
    /// blocking connectivity requirement.
    pub fn new(
        default_mode: Mode,
        overrides: impl IntoIterator<Item = (Mode, ModePolicy)>,
    ) -> Result<Self, CoreError> {
        let mut policies: HashMap<Mode, ModePolicy> =
            Mode::iter().map(|m| (m, ModePolicy::builtin(m))).collect();
        policies.extend(overrides);

        let default_policy = policies
            .get(&default_mode)
            .copied()
            .unwrap_or_else(|| ModePolicy::builtin(default_mode));
        if default_policy.blocks_offline() {
            return Err(CoreError::InvalidDefaultMode {
                mode: default_mode,
                policy: default_policy.offline_policy,
            });
        }

        Ok(Self {
            policies,
            default_mode,
        })
    }

    pub fn default_mode(&self) -> Mode {
        self.default_mode
    }

    pub fn policy(&self, mode: Mode) -> ModePolicy {
        self.policies
            .get(&mode)
            .copied()
            .unwrap_or_else(|| ModePolicy::builtin(mode))
    }

    /// All `(mode, policy)` pairs in declaration order.
    pub fn entries(&self) -> Vec<(Mode, ModePolicy)> {
        Mode::iter().map(|m| (m, self.policy(m))).collect()
    }
}

impl Default for ModePolicyTable {
    fn default() -> Self {
        Self {
            policies: Mode::iter().map(|m| (m, ModePolicy::builtin(m))).collect(),
            default_mode: Mode::MainViewer,
        }
    }
}
