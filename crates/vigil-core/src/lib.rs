//! Mode state machine and backend connectivity monitor for the vigil
//! visualization client.
//!
//! - **[`ModeController`]**: Holds the single active [`Mode`], an overlay
//!   stack for suspended modes, and a lock flag. Transitions run guard
//!   checks against each mode's [`ModePolicy`] and the current
//!   [`ConnectivityVerdict`], then the registered [`ModeHandler`] exit and
//!   enter hooks.
//!
//! - **[`ConnectivityMonitor`]**: Probes the backend health endpoint on a
//!   fixed interval using the active [`PollProfile`], debouncing failures
//!   with a consecutive-failure threshold before reporting offline.
//!   Supports delayed and per-mode starts, forced verdicts, and a mock
//!   probe for demos and tests.
//!
//! - **[`ControlPlane`]**: Owns one of each and the background guard that
//!   forces the controller out of connectivity-dependent modes when the
//!   monitor reports offline.
//!
//! Both components publish typed notifications through an [`EventBus`].

pub mod config;
pub mod connectivity;
pub mod error;
pub mod events;
pub mod mode;
pub mod model;
pub mod plane;
pub mod profile;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{ControlPlaneConfig, MonitorConfig};
pub use connectivity::{
    ConnectivityMonitor, ConnectivityStatus, DelayedStart, HealthProbe, HttpProbe, MockConfig,
    MockProbe, ProbeOutcome, StartOptions,
};
pub use error::CoreError;
pub use events::{ConnectivityEvent, EventBus, ListenerId, ModeEvent};
pub use mode::{
    EnterCheck, EnterContext, EnterReason, ExitContext, HookError, HookPhase, ModeController,
    ModeHandler, ModeState, SwitchError, SwitchOptions, SwitchOutcome,
};
pub use model::{ConnectivityVerdict, Mode, ModePolicy, ModePolicyTable, OfflinePolicy};
pub use plane::ControlPlane;
pub use profile::{PollProfile, ProfileOverrides};
