//! CLI error types with miette diagnostics.
//!
//! Maps config, core, and transition errors into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use vigil_config::ConfigError;
use vigil_core::{CoreError, SwitchError};

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connectivity ─────────────────────────────────────────────────

    #[error("Backend unreachable at {endpoint}: {reason}")]
    #[diagnostic(
        code(vigil::unreachable),
        help(
            "Check that the backend is running and the health endpoint is correct.\n\
             Try: vigil check --endpoint <url> -vv"
        )
    )]
    Unreachable { endpoint: String, reason: String },

    #[error("Mode switch failed: {0}")]
    #[diagnostic(
        code(vigil::mode_switch),
        help("Run: vigil modes to see which modes require connectivity")
    )]
    Switch(#[from] SwitchError),

    // ── Configuration ────────────────────────────────────────────────

    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(vigil::profile_not_found),
        help("Available profiles: {available}")
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No poll profile configured")]
    #[diagnostic(
        code(vigil::no_config),
        help(
            "Pass --endpoint <url>, or add a [profiles.<name>] section to\n\
             {path}"
        )
    )]
    NoConfig { path: String },

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(vigil::validation))]
    Validation { field: String, reason: String },

    #[error(transparent)]
    #[diagnostic(code(vigil::config))]
    Config(Box<figment::Error>),

    #[error(transparent)]
    #[diagnostic(code(vigil::core))]
    Core(#[from] CoreError),

    // ── IO / Serialization ────────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to render JSON: {0}")]
    #[diagnostic(code(vigil::json))]
    Json(#[from] serde_json::Error),

    #[error("Failed to render YAML: {0}")]
    #[diagnostic(code(vigil::yaml))]
    Yaml(#[from] serde_yaml::Error),

    #[error("Failed to serialize config: {0}")]
    #[diagnostic(code(vigil::toml))]
    Toml(#[from] toml::ser::Error),
}

impl From<figment::Error> for CliError {
    fn from(err: figment::Error) -> Self {
        Self::Config(Box::new(err))
    }
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Unreachable { .. } => exit_code::CONNECTION,
            Self::ProfileNotFound { .. } => exit_code::NOT_FOUND,
            Self::Validation { .. } | Self::NoConfig { .. } => exit_code::USAGE,
            Self::Core(CoreError::UnknownMode { .. } | CoreError::UnknownProfile { .. })
            | Self::Switch(SwitchError::UnknownMode { .. }) => exit_code::NOT_FOUND,
            _ => exit_code::GENERAL,
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::NoProfiles => CliError::NoConfig {
                path: vigil_config::config_path().display().to_string(),
            },
            ConfigError::UnknownProfile { profile } => CliError::ProfileNotFound {
                name: profile,
                available: String::new(),
            },
            ConfigError::Core(e) => CliError::Core(e),
            ConfigError::Serialization(e) => CliError::Toml(e),
            ConfigError::Figment(e) => CliError::Config(e),
            ConfigError::Io(e) => CliError::Io(e),
        }
    }
}
