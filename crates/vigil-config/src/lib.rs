//! Shared configuration for the vigil control plane.
//!
//! TOML poll profiles, per-mode policy overrides, mock settings, API key
//! resolution (env + plaintext), and translation to
//! `vigil_core::ControlPlaneConfig`.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use indexmap::IndexMap;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use vigil_api::{TlsMode, TransportConfig};
use vigil_core::{
    ControlPlaneConfig, CoreError, MockConfig, Mode, ModePolicy, ModePolicyTable, MonitorConfig,
    OfflinePolicy, PollProfile, profile,
};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no poll profiles configured")]
    NoProfiles,

    #[error("profile '{profile}' not found in config")]
    UnknownProfile { profile: String },

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Profile selected when none is given on the command line.
    pub default_profile: Option<String>,

    /// Mode the controller starts in and falls back to (kebab-case name).
    pub default_mode: Option<String>,

    /// Defer the first probe after startup.
    pub start_delay_ms: Option<u64>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Named poll profiles, in file order.
    #[serde(default)]
    pub profiles: IndexMap<String, Profile>,

    /// Per-mode policy overrides keyed by mode name.
    #[serde(default)]
    pub modes: BTreeMap<String, ModeSection>,

    /// Simulated backend for demos.
    pub mock: Option<MockSection>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some(profile::DEFAULT_PROFILE.into()),
            default_mode: None,
            start_delay_ms: None,
            defaults: Defaults::default(),
            profiles: IndexMap::new(),
            modes: BTreeMap::new(),
            mock: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    #[serde(default)]
    pub insecure: bool,

    /// Transport-level request ceiling, in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    #[serde(default = "default_probe_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            insecure: false,
            timeout: default_timeout(),
            interval_ms: default_interval_ms(),
            timeout_ms: default_probe_timeout_ms(),
            failure_threshold: default_failure_threshold(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_timeout() -> u64 {
    30
}
fn default_interval_ms() -> u64 {
    millis(profile::DEFAULT_INTERVAL)
}
fn default_probe_timeout_ms() -> u64 {
    millis(profile::DEFAULT_TIMEOUT)
}
fn default_failure_threshold() -> u32 {
    profile::DEFAULT_FAILURE_THRESHOLD
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// A named poll profile.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Profile {
    /// Health endpoint URL (e.g., "http://10.0.0.5:8080/api/health").
    pub endpoint: String,

    pub interval_ms: Option<u64>,

    /// Per-probe timeout.
    pub timeout_ms: Option<u64>,

    pub failure_threshold: Option<u32>,

    /// API key in plaintext. Prefer `api_key_env`.
    pub api_key: Option<String>,

    /// Environment variable name containing the API key.
    pub api_key_env: Option<String>,

    /// Path to custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    /// Override insecure TLS setting.
    pub insecure: Option<bool>,
}

impl Profile {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            interval_ms: None,
            timeout_ms: None,
            failure_threshold: None,
            api_key: None,
            api_key_env: None,
            ca_cert: None,
            insecure: None,
        }
    }
}

/// Override of a mode's built-in connectivity policy.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ModeSection {
    pub requires_connectivity: Option<bool>,
    pub offline_policy: Option<OfflinePolicy>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MockSection {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_true")]
    pub is_online: bool,

    #[serde(default = "default_response_delay_ms")]
    pub response_delay_ms: u64,

    #[serde(default)]
    pub failure_probability: f64,
}

impl Default for MockSection {
    fn default() -> Self {
        Self {
            enabled: false,
            is_online: true,
            response_delay_ms: default_response_delay_ms(),
            failure_probability: 0.0,
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_response_delay_ms() -> u64 {
    100
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("io", "vigil", "vigil").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("vigil");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from defaults, the TOML file, and `VIGIL_*` env.
///
/// `path` overrides the platform config location. Nested keys use a double
/// underscore: `VIGIL_PROFILES__LAB__ENDPOINT`.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.map_or_else(config_path, Path::to_path_buf);

    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(&path))
        .merge(Env::prefixed("VIGIL_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if loading fails.
pub fn load_config_or_default(path: Option<&Path>) -> Config {
    load_config(path).unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write it to `path` or the canonical path.
pub fn save_config(cfg: &Config, path: Option<&Path>) -> Result<(), ConfigError> {
    let path = path.map_or_else(config_path, Path::to_path_buf);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(&path, toml_str)?;
    Ok(())
}

// ── API key resolution ──────────────────────────────────────────────

/// Resolve a profile's API key: named env var first, then plaintext.
pub fn resolve_api_key(profile: &Profile) -> Option<SecretString> {
    if let Some(ref env_name) = profile.api_key_env {
        if let Ok(val) = std::env::var(env_name) {
            return Some(SecretString::from(val));
        }
    }
    profile
        .api_key
        .as_ref()
        .map(|key| SecretString::from(key.clone()))
}

// ── Translation ─────────────────────────────────────────────────────

impl Config {
    /// Name of the profile to use: explicit choice, then `default_profile`,
    /// then the first declared profile.
    pub fn active_profile_name(&self, requested: Option<&str>) -> Result<String, ConfigError> {
        if let Some(name) = requested {
            return if self.profiles.contains_key(name) {
                Ok(name.to_owned())
            } else {
                Err(ConfigError::UnknownProfile {
                    profile: name.into(),
                })
            };
        }
        if let Some(ref name) = self.default_profile {
            if self.profiles.contains_key(name) {
                return Ok(name.clone());
            }
        }
        self.profiles
            .keys()
            .next()
            .cloned()
            .ok_or(ConfigError::NoProfiles)
    }

    /// Build one validated core poll profile.
    pub fn poll_profile(&self, name: &str) -> Result<PollProfile, ConfigError> {
        let profile = self
            .profiles
            .get(name)
            .ok_or_else(|| ConfigError::UnknownProfile {
                profile: name.into(),
            })?;

        let endpoint: url::Url =
            profile
                .endpoint
                .parse()
                .map_err(|_| ConfigError::Validation {
                    field: format!("profiles.{name}.endpoint"),
                    reason: format!("invalid URL: {}", profile.endpoint),
                })?;

        let poll = PollProfile::new(name, endpoint)
            .with_interval(Duration::from_millis(
                profile.interval_ms.unwrap_or(self.defaults.interval_ms),
            ))
            .with_timeout(Duration::from_millis(
                profile.timeout_ms.unwrap_or(self.defaults.timeout_ms),
            ))
            .with_failure_threshold(
                profile
                    .failure_threshold
                    .unwrap_or(self.defaults.failure_threshold),
            );
        poll.validate()?;
        Ok(poll)
    }

    /// Transport settings taken from the given profile.
    pub fn transport(&self, name: &str) -> Result<TransportConfig, ConfigError> {
        let profile = self
            .profiles
            .get(name)
            .ok_or_else(|| ConfigError::UnknownProfile {
                profile: name.into(),
            })?;

        let tls = if profile.insecure.unwrap_or(self.defaults.insecure) {
            TlsMode::DangerAcceptInvalid
        } else if let Some(ref ca_path) = profile.ca_cert {
            TlsMode::CustomCa(ca_path.clone())
        } else {
            TlsMode::System
        };

        Ok(TransportConfig {
            tls,
            timeout: Duration::from_secs(self.defaults.timeout),
            api_key: resolve_api_key(profile),
        })
    }

    /// Mode policy table with `[modes.*]` overrides applied.
    pub fn policy_table(&self) -> Result<ModePolicyTable, ConfigError> {
        let default_mode = self
            .default_mode
            .as_deref()
            .map(Mode::parse)
            .transpose()?
            .unwrap_or_else(|| ModePolicyTable::default().default_mode());

        let overrides = self
            .modes
            .iter()
            .map(|(name, section)| {
                let mode = Mode::parse(name)?;
                let builtin = ModePolicy::builtin(mode);
                Ok((
                    mode,
                    ModePolicy::new(
                        section
                            .requires_connectivity
                            .unwrap_or(builtin.requires_connectivity),
                        section.offline_policy.unwrap_or(builtin.offline_policy),
                    ),
                ))
            })
            .collect::<Result<Vec<_>, CoreError>>()?;

        Ok(ModePolicyTable::new(default_mode, overrides)?)
    }

    /// Mock settings, when enabled.
    pub fn mock_config(&self) -> Result<Option<MockConfig>, ConfigError> {
        let Some(ref mock) = self.mock else {
            return Ok(None);
        };
        if !mock.enabled {
            return Ok(None);
        }
        if !(0.0..=1.0).contains(&mock.failure_probability) {
            return Err(ConfigError::Validation {
                field: "mock.failure_probability".into(),
                reason: format!("expected 0.0..=1.0, got {}", mock.failure_probability),
            });
        }
        Ok(Some(MockConfig {
            is_online: mock.is_online,
            response_delay: Duration::from_millis(mock.response_delay_ms),
            failure_probability: mock.failure_probability,
        }))
    }

    /// Build a `ControlPlaneConfig`, selecting `profile` or the default.
    pub fn to_control_plane_config(
        &self,
        profile: Option<&str>,
    ) -> Result<ControlPlaneConfig, ConfigError> {
        let active = self.active_profile_name(profile)?;
        let profiles = self
            .profiles
            .keys()
            .map(|name| self.poll_profile(name))
            .collect::<Result<Vec<_>, _>>()?;

        let profile_transports = self
            .profiles
            .keys()
            .map(|name| Ok((name.clone(), self.transport(name)?)))
            .collect::<Result<HashMap<_, _>, ConfigError>>()?;

        let monitor = MonitorConfig {
            profiles,
            transport: self.transport(&active)?,
            profile_transports,
            active_profile: active,
            mock: self.mock_config()?,
        };
        monitor.validate()?;

        Ok(ControlPlaneConfig {
            monitor,
            policies: self.policy_table()?,
            start_delay: self.start_delay_ms.map(Duration::from_millis),
        })
    }
}
