//! CLI-aware configuration: merges `GlobalOpts` flags over the config file.

use clap::ArgMatches;
use clap::ValueEnum;
use clap::parser::ValueSource;
use vigil_config::{Config, ConfigError, Defaults, MockSection, Profile};
use vigil_core::{ControlPlaneConfig, profile::DEFAULT_PROFILE};

use crate::cli::{ColorMode, GlobalOpts, MockArgs, OutputFormat};
use crate::error::CliError;

/// Load the config file named by `--config`, or the platform default.
pub fn load(global: &GlobalOpts) -> Result<Config, CliError> {
    Ok(vigil_config::load_config(global.config.as_deref())?)
}

/// Fill `--output` and `--color` from `[defaults]` when neither the command
/// line nor the environment set them.
pub fn apply_display_defaults(
    global: &mut GlobalOpts,
    matches: &ArgMatches,
    defaults: &Defaults,
) -> Result<(), CliError> {
    let unset = |id: &str| matches.value_source(id) == Some(ValueSource::DefaultValue);

    if unset("output") {
        global.output = parse_setting::<OutputFormat>("defaults.output", &defaults.output)?;
    }
    if unset("color") {
        global.color = parse_setting::<ColorMode>("defaults.color", &defaults.color)?;
    }
    Ok(())
}

fn parse_setting<T: ValueEnum>(field: &str, value: &str) -> Result<T, CliError> {
    T::from_str(value, true).map_err(|reason| CliError::Validation {
        field: field.into(),
        reason,
    })
}

/// Apply `--endpoint`, `--api-key`, `--insecure` and mock flags to `cfg`.
///
/// With no configured profiles, `--endpoint` creates a `default` one.
pub fn apply_overrides(
    cfg: &mut Config,
    global: &GlobalOpts,
    mock: Option<&MockArgs>,
) -> Result<(), CliError> {
    if global.insecure {
        cfg.defaults.insecure = true;
    }

    if let Some(ref endpoint) = global.endpoint {
        let target = match global.profile {
            Some(ref name) => name.clone(),
            None if cfg.profiles.is_empty() => DEFAULT_PROFILE.to_owned(),
            None => cfg.active_profile_name(None)?,
        };
        cfg.profiles
            .entry(target)
            .and_modify(|p| p.endpoint.clone_from(endpoint))
            .or_insert_with(|| Profile::new(endpoint.clone()));
    }

    if let Some(ref key) = global.api_key {
        let name = active_profile_name(cfg, global)?;
        if let Some(profile) = cfg.profiles.get_mut(&name) {
            profile.api_key = Some(key.clone());
            profile.api_key_env = None;
        }
    }

    if let Some(mock) = mock.filter(|m| m.enabled()) {
        let section = cfg.mock.get_or_insert_with(MockSection::default);
        section.enabled = true;
        if mock.mock_offline {
            section.is_online = false;
        }
    }
    Ok(())
}

/// Resolve the active profile, listing alternatives when it is missing.
pub fn active_profile_name(cfg: &Config, global: &GlobalOpts) -> Result<String, CliError> {
    cfg.active_profile_name(global.profile.as_deref())
        .map_err(|err| match err {
            ConfigError::UnknownProfile { profile } => CliError::ProfileNotFound {
                name: profile,
                available: available_profiles(cfg),
            },
            other => other.into(),
        })
}

fn available_profiles(cfg: &Config) -> String {
    if cfg.profiles.is_empty() {
        return "(none)".into();
    }
    cfg.profiles.keys().cloned().collect::<Vec<_>>().join(", ")
}

/// Build a `ControlPlaneConfig` from the config file plus CLI overrides.
pub fn build_plane_config(
    global: &GlobalOpts,
    mock: Option<&MockArgs>,
) -> Result<ControlPlaneConfig, CliError> {
    let mut cfg = load(global)?;
    apply_overrides(&mut cfg, global, mock)?;
    let name = active_profile_name(&cfg, global)?;
    tracing::debug!(profile = %name, "resolved poll profile");
    Ok(cfg.to_control_plane_config(Some(&name))?)
}
