//! CLI configuration: thin wrapper around `pserv_config` shared types.
//!
//! Adds resolution that respects `GlobalOpts` flag overrides
//! (--url, --user, --insecure, --timeout).

use std::path::Path;

use pserv_core::SessionConfig;

use crate::cli::GlobalOpts;
use crate::error::CliError;

// ── Re-exports from shared crate ────────────────────────────────────

pub use pserv_config::{Config, Profile, config_path, save_config};

// ── CLI-specific helpers ────────────────────────────────────────────

/// Load the config file. A missing file is the default config; a
/// malformed one is an error.
pub fn load_config() -> Result<Config, CliError> {
    load_config_from(&config_path())
}

pub fn load_config_from(path: &Path) -> Result<Config, CliError> {
    Ok(pserv_config::load_config_from(path)?)
}

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Overlay global flags onto a profile. Flags win over profile values.
pub fn apply_overrides(profile: &Profile, global: &GlobalOpts) -> Profile {
    let mut merged = profile.clone();
    if let Some(ref url) = global.url {
        merged.url.clone_from(url);
    }
    if let Some(ref user) = global.user {
        merged.username.clone_from(user);
    }
    if global.insecure {
        merged.insecure = Some(true);
    }
    if global.timeout.is_some() {
        merged.timeout = global.timeout;
    }
    merged
}

/// Build the session settings from the config file, the active profile,
/// and flag overrides. Without a profile, `--url` and `--user` must be given.
pub fn resolve_session_config(global: &GlobalOpts) -> Result<SessionConfig, CliError> {
    let cfg = load_config()?;
    let profile_name = active_profile_name(global, &cfg);

    let profile = if let Some(profile) = cfg.profiles.get(&profile_name) {
        apply_overrides(profile, global)
    } else {
        profile_from_flags(global, cfg.defaults.timeout)?
    };

    Ok(pserv_config::profile_to_session_config(&profile, &profile_name)?)
}

fn profile_from_flags(global: &GlobalOpts, default_timeout: u64) -> Result<Profile, CliError> {
    let no_config = || CliError::NoConfig {
        path: config_path().display().to_string(),
    };
    let url = global.url.clone().ok_or_else(no_config)?;
    let username = global.user.clone().ok_or_else(no_config)?;

    Ok(Profile {
        url,
        username,
        password: None,
        password_env: None,
        ca_cert: None,
        insecure: Some(global.insecure),
        timeout: Some(global.timeout.unwrap_or(default_timeout)),
    })
}
