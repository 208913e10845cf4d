//! Command handlers and the settings they share.

pub mod config_cmd;
pub mod resolve;
pub mod run;

use secrecy::SecretString;
use tether_config::{ClientSettings, Config, Profile};

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// The active profile with CLI flag overrides applied.
pub struct ActiveProfile {
    pub name: String,
    pub profile: Profile,
    pub settings: ClientSettings,
}

/// Load config, pick the profile (`--profile` > `default_profile`) and
/// layer `--api-url` on top.
pub fn active_profile(global: &GlobalOpts) -> Result<ActiveProfile, CliError> {
    let config: Config = tether_config::load_config()?;
    let (name, mut profile) = config.profile(global.profile.as_deref())?;

    if let Some(ref url) = global.api_url {
        profile.api_url = Some(url.clone());
    }

    let settings = tether_config::profile_to_settings(&profile, &name, &config.defaults)?;
    tracing::debug!(profile = %name, api = %settings.api_base, "profile resolved");
    Ok(ActiveProfile {
        name,
        profile,
        settings,
    })
}

/// `--token` / `TETHER_TOKEN`, then the profile's token chain.
pub fn resolve_token(global: &GlobalOpts, active: &ActiveProfile) -> Result<SecretString, CliError> {
    if let Some(ref token) = global.token {
        return Ok(SecretString::from(token.clone()));
    }
    Ok(tether_config::resolve_token(&active.profile, &active.name)?)
}
