//! Shared configuration for tether clients.
//!
//! TOML profiles, token resolution (env + keyring + plaintext), and
//! translation into the transport and session settings the lower crates
//! take. The CLI layers its own flag overrides on top.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use tether_api::{
    DEFAULT_API_BASE, DEFAULT_API_VERSION, GatewayConfig, TlsMode, TransportConfig,
};
use tether_core::{ReconnectConfig, SessionConfig};

/// Keyring service name; entries are keyed `"{profile}/token"`.
pub const KEYRING_SERVICE: &str = "tether";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{name}' not found")]
    UnknownProfile { name: String },

    #[error("no token configured for profile '{profile}'")]
    NoCredentials { profile: String },

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
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when none is named on the command line.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Named bot profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

impl Config {
    /// Pick a profile: the explicit name, else `default_profile`.
    ///
    /// An unconfigured `"default"` profile resolves to an empty one, so a
    /// token from the environment is enough to run without a config file.
    pub fn profile(&self, name: Option<&str>) -> Result<(String, Profile), ConfigError> {
        let name = name
            .or(self.default_profile.as_deref())
            .unwrap_or("default");
        match self.profiles.get(name) {
            Some(profile) => Ok((name.to_owned(), profile.clone())),
            None if name == "default" => Ok((name.to_owned(), Profile::default())),
            None => Err(ConfigError::UnknownProfile { name: name.into() }),
        }
    }
}

/// Global defaults, overridden per profile.
#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    /// REST request timeout, seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// How long shutdown waits for pending handlers, seconds.
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace: u64,

    /// Gateway intents used when a profile sets none.
    #[serde(default)]
    pub intents: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            shutdown_grace: default_shutdown_grace(),
            intents: 0,
        }
    }
}

fn default_timeout() -> u64 {
    30
}
fn default_shutdown_grace() -> u64 {
    5
}

/// A named bot profile.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Profile {
    /// REST base URL (default: the public API).
    pub api_url: Option<String>,

    /// REST API version, 9 or 10.
    pub api_version: Option<u8>,

    /// Bot token (plaintext; prefer keyring or env var).
    pub token: Option<String>,

    /// Environment variable name containing the token.
    pub token_env: Option<String>,

    /// Gateway intents bitfield.
    pub intents: Option<u64>,

    /// Path to a custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    /// Override the REST timeout, seconds.
    pub timeout: Option<u64>,

    /// Stop after this many loop errors in a row (unset: never).
    pub max_consecutive_errors: Option<u32>,

    /// Override the shutdown grace, seconds.
    pub shutdown_grace: Option<u64>,

    /// First reconnect backoff step, milliseconds.
    pub reconnect_initial_ms: Option<u64>,

    /// Reconnect backoff ceiling, milliseconds.
    pub reconnect_max_ms: Option<u64>,

    /// Unacknowledged-heartbeat limit, seconds.
    pub heartbeat_timeout: Option<u64>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "tether", "tether").map_or_else(
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
    p.push("tether");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the default file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path`, layered over defaults and under `TETHER_*` env vars
/// (`TETHER_DEFAULTS__TIMEOUT=10` sets `defaults.timeout`).
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("TETHER_").split("__"));

    let config: Config = figment.extract()?;
    tracing::debug!(path = %path.display(), profiles = config.profiles.len(), "config loaded");
    Ok(config)
}

/// Load config, returning a default if loading fails.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Token resolution ────────────────────────────────────────────────

/// Resolve the bot token from the profile's chain: `token_env`, then the
/// system keyring, then plaintext `token`.
pub fn resolve_token(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    // 1. Profile's token_env → env var lookup
    if let Some(value) = profile
        .token_env
        .as_deref()
        .and_then(|name| std::env::var(name).ok())
    {
        return Ok(SecretString::from(value));
    }

    // 2. System keyring
    if let Some(secret) = keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/token"))
        .ok()
        .and_then(|entry| entry.get_password().ok())
    {
        tracing::debug!(profile = profile_name, "token read from keyring");
        return Ok(SecretString::from(secret));
    }

    // 3. Plaintext in config
    if let Some(ref token) = profile.token {
        return Ok(SecretString::from(token.clone()));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

// ── Client settings ─────────────────────────────────────────────────

/// Everything needed to build a REST client, a gateway connector and a
/// session, minus the token.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub profile: String,
    pub api_base: Url,
    pub api_version: u8,
    pub transport: TransportConfig,
    pub gateway: GatewayConfig,
    pub session: SessionConfig,
}

/// Build [`ClientSettings`] from a profile layered over `defaults`.
pub fn profile_to_settings(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<ClientSettings, ConfigError> {
    let raw_url = profile.api_url.as_deref().unwrap_or(DEFAULT_API_BASE);
    let api_base: Url = raw_url.parse().map_err(|_| ConfigError::Validation {
        field: "api_url".into(),
        reason: format!("invalid URL: {raw_url}"),
    })?;

    let api_version = profile.api_version.unwrap_or(DEFAULT_API_VERSION);
    if !tether_api::rest::SUPPORTED_API_VERSIONS.contains(&api_version) {
        return Err(ConfigError::Validation {
            field: "api_version".into(),
            reason: format!("unsupported version {api_version}"),
        });
    }

    let tls = profile
        .ca_cert
        .clone()
        .map_or(TlsMode::System, TlsMode::CustomCa);

    let transport = TransportConfig {
        tls,
        timeout: Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout)),
        ..TransportConfig::default()
    };

    let mut gateway = GatewayConfig {
        intents: profile.intents.unwrap_or(defaults.intents),
        user_agent: transport.user_agent.clone(),
        ..GatewayConfig::default()
    };
    if let Some(secs) = profile.heartbeat_timeout {
        gateway.heartbeat_timeout = Duration::from_secs(secs);
    }

    let mut reconnect = ReconnectConfig::default();
    if let Some(ms) = profile.reconnect_initial_ms {
        reconnect.initial_delay = Duration::from_millis(ms);
    }
    if let Some(ms) = profile.reconnect_max_ms {
        reconnect.max_delay = Duration::from_millis(ms);
    }
    if reconnect.initial_delay > reconnect.max_delay {
        return Err(ConfigError::Validation {
            field: "reconnect_initial_ms".into(),
            reason: "must not exceed reconnect_max_ms".into(),
        });
    }

    let session = SessionConfig {
        max_consecutive_errors: profile.max_consecutive_errors,
        shutdown_grace: Duration::from_secs(
            profile.shutdown_grace.unwrap_or(defaults.shutdown_grace),
        ),
        reconnect,
    };

    Ok(ClientSettings {
        profile: profile_name.into(),
        api_base,
        api_version,
        transport,
        gateway,
        session,
    })
}
