// ── Session tuning ──
//
// How a session reacts to failures and how long it waits on the way out.
// Never touches disk; tether-config builds these from profiles.

use std::time::Duration;

/// Exponential backoff for reopening a dead connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Delay before the first reopen attempt. Default: 1s.
    pub initial_delay: Duration,
    /// Upper bound on backoff delay. Default: 30s.
    pub max_delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

/// Runtime configuration for a [`SessionController`](crate::SessionController).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Consecutive `run_once` failures tolerated before the session
    /// terminates. `None` keeps going forever.
    pub max_consecutive_errors: Option<u32>,
    /// Bound on each shutdown wait (run loop exit, pending handlers).
    pub shutdown_grace: Duration,
    pub reconnect: ReconnectConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_consecutive_errors: None,
            shutdown_grace: Duration::from_secs(5),
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// Exponential backoff with jitter.
///
/// `delay = min(initial * 2^attempt, max) * (1 +- 0.25)`
///
/// The jitter is derived from the attempt number, so it is reproducible.
pub fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let exponent = i32::try_from(attempt.min(30)).unwrap_or(30);
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
    let capped = base.min(config.max_delay.as_secs_f64());

    let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
    Duration::from_secs_f64((capped * jitter_factor).max(0.0))
}
