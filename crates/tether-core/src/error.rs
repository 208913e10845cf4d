// ── Core error types ──
//
// Errors surfaced to applications by tether-core. Transport failures are
// translated by the `From<tether_api::Error>` impl; resolution failures
// keep the transport error as their source.

use thiserror::Error;

use tether_api::Snowflake;

use crate::model::EntityKind;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Session errors ───────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    #[error("Not logged in -- call login before run")]
    NotAuthenticated,

    #[error("Session is already running")]
    AlreadyRunning,

    #[error("Connection failed: {reason}")]
    ConnectionFailed { reason: String },

    #[error("Request timed out")]
    Timeout,

    // ── Registration errors ──────────────────────────────────────────
    #[error("Handler has no name and none was given at registration")]
    UnnamedHandler,

    // ── Resolution errors ────────────────────────────────────────────
    #[error("Invalid entity type: {tag:?}")]
    InvalidType { tag: String },

    #[error("Failed to resolve {kind} {id}: {source}")]
    Resolution {
        kind: EntityKind,
        id: Snowflake,
        #[source]
        source: tether_api::Error,
    },

    #[error("Entity not found: {entity_type} with id {identifier}")]
    NotFound {
        entity_type: String,
        identifier: String,
    },

    // ── API errors (wrapped, not exposed raw) ────────────────────────
    #[error("API error: {message}")]
    Api {
        message: String,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Returns `true` if the token was rejected or never supplied.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Authentication { .. } | Self::NotAuthenticated)
    }

    /// Returns `true` if the entity does not exist remotely.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Resolution { source, .. } => source.is_not_found(),
            _ => false,
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<tether_api::Error> for CoreError {
    fn from(err: tether_api::Error) -> Self {
        use tether_api::Error as ApiError;

        match err {
            ApiError::Authentication { message } => CoreError::Authentication { message },
            ApiError::MissingToken => CoreError::NotAuthenticated,
            ApiError::Transport(ref e) => {
                if e.is_timeout() {
                    CoreError::Timeout
                } else if e.is_connect() {
                    CoreError::ConnectionFailed {
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::Api {
                        message: e.to_string(),
                        status: e.status().map(|s| s.as_u16()),
                    }
                }
            }
            ApiError::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            ApiError::UnsupportedApiVersion(v) => CoreError::Config {
                message: format!("Unsupported API version {v}"),
            },
            ApiError::Tls(msg) => CoreError::ConnectionFailed {
                reason: format!("TLS error: {msg}"),
            },
            ApiError::Closed => CoreError::ConnectionFailed {
                reason: "client has been closed".into(),
            },
            ApiError::NotFound { route } => CoreError::NotFound {
                entity_type: "resource".into(),
                identifier: route,
            },
            ApiError::RateLimited {
                route,
                retry_after_secs,
            } => CoreError::Api {
                message: format!("Rate limited on {route} -- retry after {retry_after_secs:.2}s"),
                status: Some(429),
            },
            ApiError::Http {
                status,
                route,
                message,
            } => CoreError::Api {
                message: format!("{route}: {message}"),
                status: Some(status),
            },
            ApiError::EndpointUnavailable { reason } => CoreError::ConnectionFailed {
                reason: format!("gateway endpoint unavailable: {reason}"),
            },
            ApiError::WebSocketConnect(reason) => CoreError::ConnectionFailed {
                reason: format!("WebSocket connection failed: {reason}"),
            },
            ApiError::WebSocketClosed { code, reason } => CoreError::ConnectionFailed {
                reason: format!("WebSocket closed (code {code}): {reason}"),
            },
            ApiError::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translates_auth_failure() {
        let err = CoreError::from(tether_api::Error::Authentication {
            message: "bad token".into(),
        });
        assert!(err.is_auth_failure());
        assert_eq!(err.to_string(), "Authentication failed: bad token");
    }

    #[test]
    fn resolution_keeps_source() {
        let err = CoreError::Resolution {
            kind: EntityKind::Guild,
            id: Snowflake::new(9),
            source: tether_api::Error::NotFound {
                route: "guilds/9".into(),
            },
        };
        assert!(err.is_not_found());
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.to_string().starts_with("Failed to resolve guild 9"));
    }
}
