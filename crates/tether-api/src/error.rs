use thiserror::Error;

/// Top-level error type for the `tether-api` crate.
///
/// Covers every failure mode of the REST client and the gateway
/// connection. `tether-core` maps these into session-level errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// The token was rejected (HTTP 401 on login or any later request).
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// A request that needs a token was attempted before `login`.
    #[error("No token set -- call login first")]
    MissingToken,

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS setup error.
    #[error("TLS error: {0}")]
    Tls(String),

    /// The client was closed and can no longer issue requests.
    #[error("Client has been closed")]
    Closed,

    /// Requested API version is not served by the remote.
    #[error("Unsupported API version {0} (expected 9 or 10)")]
    UnsupportedApiVersion(u8),

    // ── REST responses ──────────────────────────────────────────────
    /// The resource does not exist (HTTP 404).
    #[error("Not found: {route}")]
    NotFound { route: String },

    /// Rate limited (HTTP 429). Surfaced only, never waited on.
    #[error("Rate limited on {route} -- retry after {retry_after_secs:.2}s")]
    RateLimited { route: String, retry_after_secs: f64 },

    /// Any other non-success response.
    #[error("HTTP {status} on {route}: {message}")]
    Http {
        status: u16,
        route: String,
        message: String,
    },

    /// The gateway endpoint could not be discovered.
    #[error("Gateway endpoint unavailable: {reason}")]
    EndpointUnavailable { reason: String },

    // ── Gateway ─────────────────────────────────────────────────────
    /// WebSocket connection failed or broke mid-stream.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// Send attempted on a connection that already closed.
    #[error("WebSocket closed (code {code}): {reason}")]
    WebSocketClosed { code: u16, reason: String },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if the token was rejected.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Authentication { .. } | Self::MissingToken)
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::RateLimited { .. } | Self::WebSocketConnect(_) => true,
            Self::Http { status, .. } => matches!(status, 500 | 502 | 503 | 504),
            _ => false,
        }
    }

    /// Returns `true` if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Transport(e) => e.status() == Some(reqwest::StatusCode::NOT_FOUND),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_errors() {
        let not_found = Error::NotFound {
            route: "/guilds/1".into(),
        };
        assert!(not_found.is_not_found());
        assert!(!not_found.is_transient());

        let limited = Error::RateLimited {
            route: "/users/2".into(),
            retry_after_secs: 1.5,
        };
        assert!(limited.is_transient());

        let bad_gateway = Error::Http {
            status: 502,
            route: "/gateway/bot".into(),
            message: "upstream".into(),
        };
        assert!(bad_gateway.is_transient());

        assert!(Error::MissingToken.is_auth_failure());
    }
}
