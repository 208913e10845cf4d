// REST client
//
// Wraps `reqwest::Client` with versioned URL construction, bot-token
// authorization and status mapping. Rate limits are surfaced as
// `Error::RateLimited` and never waited on.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tracing::{debug, trace};
use url::Url;

use crate::error::Error;
use crate::models::{
    ApiErrorBody, ChannelData, EndpointRef, GatewayBotResponse, GuildData, UserData,
};
use crate::origin::Origin;
use crate::snowflake::Snowflake;
use crate::transport::TransportConfig;

/// Default API root (the version segment is appended per request).
pub const DEFAULT_API_BASE: &str = "https://discord.com/api";

/// API version used when none is configured.
pub const DEFAULT_API_VERSION: u8 = 10;

pub const SUPPORTED_API_VERSIONS: [u8; 2] = [9, 10];

/// HTTP client for the request/response side of the service.
///
/// The token is set by [`login`](Self::login) and sent as
/// `Authorization: Bot <token>` on every request afterwards.
pub struct RestClient {
    http: reqwest::Client,
    base_url: Url,
    api_version: u8,
    token: RwLock<Option<SecretString>>,
    closed: AtomicBool,
}

impl RestClient {
    /// Create a client from a `TransportConfig`.
    pub fn new(base_url: Url, api_version: u8, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Self::with_client(http, base_url, api_version)
    }

    /// Create a client around a pre-built `reqwest::Client`.
    pub fn with_client(
        http: reqwest::Client,
        base_url: Url,
        api_version: u8,
    ) -> Result<Self, Error> {
        if !SUPPORTED_API_VERSIONS.contains(&api_version) {
            return Err(Error::UnsupportedApiVersion(api_version));
        }
        Ok(Self {
            http,
            base_url,
            api_version,
            token: RwLock::new(None),
            closed: AtomicBool::new(false),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn api_version(&self) -> u8 {
        self.api_version
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    // ── Authentication ───────────────────────────────────────────────

    /// Install `token` and validate it against `/users/@me`.
    ///
    /// On any failure the previously installed token (if any) is put back.
    pub async fn login(&self, token: SecretString) -> Result<UserData, Error> {
        let previous = self.swap_token(Some(token));

        match self.get_current_user().await {
            Ok(me) => {
                debug!(user_id = %me.id, username = %me.username, "token accepted");
                Ok(me)
            }
            Err(e) => {
                self.swap_token(previous);
                Err(match e {
                    Error::Authentication { .. } => Error::Authentication {
                        message: "improper token has been passed".into(),
                    },
                    other => other,
                })
            }
        }
    }

    /// Mark the client closed and forget the token.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!("REST client closed");
        }
        self.swap_token(None);
    }

    fn swap_token(&self, token: Option<SecretString>) -> Option<SecretString> {
        let mut guard = self.token.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, token)
    }

    fn auth_header(&self) -> Result<String, Error> {
        let guard = self.token.read().unwrap_or_else(PoisonError::into_inner);
        guard
            .as_ref()
            .map(|t| format!("Bot {}", t.expose_secret()))
            .ok_or(Error::MissingToken)
    }

    // ── Endpoints ────────────────────────────────────────────────────

    pub async fn get_current_user(&self) -> Result<UserData, Error> {
        self.get("users/@me", &[]).await
    }

    pub async fn get_user(&self, id: Snowflake) -> Result<UserData, Error> {
        self.get(&format!("users/{id}"), &[]).await
    }

    pub async fn get_guild(&self, id: Snowflake, with_counts: bool) -> Result<GuildData, Error> {
        let counts = if with_counts { "true" } else { "false" };
        self.get(&format!("guilds/{id}"), &[("with_counts", counts)])
            .await
    }

    pub async fn get_channel(&self, id: Snowflake) -> Result<ChannelData, Error> {
        self.get(&format!("channels/{id}"), &[]).await
    }

    /// Discover the gateway URL and recommended shard count.
    pub async fn get_gateway_bot(&self) -> Result<EndpointRef, Error> {
        let resp: GatewayBotResponse = self.get("gateway/bot", &[]).await?;
        if resp.url.is_empty() {
            return Err(Error::EndpointUnavailable {
                reason: "empty gateway url".into(),
            });
        }
        let url = Url::parse(&format!(
            "{}?v={}&encoding=json",
            resp.url.trim_end_matches('/'),
            self.api_version
        ))?;
        Ok(EndpointRef {
            url,
            shards: resp.shards,
        })
    }

    // ── Request helpers ──────────────────────────────────────────────

    /// Build `{base}/v{version}/{path}`.
    pub(crate) fn api_url(&self, path: &str) -> Result<Url, Error> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        Ok(Url::parse(&format!("{base}/v{}/{path}", self.api_version))?)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T, Error> {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        let url = self.api_url(path)?;
        debug!("GET {}", url);

        let resp = self
            .http
            .get(url)
            .query(query)
            .header(reqwest::header::AUTHORIZATION, self.auth_header()?)
            .send()
            .await
            .map_err(Error::Transport)?;

        parse_response(path, resp).await
    }
}

/// Map a response onto `T` or the matching error variant.
async fn parse_response<T: DeserializeOwned>(
    route: &str,
    resp: reqwest::Response,
) -> Result<T, Error> {
    let status = resp.status();
    let retry_header = resp
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<f64>().ok());
    let body = resp.text().await.map_err(Error::Transport)?;
    trace!(route, status = status.as_u16(), "response received");

    if status.is_success() {
        return serde_json::from_str(&body).map_err(|e| {
            let preview = &body[..body.len().min(200)];
            Error::Deserialization {
                message: format!("{e} (body preview: {preview:?})"),
                body: body.clone(),
            }
        });
    }

    let api_error = serde_json::from_str::<ApiErrorBody>(&body).ok();
    let message = api_error
        .as_ref()
        .and_then(|b| b.message.clone())
        .unwrap_or_else(|| body.chars().take(200).collect());

    Err(match status {
        reqwest::StatusCode::UNAUTHORIZED => Error::Authentication { message },
        reqwest::StatusCode::NOT_FOUND => Error::NotFound {
            route: route.to_owned(),
        },
        reqwest::StatusCode::TOO_MANY_REQUESTS => Error::RateLimited {
            route: route.to_owned(),
            retry_after_secs: api_error
                .and_then(|b| b.retry_after)
                .or(retry_header)
                .unwrap_or(0.0),
        },
        _ => Error::Http {
            status: status.as_u16(),
            route: route.to_owned(),
            message,
        },
    })
}

impl Origin for RestClient {
    async fn authenticate(&self, token: &SecretString) -> Result<UserData, Error> {
        self.login(SecretString::from(token.expose_secret().to_owned()))
            .await
    }

    async fn resolve_endpoint(&self) -> Result<EndpointRef, Error> {
        self.get_gateway_bot().await
    }

    async fn fetch_channel(&self, id: Snowflake) -> Result<serde_json::Value, Error> {
        self.get(&format!("channels/{id}"), &[]).await
    }

    async fn fetch_guild(&self, id: Snowflake) -> Result<serde_json::Value, Error> {
        self.get(&format!("guilds/{id}"), &[]).await
    }

    async fn fetch_user(&self, id: Snowflake) -> Result<serde_json::Value, Error> {
        self.get(&format!("users/{id}"), &[]).await
    }

    async fn close(&self) {
        RestClient::close(self);
    }
}
