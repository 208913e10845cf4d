// Raw REST payloads
//
// Shapes returned by the remote API, deserialized as-is. Unknown fields are
// captured in `extra` so nothing is silently dropped; `tether-core`
// converts these into domain types.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::snowflake::Snowflake;

/// User object (`GET /users/{id}`, `GET /users/@me`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserData {
    pub id: Snowflake,
    pub username: String,
    #[serde(default)]
    pub discriminator: Option<String>,
    #[serde(default)]
    pub global_name: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub bot: bool,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Guild object (`GET /guilds/{id}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuildData {
    pub id: Snowflake,
    pub name: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub owner_id: Option<Snowflake>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub approximate_member_count: Option<u64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Channel object (`GET /channels/{id}`). Covers every channel family;
/// guild-only fields are optional.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelData {
    pub id: Snowflake,
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(default)]
    pub guild_id: Option<Snowflake>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub position: Option<i32>,
    #[serde(default)]
    pub parent_id: Option<Snowflake>,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub nsfw: bool,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Response of `GET /gateway/bot`.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayBotResponse {
    pub url: String,
    #[serde(default = "default_shards")]
    pub shards: u32,
}

fn default_shards() -> u32 {
    1
}

/// Where to open the real-time connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointRef {
    /// Fully-qualified gateway URL, including version and encoding query.
    pub url: Url,
    /// Recommended shard count.
    pub shards: u32,
}

/// Body of an error response (`{"code": N, "message": "..."}`).
#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub retry_after: Option<f64>,
}
