// ── Guild domain type ──

use serde::{Deserialize, Serialize};
use tether_api::Snowflake;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guild {
    pub id: Snowflake,
    pub name: String,
    pub icon: Option<String>,
    pub owner_id: Option<Snowflake>,
    pub description: Option<String>,
    /// Only present when fetched with counts.
    pub member_count: Option<u64>,
    /// Feature flags the guild has enabled (e.g. `COMMUNITY`).
    pub features: Vec<String>,
}
