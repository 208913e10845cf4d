// ── User domain type ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tether_api::Snowflake;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Snowflake,
    pub username: String,
    /// Legacy four-digit tag. `None` for accounts on unique usernames.
    pub discriminator: Option<String>,
    /// Display name, if the user set one.
    pub global_name: Option<String>,
    pub avatar: Option<String>,
    pub bot: bool,
}

impl User {
    /// Display name if set, else the username.
    pub fn display_name(&self) -> &str {
        self.global_name.as_deref().unwrap_or(&self.username)
    }

    /// `name#1234` for legacy accounts, plain `name` otherwise.
    pub fn tag(&self) -> String {
        match self.discriminator.as_deref() {
            Some(d) if d != "0" => format!("{}#{d}", self.username),
            _ => self.username.clone(),
        }
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.id.created_at()
    }
}
