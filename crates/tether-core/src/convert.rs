// ── API-to-domain type conversions ──
//
// Bridges raw `tether_api` payloads into `tether_core::model` types.
// Unknown fields captured in `extra` are mined for the few values the
// domain keeps; the rest is dropped here.

use serde_json::Value;

use tether_api::{ChannelData, GuildData, UserData};

use crate::model::{Channel, ChannelKind, Guild, User};

impl From<UserData> for User {
    fn from(raw: UserData) -> Self {
        Self {
            id: raw.id,
            username: raw.username,
            discriminator: raw.discriminator,
            global_name: raw.global_name,
            avatar: raw.avatar,
            bot: raw.bot,
        }
    }
}

impl From<GuildData> for Guild {
    fn from(raw: GuildData) -> Self {
        let features = raw
            .extra
            .get("features")
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .filter_map(Value::as_str)
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            id: raw.id,
            name: raw.name,
            icon: raw.icon,
            owner_id: raw.owner_id,
            description: raw.description,
            member_count: raw.approximate_member_count,
            features,
        }
    }
}

impl From<ChannelData> for Channel {
    fn from(raw: ChannelData) -> Self {
        Self {
            id: raw.id,
            kind: ChannelKind::from(raw.kind),
            guild_id: raw.guild_id,
            name: raw.name,
            position: raw.position,
            parent_id: raw.parent_id,
            topic: raw.topic,
            nsfw: raw.nsfw,
        }
    }
}
