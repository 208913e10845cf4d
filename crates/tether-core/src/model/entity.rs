// ── Cached entity envelope ──

use std::sync::Arc;

use strum::{Display, EnumIter};

use super::{Channel, Guild, User};

/// Closed set of entity types the resolver knows how to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum EntityKind {
    User,
    Guild,
    Channel,
}

impl EntityKind {
    /// Interpret a free-form type tag, case-insensitively.
    ///
    /// Any tag mentioning "channel" is a channel (`"TextChannel"`,
    /// `"dm_channel"`, `"GuildChannel"`, ...). Guilds and users need the
    /// exact name, so `"GuildMember"` or `"UserSettings"` are rejected.
    pub fn from_tag(tag: &str) -> Option<Self> {
        let tag = tag.to_lowercase();
        if tag.contains("channel") {
            Some(Self::Channel)
        } else if tag == "guild" {
            Some(Self::Guild)
        } else if tag == "user" {
            Some(Self::User)
        } else {
            None
        }
    }
}

/// A fully built domain entity, shared by reference.
#[derive(Debug, Clone)]
pub enum Entity {
    User(Arc<User>),
    Guild(Arc<Guild>),
    Channel(Arc<Channel>),
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::User(_) => EntityKind::User,
            Self::Guild(_) => EntityKind::Guild,
            Self::Channel(_) => EntityKind::Channel,
        }
    }

    pub fn as_user(&self) -> Option<&Arc<User>> {
        match self {
            Self::User(u) => Some(u),
            _ => None,
        }
    }

    pub fn as_guild(&self) -> Option<&Arc<Guild>> {
        match self {
            Self::Guild(g) => Some(g),
            _ => None,
        }
    }

    pub fn as_channel(&self) -> Option<&Arc<Channel>> {
        match self {
            Self::Channel(c) => Some(c),
            _ => None,
        }
    }

    /// Same underlying allocation, not just equal contents.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::User(a), Self::User(b)) => Arc::ptr_eq(a, b),
            (Self::Guild(a), Self::Guild(b)) => Arc::ptr_eq(a, b),
            (Self::Channel(a), Self::Channel(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<User> for Entity {
    fn from(user: User) -> Self {
        Self::User(Arc::new(user))
    }
}

impl From<Guild> for Entity {
    fn from(guild: Guild) -> Self {
        Self::Guild(Arc::new(guild))
    }
}

impl From<Channel> for Entity {
    fn from(channel: Channel) -> Self {
        Self::Channel(Arc::new(channel))
    }
}
