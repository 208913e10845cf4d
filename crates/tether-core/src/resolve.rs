// ── Object resolution ──
//
// Cache-then-fetch: a cache hit is returned as-is (never refreshed); a
// miss fetches from the origin, builds the domain entity, and stores it.
// When two resolves race on one key, both may fetch, but the first entity
// stored is the one every caller gets back.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use tether_api::{ChannelData, GuildData, Origin, Snowflake, UserData};

use crate::error::CoreError;
use crate::model::{Channel, Entity, EntityKind, Guild, User};
use crate::store::ObjectCache;

/// Resolves entities by id through an [`ObjectCache`] backed by an [`Origin`].
pub struct ObjectResolver<O> {
    origin: Arc<O>,
    cache: Arc<ObjectCache>,
}

impl<O> Clone for ObjectResolver<O> {
    fn clone(&self) -> Self {
        Self {
            origin: Arc::clone(&self.origin),
            cache: Arc::clone(&self.cache),
        }
    }
}

impl<O: Origin> ObjectResolver<O> {
    pub fn new(origin: Arc<O>, cache: Arc<ObjectCache>) -> Self {
        Self { origin, cache }
    }

    pub fn cache(&self) -> &Arc<ObjectCache> {
        &self.cache
    }

    /// Resolve an entity of a known kind.
    pub async fn resolve(&self, id: Snowflake, kind: EntityKind) -> Result<Entity, CoreError> {
        if let Some(hit) = self.cache.get(kind, id) {
            tracing::trace!(%kind, %id, "cache hit");
            return Ok(hit);
        }

        tracing::debug!(%kind, %id, "cache miss, fetching");
        let entity = self
            .fetch(id, kind)
            .await
            .map_err(|source| CoreError::Resolution { kind, id, source })?;

        Ok(self.cache.get_or_insert(kind, id, entity))
    }

    /// Resolve using a free-form type tag such as `"guild"` or `"TextChannel"`.
    ///
    /// Unrecognized tags fail before any cache or network access.
    pub async fn resolve_tag(&self, id: Snowflake, tag: &str) -> Result<Entity, CoreError> {
        let kind = EntityKind::from_tag(tag).ok_or_else(|| CoreError::InvalidType {
            tag: tag.to_owned(),
        })?;
        self.resolve(id, kind).await
    }

    pub async fn resolve_user(&self, id: Snowflake) -> Result<Arc<User>, CoreError> {
        match self.resolve(id, EntityKind::User).await? {
            Entity::User(user) => Ok(user),
            other => Err(kind_mismatch(EntityKind::User, &other)),
        }
    }

    pub async fn resolve_guild(&self, id: Snowflake) -> Result<Arc<Guild>, CoreError> {
        match self.resolve(id, EntityKind::Guild).await? {
            Entity::Guild(guild) => Ok(guild),
            other => Err(kind_mismatch(EntityKind::Guild, &other)),
        }
    }

    pub async fn resolve_channel(&self, id: Snowflake) -> Result<Arc<Channel>, CoreError> {
        match self.resolve(id, EntityKind::Channel).await? {
            Entity::Channel(channel) => Ok(channel),
            other => Err(kind_mismatch(EntityKind::Channel, &other)),
        }
    }

    /// Fetch and build, without touching the cache.
    async fn fetch(&self, id: Snowflake, kind: EntityKind) -> Result<Entity, tether_api::Error> {
        let entity = match kind {
            EntityKind::Channel => {
                let raw = self.origin.fetch_channel(id).await?;
                Entity::from(Channel::from(decode::<ChannelData>(&raw)?))
            }
            EntityKind::Guild => {
                let raw = self.origin.fetch_guild(id).await?;
                Entity::from(Guild::from(decode::<GuildData>(&raw)?))
            }
            EntityKind::User => {
                let raw = self.origin.fetch_user(id).await?;
                Entity::from(User::from(decode::<UserData>(&raw)?))
            }
        };
        Ok(entity)
    }
}

fn decode<T: DeserializeOwned>(raw: &serde_json::Value) -> Result<T, tether_api::Error> {
    T::deserialize(raw).map_err(|e| tether_api::Error::Deserialization {
        message: e.to_string(),
        body: raw.to_string(),
    })
}

fn kind_mismatch(expected: EntityKind, found: &Entity) -> CoreError {
    CoreError::Internal(format!(
        "cache holds a {} where a {expected} was expected",
        found.kind()
    ))
}
