// ── Object cache ──
//
// Concurrent, unbounded map from (kind, id) to a built entity. Single-key
// atomicity comes from the `DashMap` entry API; there are no cross-key
// transactions and nothing is evicted.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tether_api::Snowflake;

use crate::model::{Channel, Entity, EntityKind, Guild, User};

type CacheKey = (EntityKind, Snowflake);

/// Process-local store of resolved entities.
#[derive(Debug, Default)]
pub struct ObjectCache {
    entries: DashMap<CacheKey, Entity>,
}

impl ObjectCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, kind: EntityKind, id: Snowflake) -> Option<Entity> {
        self.entries.get(&(kind, id)).map(|r| r.value().clone())
    }

    /// Insert or replace. Returns the previous entry, if any.
    pub fn put(&self, kind: EntityKind, id: Snowflake, entity: Entity) -> Option<Entity> {
        self.entries.insert((kind, id), entity)
    }

    /// Store `entity` unless the key is already taken, and return whatever
    /// the cache holds for the key afterwards.
    pub fn get_or_insert(&self, kind: EntityKind, id: Snowflake, entity: Entity) -> Entity {
        match self.entries.entry((kind, id)) {
            Entry::Occupied(existing) => existing.get().clone(),
            Entry::Vacant(slot) => slot.insert(entity).value().clone(),
        }
    }

    pub fn remove(&self, kind: EntityKind, id: Snowflake) -> Option<Entity> {
        self.entries.remove(&(kind, id)).map(|(_, v)| v)
    }

    pub fn contains(&self, kind: EntityKind, id: Snowflake) -> bool {
        self.entries.contains_key(&(kind, id))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    // ── Typed accessors ──────────────────────────────────────────────

    pub fn user(&self, id: Snowflake) -> Option<Arc<User>> {
        self.get(EntityKind::User, id)?.as_user().cloned()
    }

    pub fn guild(&self, id: Snowflake) -> Option<Arc<Guild>> {
        self.get(EntityKind::Guild, id)?.as_guild().cloned()
    }

    pub fn channel(&self, id: Snowflake) -> Option<Arc<Channel>> {
        self.get(EntityKind::Channel, id)?.as_channel().cloned()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn guild(id: u64, name: &str) -> Entity {
        Entity::from(Guild {
            id: Snowflake::new(id),
            name: name.into(),
            icon: None,
            owner_id: None,
            description: None,
            member_count: None,
            features: Vec::new(),
        })
    }

    #[test]
    fn keys_include_the_kind() {
        let cache = ObjectCache::new();
        let id = Snowflake::new(1);
        cache.put(EntityKind::Guild, id, guild(1, "g"));

        assert!(cache.contains(EntityKind::Guild, id));
        assert!(cache.get(EntityKind::User, id).is_none());
        assert!(cache.channel(id).is_none());
        assert_eq!(cache.guild(id).unwrap().name, "g");
    }

    #[test]
    fn get_or_insert_keeps_first_value() {
        let cache = ObjectCache::new();
        let id = Snowflake::new(2);

        let first = cache.get_or_insert(EntityKind::Guild, id, guild(2, "first"));
        let second = cache.get_or_insert(EntityKind::Guild, id, guild(2, "second"));

        assert!(first.ptr_eq(&second));
        assert_eq!(cache.guild(id).unwrap().name, "first");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn put_replaces_and_remove_clears() {
        let cache = ObjectCache::new();
        let id = Snowflake::new(3);

        assert!(cache.put(EntityKind::Guild, id, guild(3, "old")).is_none());
        let previous = cache.put(EntityKind::Guild, id, guild(3, "new")).unwrap();
        assert_eq!(previous.as_guild().unwrap().name, "old");

        assert!(cache.remove(EntityKind::Guild, id).is_some());
        assert!(cache.is_empty());

        cache.put(EntityKind::Guild, id, guild(3, "again"));
        cache.clear();
        assert!(cache.is_empty());
    }
}
