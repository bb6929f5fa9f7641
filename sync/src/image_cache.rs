//! Side-map of project images, persisted apart from the entity records so a
//! project whose live copy arrives without images can get them back.

use std::collections::{BTreeMap, HashSet};

use pr_core::Entity;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageCache {
    entries: BTreeMap<String, Vec<Value>>
}

impl ImageCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Caches the images of `entity`, skipping projects without any.
    pub fn remember(&mut self, entity: &Entity) {
        let images = entity.images();
        if !images.is_empty() {
            self.entries
                .insert(entity.natural_key().to_string(), images.to_vec());
        }
    }

    pub fn get(&self, key: &str) -> Option<&[Value]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    /// Restores cached images onto a project that lost them. Returns whether
    /// anything was reattached.
    pub fn reattach(&self, entity: &mut Entity) -> bool {
        if !entity.images().is_empty() {
            return false;
        }
        match self.entries.get(entity.natural_key()) {
            Some(images) if !images.is_empty() => {
                debug!(key = entity.natural_key(), count = images.len(), "Reattaching cached images");
                entity.set_images(images.clone());
                true
            }
            _ => false
        }
    }

    /// Drops entries whose key is not in `live`. Returns how many went.
    pub fn evict_except(&mut self, live: &HashSet<String>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| live.contains(key));
        before - self.entries.len()
    }

    pub fn remove(&mut self, key: &str) -> Option<Vec<Value>> {
        self.entries.remove(key)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use testing::ProjectBuilder;

    #[test]
    fn test_reattach_restores_lost_images() {
        let mut cache = ImageCache::new();
        cache.remember(&ProjectBuilder::new("Foo").images(2).build());
        cache.remember(&ProjectBuilder::new("Bare").build());
        assert_eq!(cache.len(), 1);

        let mut partial = ProjectBuilder::new("Foo").build();
        assert!(cache.reattach(&mut partial));
        assert_eq!(partial.images().len(), 2);
        assert!(!cache.reattach(&mut partial));
    }

    #[test]
    fn test_reattach_never_overwrites_existing_images() {
        let mut cache = ImageCache::new();
        cache.remember(&ProjectBuilder::new("Foo").images(3).build());

        let mut project = ProjectBuilder::new("Foo").images(1).build();
        assert!(!cache.reattach(&mut project));
        assert_eq!(project.images().len(), 1);
    }

    #[test]
    fn test_evict_keeps_only_live_keys() {
        let mut cache = ImageCache::new();
        cache.remember(&ProjectBuilder::new("Foo").images(1).build());
        cache.remember(&ProjectBuilder::new("Gone").images(1).build());

        let live = HashSet::from(["Foo".to_string()]);
        assert_eq!(cache.evict_except(&live), 1);
        assert!(cache.get("Foo").is_some());
        assert!(cache.get("Gone").is_none());
    }

    #[test]
    fn test_serializes_as_plain_map() {
        let mut cache = ImageCache::new();
        cache.remember(&ProjectBuilder::new("Foo").images(1).build());
        let value = serde_json::to_value(&cache).unwrap();
        assert!(value["Foo"].is_array());
    }
}
