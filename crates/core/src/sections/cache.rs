//! Short-lived in-memory cache of player aggregates.

use std::collections::HashMap;
use std::time::Duration;

use log::debug;
use tokio::sync::RwLock;
use tokio::time::Instant;

use super::model::PlayerSections;
use super::types::PlayerKey;
use crate::constants::DEFAULT_AGGREGATE_TTL_SECS;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(DEFAULT_AGGREGATE_TTL_SECS),
        }
    }
}

/// Cache entry for a player aggregate.
struct CachedAggregate {
    sections: PlayerSections,
    cached_at: Instant,
}

/// Aggregates keyed by player. Entries expire `ttl` after insertion and are
/// evicted lazily on `get`.
pub struct SectionsCache {
    entries: RwLock<HashMap<PlayerKey, CachedAggregate>>,
    ttl: Duration,
}

impl SectionsCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl: config.ttl,
        }
    }

    fn is_fresh(&self, entry: &CachedAggregate) -> bool {
        entry.cached_at.elapsed() < self.ttl
    }

    pub async fn get(&self, player_key: &PlayerKey) -> Option<PlayerSections> {
        {
            let entries = self.entries.read().await;
            match entries.get(player_key) {
                None => return None,
                Some(entry) if self.is_fresh(entry) => return Some(entry.sections.clone()),
                Some(_) => {}
            }
        }

        let mut entries = self.entries.write().await;
        // Another writer may have replaced the entry in between.
        if let Some(entry) = entries.get(player_key) {
            if self.is_fresh(entry) {
                return Some(entry.sections.clone());
            }
            debug!("Evicting expired aggregate for {}", player_key);
            entries.remove(player_key);
        }
        None
    }

    /// Stores `sections` under the player, merging into a fresh entry.
    ///
    /// Kinds absent from `sections` keep their cached value. A fresh entry
    /// keeps its original insertion time, so no section outlives the ttl; an
    /// expired or missing entry is replaced outright.
    pub async fn put(&self, player_key: &PlayerKey, sections: PlayerSections) {
        let mut entries = self.entries.write().await;
        let fresh = entries
            .get(player_key)
            .is_some_and(|entry| self.is_fresh(entry));
        if fresh {
            if let Some(entry) = entries.get_mut(player_key) {
                entry.sections.merge(sections);
            }
        } else {
            entries.insert(
                player_key.clone(),
                CachedAggregate {
                    sections,
                    cached_at: Instant::now(),
                },
            );
        }
    }

    pub async fn invalidate(&self, player_key: &PlayerKey) {
        self.entries.write().await.remove(player_key);
    }

    /// Number of stored entries, expired ones included.
    #[cfg(test)]
    async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

impl Default for SectionsCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sections::kinds::SectionKind;
    use crate::sections::model::Section;

    fn player() -> PlayerKey {
        PlayerKey::new("p1").unwrap()
    }

    fn aggregate() -> PlayerSections {
        let mut sections = PlayerSections::new(&[SectionKind::Roles]);
        sections.insert(SectionKind::Roles, Section::no_matches(None));
        sections
    }

    #[tokio::test(start_paused = true)]
    async fn entry_is_served_until_ttl() {
        let cache = SectionsCache::default();
        cache.put(&player(), aggregate()).await;

        tokio::time::advance(Duration::from_secs(299)).await;
        assert_eq!(cache.get(&player()).await, Some(aggregate()));
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entry_is_evicted_on_get() {
        let cache = SectionsCache::default();
        cache.put(&player(), aggregate()).await;

        tokio::time::advance(Duration::from_secs(5 * 60)).await;
        assert_eq!(cache.len().await, 1);
        assert!(cache.get(&player()).await.is_none());
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn merge_keeps_other_kinds_and_original_age() {
        let cache = SectionsCache::default();
        cache.put(&player(), aggregate()).await;

        tokio::time::advance(Duration::from_secs(200)).await;
        let mut narrative = PlayerSections::new(&[SectionKind::Narrative]);
        narrative.insert(SectionKind::Narrative, Section::failed("backend down"));
        cache.put(&player(), narrative).await;

        let merged = cache.get(&player()).await.unwrap();
        assert_eq!(merged.kinds(), vec![SectionKind::Roles, SectionKind::Narrative]);
        assert!(merged.get(SectionKind::Narrative).unwrap().is_failed());

        tokio::time::advance(Duration::from_secs(100)).await;
        assert!(cache.get(&player()).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entry_is_replaced_and_invalidate_removes() {
        let cache = SectionsCache::new(CacheConfig {
            ttl: Duration::from_secs(60),
        });
        cache.put(&player(), PlayerSections::new(&[SectionKind::Narrative])).await;
        tokio::time::advance(Duration::from_secs(60)).await;
        cache.put(&player(), aggregate()).await;
        assert_eq!(cache.get(&player()).await, Some(aggregate()));

        cache.invalidate(&player()).await;
        assert!(cache.get(&player()).await.is_none());
    }
}
