//! Player analytics facade: cache first, then poll.

use log::debug;

use super::cache::SectionsCache;
use super::kinds::SectionKind;
use super::model::PlayerSections;
use super::poller::{AggregatePoller, CancelFlag, PartialCallback};
use super::types::PlayerKey;

pub struct PlayerAnalyticsService {
    poller: AggregatePoller,
    cache: SectionsCache,
}

impl PlayerAnalyticsService {
    pub fn new(poller: AggregatePoller, cache: SectionsCache) -> Self {
        Self { poller, cache }
    }

    /// Loads the requested kinds (all kinds when empty).
    ///
    /// A cached aggregate whose requested sections are all READY or
    /// NO_MATCHES is returned without polling. Otherwise cached sections are
    /// reported first as a seed and a full load runs; its result is merged
    /// into the cache entry unless the caller cancelled.
    pub async fn load(
        &self,
        player_key: &PlayerKey,
        kinds: &[SectionKind],
        on_partial: Option<PartialCallback<'_>>,
        cancel: &CancelFlag,
    ) -> PlayerSections {
        let kinds: &[SectionKind] = if kinds.is_empty() {
            &SectionKind::ALL
        } else {
            kinds
        };
        let emit_all = |sections: &PlayerSections| {
            if let Some(callback) = on_partial {
                for (kind, section) in sections.iter() {
                    if cancel.is_cancelled() {
                        return;
                    }
                    callback(kind, section);
                }
            }
        };

        if let Some(cached) = self.cache.get(player_key).await {
            let seed = cached.subset(kinds);
            if cached.contains_all(kinds) && seed.is_fully_successful() {
                debug!("Serving cached sections for {}", player_key);
                emit_all(&seed);
                return seed;
            }
            debug!("Seeding {} from a partial cached aggregate", player_key);
            emit_all(&seed);
        }

        let sections = self
            .poller
            .load_all(player_key, kinds, on_partial, cancel)
            .await;
        if cancel.is_cancelled() {
            debug!("Load for {} cancelled; result not cached", player_key);
        } else {
            self.cache.put(player_key, sections.clone()).await;
        }
        sections
    }

    /// Forgets the cached aggregate, e.g. after a forced refresh.
    pub async fn invalidate(&self, player_key: &PlayerKey) {
        self.cache.invalidate(player_key).await;
    }
}
