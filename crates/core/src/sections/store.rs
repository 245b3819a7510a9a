//! Persistent section store contract and change feed.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, Stream};
use log::{debug, error};
use tokio::sync::broadcast::{self, error::RecvError};

use super::kinds::SectionKind;
use super::model::{Section, SectionRecord};
use super::types::{PlayerKey, SectionKey};
use crate::constants::{GENERIC_FAILURE_MESSAGE, SECTION_CHANGE_FEED_CAPACITY};
use crate::errors::Result;

/// Read-modify-write step applied by [`SectionRepositoryTrait::update`].
pub type SectionMutator = Box<dyn FnOnce(Section) -> Section + Send>;

/// Trait defining the contract for the persistent section store.
///
/// Keys are (player, kind). Every successful `write` or `update` must publish
/// the key on the change feed returned by `subscribe`.
#[async_trait]
pub trait SectionRepositoryTrait: Send + Sync {
    /// Latest persisted record, if any.
    fn read_record(&self, player_key: &PlayerKey, kind: SectionKind)
        -> Result<Option<SectionRecord>>;

    /// Current section; NOT_STARTED when nothing has been stored yet.
    fn read(&self, player_key: &PlayerKey, kind: SectionKind) -> Result<Section> {
        Ok(self
            .read_record(player_key, kind)?
            .map(|record| record.section)
            .unwrap_or_default())
    }

    /// Unconditional upsert, stamped with the current time.
    async fn write(
        &self,
        player_key: &PlayerKey,
        kind: SectionKind,
        section: Section,
    ) -> Result<SectionRecord>;

    /// Atomic read-modify-write of one key. The mutator receives the current
    /// section (NOT_STARTED when absent) and no other write to the same key
    /// may interleave.
    async fn update(
        &self,
        player_key: &PlayerKey,
        kind: SectionKind,
        mutator: SectionMutator,
    ) -> Result<SectionRecord>;

    /// Keys of subsequent writes.
    fn subscribe(&self) -> broadcast::Receiver<SectionKey>;
}

// =============================================================================
// Change Feed
// =============================================================================

/// Broadcasts the key of every persisted change.
#[derive(Clone)]
pub struct SectionChangeFeed {
    sender: broadcast::Sender<SectionKey>,
}

impl SectionChangeFeed {
    pub fn new() -> Self {
        Self::with_capacity(SECTION_CHANGE_FEED_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishing with no subscribers is not an error.
    pub fn publish(&self, key: SectionKey) {
        let _ = self.sender.send(key);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SectionKey> {
        self.sender.subscribe()
    }
}

impl Default for SectionChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

/// Reads a section, folding store errors into a FAILED section.
pub fn read_or_failed<R>(store: &R, player_key: &PlayerKey, kind: SectionKind) -> Section
where
    R: SectionRepositoryTrait + ?Sized,
{
    store.read(player_key, kind).unwrap_or_else(|e| {
        error!("Failed to read section {}/{}: {}", player_key, kind, e);
        Section::failed(GENERIC_FAILURE_MESSAGE)
    })
}

/// Live view of one key: the current value, then the value after every
/// subsequent write to that key.
///
/// Nothing happens until the stream is polled. Each emission is a fresh read,
/// so a lagging consumer skips intermediate values but never sees a stale
/// one. The stream ends when the store's change feed closes; calling again
/// restarts from the current value.
pub fn watch_section<R>(store: Arc<R>, key: SectionKey) -> impl Stream<Item = Section> + Send
where
    R: SectionRepositoryTrait + ?Sized + 'static,
{
    stream::unfold((store, key, None), |(store, key, receiver)| async move {
        let mut receiver: broadcast::Receiver<SectionKey> = match receiver {
            None => {
                // Subscribe before the first read so no write can slip between.
                let receiver = store.subscribe();
                let section = read_or_failed(&*store, &key.player_key, key.kind);
                return Some((section, (store, key, Some(receiver))));
            }
            Some(receiver) => receiver,
        };

        loop {
            match receiver.recv().await {
                Ok(changed) if changed == key => break,
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    debug!("Watcher for {} lagged by {} changes", key, skipped);
                    break;
                }
                Err(RecvError::Closed) => return None,
            }
        }

        let section = read_or_failed(&*store, &key.player_key, key.kind);
        Some((section, (store, key, Some(receiver))))
    })
}
