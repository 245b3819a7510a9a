//! Section orchestration: serve what is stored, start at most one background
//! refresh per key, never block the caller on the backend.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, error};

use super::client::AnalysisBackend;
use super::kinds::SectionKind;
use super::model::{Section, SectionRecord};
use super::normalizer;
use super::store::{read_or_failed, SectionRepositoryTrait};
use super::tracker::SyncTracker;
use super::types::PlayerKey;
use crate::constants::GENERIC_FAILURE_MESSAGE;

/// Trait defining the contract for section orchestration.
///
/// Every operation is total: store and backend failures surface as FAILED
/// sections, never as errors.
#[async_trait]
pub trait SectionServiceTrait: Send + Sync {
    /// Returns the stored section, starting a background refresh unless it is
    /// READY with data. A refresh already in flight is joined, not repeated.
    async fn get_section(&self, player_key: &PlayerKey, kind: SectionKind) -> Section;

    /// Like [`get_section`](Self::get_section), but a terminal result written
    /// at or after `since` is accepted as-is. Pollers use this so a FAILED or
    /// NO_MATCHES outcome of their own refresh ends the poll instead of
    /// triggering another refresh.
    async fn poll_section(
        &self,
        player_key: &PlayerKey,
        kind: SectionKind,
        since: DateTime<Utc>,
    ) -> Section;

    /// Starts a refresh even when the section is READY (still single-flight).
    async fn refresh_section(&self, player_key: &PlayerKey, kind: SectionKind) -> Section;

    /// Current stored section; never starts a refresh.
    fn peek_section(&self, player_key: &PlayerKey, kind: SectionKind) -> Section;
}

pub struct SectionService {
    repository: Arc<dyn SectionRepositoryTrait>,
    backend: Arc<dyn AnalysisBackend>,
    tracker: Arc<SyncTracker>,
}

impl SectionService {
    pub fn new(
        repository: Arc<dyn SectionRepositoryTrait>,
        backend: Arc<dyn AnalysisBackend>,
        tracker: Arc<SyncTracker>,
    ) -> Self {
        Self {
            repository,
            backend,
            tracker,
        }
    }

    fn read_record(&self, player_key: &PlayerKey, kind: SectionKind) -> Option<SectionRecord> {
        match self.repository.read_record(player_key, kind) {
            Ok(record) => record,
            Err(e) => {
                error!("Failed to read section {}/{}: {}", player_key, kind, e);
                None
            }
        }
    }

    /// Acquires the key, persists FETCHING, then fetches in a detached task.
    ///
    /// When another refresh holds the key, `current` is returned unchanged.
    /// Unless `force` is set, a stored READY section is left untouched and
    /// returned without fetching. The terminal write always lands before the
    /// handle is released.
    async fn begin_refresh(
        &self,
        player_key: &PlayerKey,
        kind: SectionKind,
        current: Section,
        force: bool,
    ) -> Section {
        let Some(guard) = self.tracker.try_acquire(player_key, kind) else {
            return current;
        };

        let mark_fetching = move |section: Section| {
            if !force && section.is_ready_with_data() {
                section
            } else {
                section.into_fetching()
            }
        };
        let fetching = match self
            .repository
            .update(player_key, kind, Box::new(mark_fetching))
            .await
        {
            Ok(record) if !force && record.section.is_ready_with_data() => {
                debug!(
                    "Section {}/{} already READY, skipping refresh",
                    player_key, kind
                );
                return record.section;
            }
            Ok(record) => record.section,
            Err(e) => {
                error!(
                    "Failed to mark section {}/{} as fetching: {}",
                    player_key, kind, e
                );
                return Section::failed(GENERIC_FAILURE_MESSAGE);
            }
        };
        debug!("Refreshing section {}/{}", player_key, kind);

        let repository = Arc::clone(&self.repository);
        let backend = Arc::clone(&self.backend);
        let player_key = player_key.clone();
        tokio::spawn(async move {
            let _guard = guard;
            let response = backend.fetch_section(&player_key, kind).await;
            let section = normalizer::normalize_response(kind, response);
            debug!(
                "Section {}/{} refreshed with status {}",
                player_key,
                kind,
                section.status()
            );
            if let Err(e) = repository.write(&player_key, kind, section).await {
                error!(
                    "Failed to persist refreshed section {}/{}: {}",
                    player_key, kind, e
                );
            }
        });

        fetching
    }
}

#[async_trait]
impl SectionServiceTrait for SectionService {
    async fn get_section(&self, player_key: &PlayerKey, kind: SectionKind) -> Section {
        let current = self
            .read_record(player_key, kind)
            .map(|record| record.section)
            .unwrap_or_default();
        if current.is_ready_with_data() {
            return current;
        }
        self.begin_refresh(player_key, kind, current, false).await
    }

    async fn poll_section(
        &self,
        player_key: &PlayerKey,
        kind: SectionKind,
        since: DateTime<Utc>,
    ) -> Section {
        let record = self.read_record(player_key, kind);
        let current = match record {
            Some(record) if record.section.is_ready_with_data() => return record.section,
            Some(record) if record.section.is_terminal() && record.updated_at >= since => {
                return record.section;
            }
            Some(record) => record.section,
            None => Section::not_started(),
        };
        self.begin_refresh(player_key, kind, current, false).await
    }

    async fn refresh_section(&self, player_key: &PlayerKey, kind: SectionKind) -> Section {
        let current = read_or_failed(self.repository.as_ref(), player_key, kind);
        self.begin_refresh(player_key, kind, current, true).await
    }

    fn peek_section(&self, player_key: &PlayerKey, kind: SectionKind) -> Section {
        read_or_failed(self.repository.as_ref(), player_key, kind)
    }
}
