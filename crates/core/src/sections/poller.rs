//! Aggregate polling across several section kinds.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::{debug, warn};

use super::kinds::SectionKind;
use super::model::{PlayerSections, Section};
use super::service::SectionServiceTrait;
use super::types::PlayerKey;
use crate::constants::{DEFAULT_POLL_DELAY_MS, DEFAULT_POLL_MAX_ATTEMPTS};

/// Receives each section update as soon as it is known.
pub type PartialCallback<'a> = &'a (dyn Fn(SectionKind, &Section) + Send + Sync);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollerConfig {
    /// Upper bound on polling rounds.
    pub max_attempts: u32,
    /// Pause between rounds (not after the last one).
    pub delay: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_POLL_MAX_ATTEMPTS,
            delay: Duration::from_millis(DEFAULT_POLL_DELAY_MS),
        }
    }
}

/// Consumer-side cancellation.
///
/// Once set, no further partial updates are delivered and polling stops at
/// the next round boundary. Refreshes already started keep running and still
/// persist their results.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Message for a section that never reached a terminal status.
pub fn timed_out_message(kind: SectionKind) -> String {
    format!("Analysis timed out waiting for {}.", kind.context())
}

/// Re-polls the orchestrator until every requested kind is terminal or the
/// round budget runs out. Owns no lock; duplicate suppression comes from the
/// orchestrator's single-flight refreshes.
pub struct AggregatePoller {
    service: Arc<dyn SectionServiceTrait>,
    config: PollerConfig,
}

impl AggregatePoller {
    /// At least one round always runs, whatever `max_attempts` says.
    pub fn new(service: Arc<dyn SectionServiceTrait>, config: PollerConfig) -> Self {
        let config = PollerConfig {
            max_attempts: config.max_attempts.max(1),
            ..config
        };
        Self { service, config }
    }

    /// Loads every kind, reporting each update through `on_partial`.
    ///
    /// Sections still in progress after the last round become FAILED with a
    /// "timed out" message. A cancelled load returns whatever it has so far.
    pub async fn load_all(
        &self,
        player_key: &PlayerKey,
        kinds: &[SectionKind],
        on_partial: Option<PartialCallback<'_>>,
        cancel: &CancelFlag,
    ) -> PlayerSections {
        let emit = |kind: SectionKind, section: &Section| {
            if cancel.is_cancelled() {
                return;
            }
            if let Some(callback) = on_partial {
                callback(kind, section);
            }
        };

        let since = Utc::now();
        let mut sections = PlayerSections::new(kinds);

        for attempt in 1..=self.config.max_attempts {
            if cancel.is_cancelled() {
                debug!("Load for {} cancelled before round {}", player_key, attempt);
                return sections;
            }

            for kind in sections.in_progress_kinds() {
                let section = self.service.poll_section(player_key, kind, since).await;
                emit(kind, &section);
                sections.insert(kind, section);
            }

            if !sections.loading() {
                debug!(
                    "All sections for {} settled after {} round(s)",
                    player_key, attempt
                );
                return sections;
            }
            if attempt < self.config.max_attempts {
                tokio::time::sleep(self.config.delay).await;
            }
        }

        if cancel.is_cancelled() {
            return sections;
        }
        for kind in sections.in_progress_kinds() {
            warn!("Timed out waiting for section {}/{}", player_key, kind);
            let section = Section::failed(timed_out_message(kind));
            emit(kind, &section);
            sections.insert(kind, section);
        }
        sections
    }
}
