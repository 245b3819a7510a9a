//! In-memory store and scripted backend shared by the section tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tokio::sync::{broadcast, Semaphore};

use super::client::{AnalysisBackend, AnalysisError};
use super::kinds::SectionKind;
use super::model::{Section, SectionRecord};
use super::store::{SectionChangeFeed, SectionMutator, SectionRepositoryTrait};
use super::types::{PlayerKey, SectionKey};
use crate::errors::{DatabaseError, Error, Result};

pub fn player() -> PlayerKey {
    PlayerKey::new("Faker#KR1").unwrap()
}

// =============================================================================
// Mock Repository
// =============================================================================

#[derive(Default)]
pub struct MockSectionRepository {
    records: Mutex<HashMap<SectionKey, SectionRecord>>,
    feed: SectionChangeFeed,
    failing: AtomicBool,
    failing_reads: AtomicUsize,
    writes: AtomicUsize,
}

impl MockSectionRepository {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Makes every read and write fail with a database error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Makes the next `count` reads fail while writes keep working.
    pub fn fail_next_reads(&self, count: usize) {
        self.failing_reads.store(count, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Database(DatabaseError::QueryFailed(
                "disk I/O error".to_string(),
            )));
        }
        Ok(())
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn seed(&self, player_key: &PlayerKey, kind: SectionKind, section: Section) {
        self.store(player_key, kind, section, Utc::now());
    }

    pub fn seed_at(
        &self,
        player_key: &PlayerKey,
        kind: SectionKind,
        section: Section,
        updated_at: DateTime<Utc>,
    ) {
        self.store(player_key, kind, section, updated_at);
    }

    fn store(
        &self,
        player_key: &PlayerKey,
        kind: SectionKind,
        section: Section,
        updated_at: DateTime<Utc>,
    ) -> SectionRecord {
        let key = SectionKey::new(player_key.clone(), kind);
        let record = SectionRecord {
            player_key: player_key.clone(),
            kind,
            section,
            updated_at,
        };
        self.records
            .lock()
            .unwrap()
            .insert(key.clone(), record.clone());
        self.feed.publish(key);
        record
    }
}

#[async_trait]
impl SectionRepositoryTrait for MockSectionRepository {
    fn read_record(
        &self,
        player_key: &PlayerKey,
        kind: SectionKind,
    ) -> Result<Option<SectionRecord>> {
        self.check_available()?;
        let remaining = self.failing_reads.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_reads.store(remaining - 1, Ordering::SeqCst);
            return Err(Error::Database(DatabaseError::QueryFailed(
                "database is locked".to_string(),
            )));
        }
        let key = SectionKey::new(player_key.clone(), kind);
        Ok(self.records.lock().unwrap().get(&key).cloned())
    }

    async fn write(
        &self,
        player_key: &PlayerKey,
        kind: SectionKind,
        section: Section,
    ) -> Result<SectionRecord> {
        self.check_available()?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(self.store(player_key, kind, section, Utc::now()))
    }

    async fn update(
        &self,
        player_key: &PlayerKey,
        kind: SectionKind,
        mutator: SectionMutator,
    ) -> Result<SectionRecord> {
        self.check_available()?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        let key = SectionKey::new(player_key.clone(), kind);
        let record = {
            let mut records = self.records.lock().unwrap();
            let current = records
                .get(&key)
                .map(|record| record.section.clone())
                .unwrap_or_default();
            let record = SectionRecord {
                player_key: player_key.clone(),
                kind,
                section: mutator(current),
                updated_at: Utc::now(),
            };
            records.insert(key.clone(), record.clone());
            record
        };
        self.feed.publish(key);
        Ok(record)
    }

    fn subscribe(&self) -> broadcast::Receiver<SectionKey> {
        self.feed.subscribe()
    }
}

// =============================================================================
// Scripted Backend
// =============================================================================

/// Backend returning queued responses per kind, then a fallback.
pub struct ScriptedBackend {
    scripts: Mutex<HashMap<SectionKind, VecDeque<std::result::Result<Value, AnalysisError>>>>,
    fallback: Mutex<HashMap<SectionKind, std::result::Result<Value, AnalysisError>>>,
    default_response: std::result::Result<Value, AnalysisError>,
    calls: Mutex<HashMap<SectionKind, usize>>,
    gate: Option<Arc<Semaphore>>,
    panic_on_fetch: AtomicBool,
}

impl ScriptedBackend {
    /// Every kind answers with the given envelope.
    pub fn responding(default_response: Value) -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            fallback: Mutex::new(HashMap::new()),
            default_response: Ok(default_response),
            calls: Mutex::new(HashMap::new()),
            gate: None,
            panic_on_fetch: AtomicBool::new(false),
        }
    }

    /// Every kind answers READY with an empty payload.
    pub fn ready() -> Self {
        Self::responding(json!({ "status": "done", "data": {} }))
    }

    pub fn failing(error: AnalysisError) -> Self {
        Self {
            default_response: Err(error),
            ..Self::ready()
        }
    }

    /// Calls block until permits are added to the returned semaphore.
    pub fn gated(self) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        (
            Self {
                gate: Some(Arc::clone(&gate)),
                ..self
            },
            gate,
        )
    }

    /// Answers for one kind, used once each in order.
    pub fn with_script(self, kind: SectionKind, responses: Vec<std::result::Result<Value, AnalysisError>>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(kind, responses.into_iter().collect());
        self
    }

    /// Answer for one kind once its script is exhausted.
    pub fn with_fallback(self, kind: SectionKind, response: std::result::Result<Value, AnalysisError>) -> Self {
        self.fallback.lock().unwrap().insert(kind, response);
        self
    }

    pub fn panicking(self) -> Self {
        self.panic_on_fetch.store(true, Ordering::SeqCst);
        self
    }

    pub fn calls(&self, kind: SectionKind) -> usize {
        self.calls.lock().unwrap().get(&kind).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl AnalysisBackend for ScriptedBackend {
    async fn fetch_section(
        &self,
        _player_key: &PlayerKey,
        kind: SectionKind,
    ) -> std::result::Result<Value, AnalysisError> {
        *self.calls.lock().unwrap().entry(kind).or_insert(0) += 1;

        if let Some(gate) = &self.gate {
            let _permit = gate.acquire().await.unwrap();
        }
        if self.panic_on_fetch.load(Ordering::SeqCst) {
            panic!("backend exploded");
        }

        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&kind)
            .and_then(VecDeque::pop_front);
        if let Some(response) = scripted {
            return response;
        }
        if let Some(response) = self.fallback.lock().unwrap().get(&kind) {
            return response.clone();
        }
        self.default_response.clone()
    }
}
