//! Analytic section synchronization.
//!
//! - [`model`] - Section envelope, payloads and the per-player aggregate
//! - [`kinds`] - Section kinds and their static descriptors
//! - [`mapper`] - Tolerant extraction of typed payloads from backend JSON
//! - [`normalizer`] - Backend status/envelope normalization
//! - [`store`] - Persistent store contract, change feed and `watch_section`
//! - [`tracker`] - Single-flight refresh handles
//! - [`service`] - Orchestrator (`get_section`)
//! - [`poller`] - Aggregate poller (`load_all`)
//! - [`cache`] - Short-lived aggregate cache
//! - [`analytics`] - Facade combining cache and poller
//! - [`client`] - Analysis backend trait and HTTP implementation
//!
//! ```text
//! PlayerAnalyticsService → AggregatePoller → SectionService → AnalysisBackend
//!        ↓                                        ↓      ↓
//!   SectionsCache                     SectionRepository  SyncTracker
//! ```

pub mod analytics;
pub mod cache;
pub mod client;
pub mod kinds;
pub mod mapper;
pub mod model;
pub mod normalizer;
pub mod poller;
pub mod service;
pub mod store;
pub mod tracker;
pub mod types;

#[cfg(test)]
mod test_support;

pub use analytics::PlayerAnalyticsService;
pub use cache::{CacheConfig, SectionsCache};
pub use client::{AnalysisBackend, AnalysisError, HttpAnalysisBackend};
pub use kinds::{parse_kind_list, SectionDescriptor, SectionKind};
pub use model::{
    ChampionStat, Narrative, PlayerSections, RiskProfile, RoleStat, Section, SectionData,
    SectionRecord, SectionStatus, SummaryCards,
};
pub use poller::{AggregatePoller, CancelFlag, PartialCallback, PollerConfig};
pub use service::{SectionService, SectionServiceTrait};
pub use store::{watch_section, SectionChangeFeed, SectionMutator, SectionRepositoryTrait};
pub use tracker::{SyncGuard, SyncTracker};
pub use types::{PlayerKey, SectionKey};
