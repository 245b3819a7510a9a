use std::sync::Arc;

use crate::config::Config;
use statline_core::sections::{
    AggregatePoller, AnalysisBackend, CacheConfig, HttpAnalysisBackend, PlayerAnalyticsService,
    PollerConfig, SectionService, SectionServiceTrait, SectionsCache, SyncTracker,
};
use statline_storage_sqlite::{db, SectionRepository};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

pub struct AppState {
    pub repository: Arc<SectionRepository>,
    pub tracker: Arc<SyncTracker>,
    pub sections: Arc<dyn SectionServiceTrait>,
    pub analytics: Arc<PlayerAnalyticsService>,
}

/// Installs the global subscriber. `log` records from the library crates are
/// forwarded into it.
pub fn init_tracing() {
    let log_format = std::env::var("STATLINE_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if log_format.eq_ignore_ascii_case("json") {
        registry
            .with(fmt::layer().json().with_current_span(false))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_line_number(true))
            .init();
    }
}

pub async fn build_state(config: &Config) -> anyhow::Result<Arc<AppState>> {
    let backend = HttpAnalysisBackend::new(&config.analysis_url, config.analysis_timeout)?;
    tracing::info!("Analysis backend: {}", backend.base_url());
    build_state_with_backend(config, Arc::new(backend)).await
}

/// Wires the engine around an arbitrary analysis backend.
pub async fn build_state_with_backend(
    config: &Config,
    backend: Arc<dyn AnalysisBackend>,
) -> anyhow::Result<Arc<AppState>> {
    let db_path = db::init(&config.db_path)?;
    tracing::info!("Database path in use: {}", db_path);

    let pool = db::create_pool(&db_path)?;
    db::run_migrations(&pool)?;
    let writer = db::spawn_writer((*pool).clone());

    let repository = Arc::new(SectionRepository::new(pool, writer));
    let tracker = SyncTracker::new();
    let sections: Arc<dyn SectionServiceTrait> = Arc::new(SectionService::new(
        repository.clone(),
        backend,
        tracker.clone(),
    ));

    let poller = AggregatePoller::new(
        sections.clone(),
        PollerConfig {
            max_attempts: config.poll_attempts,
            delay: config.poll_delay,
        },
    );
    let cache = SectionsCache::new(CacheConfig {
        ttl: config.cache_ttl,
    });
    let analytics = Arc::new(PlayerAnalyticsService::new(poller, cache));

    Ok(Arc::new(AppState {
        repository,
        tracker,
        sections,
        analytics,
    }))
}
