//! Catalog sync engine façade and bootstrap helpers.
//!
//! This crate wires a [`CoreConfig`] and a host-provided [`PersistencePort`]
//! into a ready [`SyncCoordinator`]. Hosts register their source adapters on
//! the coordinator and subscribe to the event bus; everything else lives in
//! the workspace crates re-exported here.

use std::sync::Arc;

use anyhow::Context;
use sqlx::sqlite::SqlitePoolOptions;
use tracing::info;

pub use bridge_traits::{
    CatalogEvent, CatalogItem, Fingerprint, FingerprintStore, PersistencePort, SourceAdapter,
    SourceId, SourceKind, SyncStrategy,
};
pub use core_runtime::{CoreConfig, CoreEvent, EventBus, SyncSettings};
pub use core_sync::{
    InMemoryFingerprintStore, RunHandle, SqliteFingerprintStore, SyncCoordinator, SyncStatus,
    SyncSummary,
};

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct CatalogEngine {
    coordinator: Arc<SyncCoordinator>,
    fingerprints: Arc<dyn FingerprintStore>,
    event_bus: EventBus,
}

impl CatalogEngine {
    /// Builds the engine from validated configuration.
    ///
    /// With a `database_url` fingerprints are kept in SQLite (the table is
    /// created if missing); without one they live in memory.
    pub async fn from_config(
        config: CoreConfig,
        sink: Arc<dyn PersistencePort>,
    ) -> anyhow::Result<Self> {
        config.validate().context("invalid engine configuration")?;

        let fingerprints: Arc<dyn FingerprintStore> = match &config.database_url {
            Some(url) => {
                let pool = SqlitePoolOptions::new()
                    .max_connections(1)
                    .connect(url)
                    .await
                    .with_context(|| format!("failed to open fingerprint database {}", url))?;
                let store = SqliteFingerprintStore::new(pool);
                store
                    .initialize()
                    .await
                    .context("failed to create fingerprint schema")?;
                Arc::new(store)
            }
            None => Arc::new(InMemoryFingerprintStore::new()),
        };

        let event_bus = EventBus::new(config.event_buffer_size);
        let coordinator = SyncCoordinator::new(
            config.sync.clone(),
            event_bus.clone(),
            Arc::clone(&fingerprints),
            sink,
        )
        .context("failed to build sync coordinator")?;

        info!(
            persistent_fingerprints = config.database_url.is_some(),
            max_batch_size = config.sync.max_batch_size,
            "Catalog engine ready"
        );

        Ok(Self {
            coordinator: Arc::new(coordinator),
            fingerprints,
            event_bus,
        })
    }

    pub fn coordinator(&self) -> Arc<SyncCoordinator> {
        Arc::clone(&self.coordinator)
    }

    pub fn fingerprints(&self) -> Arc<dyn FingerprintStore> {
        Arc::clone(&self.fingerprints)
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::catalog::{CatalogEventStream, ScanSummary};
    use bridge_traits::error::Result as BridgeResult;
    use futures::stream::{self, StreamExt};

    struct OneItemSource;

    #[async_trait]
    impl SourceAdapter for OneItemSource {
        fn source_id(&self) -> SourceId {
            SourceId::from("demo")
        }

        fn kind(&self) -> SourceKind {
            SourceKind::ListingApi
        }

        fn phase_labels(&self) -> &'static [&'static str] {
            &["vod"]
        }

        async fn compute_fingerprint(&self) -> BridgeResult<Fingerprint> {
            Ok(Fingerprint::from_markers([("vod", 1)]))
        }

        fn scan(&self, _strategy: SyncStrategy) -> CatalogEventStream {
            stream::iter(vec![
                CatalogEvent::ItemDiscovered {
                    item: CatalogItem::new("m1", "vod", "Movie"),
                },
                CatalogEvent::ScanCompleted {
                    summary: ScanSummary { items_emitted: 1 },
                },
            ])
            .boxed()
        }
    }

    struct DiscardSink;

    #[async_trait]
    impl PersistencePort for DiscardSink {
        async fn flush_batch(&self, _source: &SourceId, _items: &[CatalogItem]) -> BridgeResult<()> {
            Ok(())
        }
    }

    #[core_async::test]
    async fn test_engine_with_sqlite_fingerprints() {
        let config = CoreConfig::builder()
            .database_url("sqlite::memory:")
            .build()
            .unwrap();
        let engine = CatalogEngine::from_config(config, Arc::new(DiscardSink))
            .await
            .unwrap();

        let coordinator = engine.coordinator();
        coordinator
            .register_source(Arc::new(OneItemSource))
            .await
            .unwrap();

        let status = coordinator
            .start(&SourceId::from("demo"))
            .await
            .unwrap()
            .wait()
            .await;
        assert!(matches!(status, SyncStatus::Completed { .. }));
        assert!(engine
            .fingerprints()
            .get(&SourceId::from("demo"))
            .await
            .unwrap()
            .is_some());
    }

    #[core_async::test]
    async fn test_engine_defaults_to_memory_store() {
        let config = CoreConfig::builder().build().unwrap();
        let engine = CatalogEngine::from_config(config, Arc::new(DiscardSink))
            .await
            .unwrap();

        assert_eq!(engine.event_bus().subscriber_count(), 0);
        assert!(engine.coordinator().sources().await.is_empty());
    }
}
