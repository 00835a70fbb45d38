use std::sync::Arc;

use radar_market_data::{Clock, SnapshotSource, TtlCache};

use crate::config::RadarConfig;
use crate::errors::Result;
use crate::ingest::{HoldingsStore, IngestServiceTrait};
use crate::pipeline::ResolutionServiceTrait;
use crate::reference::ReferenceCatalog;

/// Process-lifetime singletons, built once at startup.
pub struct ServiceContext {
    pub config: Arc<RadarConfig>,
    pub clock: Arc<dyn Clock>,
    pub cache: Arc<TtlCache>,
    pub catalog: Arc<ReferenceCatalog>,

    // Services
    pub snapshot_source: Arc<dyn SnapshotSource>,
    pub resolution_service: Arc<dyn ResolutionServiceTrait>,
    pub ingest_service: Arc<dyn IngestServiceTrait>,
}

impl ServiceContext {
    /// Builds every service from `config`. `store` persists ingested
    /// holdings.
    pub fn from_config(config: RadarConfig, store: Arc<dyn HoldingsStore>) -> Result<Self> {
        super::initialize_context(config, store)
    }

    pub fn config(&self) -> Arc<RadarConfig> {
        Arc::clone(&self.config)
    }

    pub fn cache(&self) -> Arc<TtlCache> {
        Arc::clone(&self.cache)
    }

    pub fn catalog(&self) -> Arc<ReferenceCatalog> {
        Arc::clone(&self.catalog)
    }

    pub fn snapshot_source(&self) -> Arc<dyn SnapshotSource> {
        Arc::clone(&self.snapshot_source)
    }

    pub fn resolution_service(&self) -> Arc<dyn ResolutionServiceTrait> {
        Arc::clone(&self.resolution_service)
    }

    pub fn ingest_service(&self) -> Arc<dyn IngestServiceTrait> {
        Arc::clone(&self.ingest_service)
    }
}
