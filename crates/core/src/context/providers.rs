use std::sync::Arc;

use log::{info, warn};
use radar_market_data::aggregator::{CircuitBreaker, CircuitBreakerConfig};
use radar_market_data::{
    Clock, MarketDataAggregator, SequenceRatio, SimilarityStrategy, SnapshotSource, SystemClock,
    TtlCache,
};

use super::registry::ServiceContext;
use crate::config::RadarConfig;
use crate::errors::Result;
use crate::ingest::{HoldingsStore, IngestService, IngestServiceTrait};
use crate::pipeline::{ResolutionOptions, ResolutionPipeline, ResolutionServiceTrait};
use crate::reference::ReferenceCatalog;

pub fn initialize_context(
    config: RadarConfig,
    store: Arc<dyn HoldingsStore>,
) -> Result<ServiceContext> {
    config.validate()?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let similarity: Arc<dyn SimilarityStrategy> = Arc::new(SequenceRatio);
    let market_data = &config.market_data;

    let cache = Arc::new(TtlCache::new(market_data.quote_cache_ttl, clock.clone()));
    let breaker = Arc::new(CircuitBreaker::new(
        CircuitBreakerConfig::default(),
        clock.clone(),
    ));

    let providers = market_data.build_providers(similarity.clone());
    if providers.is_empty() {
        warn!("No market data providers enabled, only the reference catalog will resolve positions");
    }
    let aggregator = MarketDataAggregator::new(
        providers,
        cache.clone(),
        clock.clone(),
        breaker,
        market_data.aggregator_options(),
    );
    info!("Market data providers: {:?}", aggregator.provider_ids());
    let snapshot_source: Arc<dyn SnapshotSource> = Arc::new(aggregator);

    let catalog = Arc::new(ReferenceCatalog::load(
        config.reference_path.as_deref(),
        similarity,
        config.fuzzy_threshold,
    )?);

    let resolution_service: Arc<dyn ResolutionServiceTrait> = Arc::new(ResolutionPipeline::new(
        snapshot_source.clone(),
        catalog.clone(),
        ResolutionOptions::from(&config),
    ));
    let ingest_service: Arc<dyn IngestServiceTrait> =
        Arc::new(IngestService::new(resolution_service.clone(), store));

    Ok(ServiceContext {
        config: Arc::new(config),
        clock,
        cache,
        catalog,
        snapshot_source,
        resolution_service,
        ingest_service,
    })
}
