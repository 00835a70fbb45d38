//! Ingest module - holdings store seam, ingestion service, and traits.

mod ingest_model;
mod ingest_service;
mod ingest_traits;

pub use ingest_model::{IngestReport, UpsertOutcome};
pub use ingest_service::IngestService;
pub use ingest_traits::{HoldingsStore, IngestServiceTrait};
