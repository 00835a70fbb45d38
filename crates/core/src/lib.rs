//! Radar Core - entity resolution for Russian-market brokerage statements.
//!
//! Turns noisy security references read off statements (OCR output, mixed
//! Cyrillic and Latin lookalikes, garbled bond series codes) into canonical,
//! de-duplicated holdings. Live data comes from `radar-market-data`; a
//! static reference catalog fills in identifiers and serves as the last
//! resort when every provider is silent.
//!
//! Persistence is not part of this crate. Hosts implement
//! [`ingest::HoldingsStore`] and hand it to [`context::ServiceContext`].

pub mod config;
pub mod context;
pub mod errors;
pub mod ingest;
pub mod normalize;
pub mod pipeline;
pub mod positions;
pub mod reference;

pub use config::RadarConfig;
pub use context::ServiceContext;
pub use errors::{CoreError, Result};
pub use pipeline::{ResolutionPipeline, ResolutionServiceTrait};
pub use positions::*;
pub use reference::ReferenceCatalog;
