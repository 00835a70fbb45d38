//! Pipeline module - resolution service, overrides, and traits.

mod pipeline_overrides;
mod pipeline_service;
mod pipeline_traits;

pub use pipeline_overrides::{is_forced_share, reconcile_type, FORCED_SHARE_TICKERS};
pub use pipeline_service::{ResolutionOptions, ResolutionPipeline, REFERENCE_PROVIDER};
pub use pipeline_traits::ResolutionServiceTrait;
