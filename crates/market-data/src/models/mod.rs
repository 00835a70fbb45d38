//! Market data models
//!
//! - `types` - identifiers and small enums (ProviderId, SecurityType, Freshness)
//! - `resolved` - a provider's resolution of a free-text query
//! - `snapshot` - normalized point-in-time market data
//! - `calendar` - bond coupon and amortization schedule

mod calendar;
mod resolved;
mod snapshot;
mod types;

pub use calendar::{AmortizationEvent, BondCalendar, CouponEvent};
pub use resolved::ResolvedSecurity;
pub use snapshot::MarketSnapshot;
pub use types::{Freshness, ProviderId, SecurityType};
