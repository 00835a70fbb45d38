//! Radar Market Data Crate
//!
//! Live market data for Russian-market securities, pulled concurrently from
//! several upstream providers and reconciled into one snapshot per query.
//!
//! # Architecture
//!
//! ```text
//!                 query ("SBER", "RU000A100001", "Газпром БО-001Р-02")
//!                                  |
//!                                  v
//!                       +---------------------+
//!                       | MarketDataAggregator| <--> TtlCache
//!                       +---------------------+
//!                         |                 |      (concurrent, per-provider
//!                         v                 v       timeout + circuit breaker)
//!                 +--------------+   +--------------+
//!                 | TBankProvider|   |MoexIssProvider|
//!                 +--------------+   +--------------+
//!                         |                 |
//!                         +--------+--------+
//!                                  v
//!                      policy::choose + policy::merge
//!                                  |
//!                                  v
//!                    MarketSnapshot (+ freshness tag)
//! ```
//!
//! # Core Types
//!
//! - [`MarketSnapshot`] - normalized point-in-time data for one security
//! - [`BondCalendar`] - coupon and amortization schedule
//! - [`SecurityType`] - share / bond / fund
//! - [`MarketDataProvider`] - the adapter trait every upstream implements
//! - [`SnapshotSource`] - read interface consumed by the resolution pipeline

pub mod aggregator;
pub mod cache;
pub mod config;
pub mod errors;
pub mod models;
pub mod provider;
pub mod similarity;
pub mod trading_hours;

pub use aggregator::{AggregatorOptions, MarketDataAggregator, SnapshotSource};
pub use cache::{Clock, ManualClock, SystemClock, TtlCache};
pub use config::{ConfigError, MarketDataConfig};
pub use errors::{MarketDataError, RetryClass};
pub use models::{
    AmortizationEvent, BondCalendar, CouponEvent, Freshness, MarketSnapshot, ProviderId,
    ResolvedSecurity, SecurityType,
};
pub use provider::moex::MoexIssProvider;
pub use provider::tbank::TBankProvider;
pub use provider::MarketDataProvider;
pub use similarity::{SequenceRatio, SimilarityStrategy};
pub use trading_hours::{calendar_for, SessionStatus, TradingCalendar};
