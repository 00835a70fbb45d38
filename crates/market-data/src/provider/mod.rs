//! Market data provider abstractions and implementations.
//!
//! This module contains:
//! - The `MarketDataProvider` trait that every upstream adapter implements
//! - The T-Bank Invest REST adapter
//! - The MOEX ISS adapter
//! - Small JSON helpers shared by the adapters

mod traits;

pub(crate) mod json;
pub mod moex;
pub mod tbank;

pub use traits::MarketDataProvider;
