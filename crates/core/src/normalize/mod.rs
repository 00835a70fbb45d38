//! Normalize module - pure text functions over noisy security references.

mod identifiers;
mod security_name;

pub use identifiers::{
    dedupe, extract_isin, extract_ticker, normalized_key, partition_duplicates,
};
pub use security_name::{
    is_security_name, normalize, normalize_security_type, normalize_series,
};
