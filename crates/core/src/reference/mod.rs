//! Reference module - static catalog of known securities.
//!
//! Live providers often cannot resolve free-text bond names at all. The
//! catalog is the last resort: exact lookups by ISIN, ticker or any
//! generated alias, then a fuzzy pass over the aliases.

mod reference_aliases;
mod reference_catalog;
mod reference_model;

pub use reference_catalog::{read_dump, CatalogMatch, ReferenceCatalog, DEFAULT_FUZZY_THRESHOLD};
pub use reference_model::{builtin_records, merge_records, ReferenceEntry, ReferenceRecord};
