use serde::{Deserialize, Serialize};

use super::SecurityType;

/// A provider's answer to "what is this query?".
///
/// `native_id` is whatever the provider needs to fetch the snapshot
/// (a FIGI for T-Bank, a SECID for MOEX ISS).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedSecurity {
    pub native_id: String,
    pub security_type: SecurityType,
    pub ticker: Option<String>,
    pub isin: Option<String>,
    pub name: Option<String>,
}

impl ResolvedSecurity {
    pub fn new(native_id: impl Into<String>, security_type: SecurityType) -> Self {
        Self {
            native_id: native_id.into(),
            security_type,
            ticker: None,
            isin: None,
            name: None,
        }
    }
}
