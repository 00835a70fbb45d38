use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Provider identifier - mostly static constants
pub type ProviderId = Cow<'static, str>;

/// Coarse classification of a listed security.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityType {
    Share,
    Bond,
    Fund,
}

impl SecurityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Share => "share",
            Self::Bond => "bond",
            Self::Fund => "fund",
        }
    }
}

impl fmt::Display for SecurityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SecurityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "share" => Ok(Self::Share),
            "bond" => Ok(Self::Bond),
            "fund" => Ok(Self::Fund),
            other => Err(format!("unknown security type: {other}")),
        }
    }
}

/// Whether snapshot prices come from an open session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Freshness {
    Live,
    LastClose,
}
