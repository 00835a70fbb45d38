//! Process configuration: provider settings plus catalog and matching knobs.

use std::path::PathBuf;

use radar_market_data::config::Settings;
use radar_market_data::{ConfigError, MarketDataConfig};

use crate::reference::DEFAULT_FUZZY_THRESHOLD;

/// Similarity required when the catalog is the last resort for a position
/// no provider could resolve.
pub const DEFAULT_FALLBACK_FUZZY_THRESHOLD: f64 = 0.75;

#[derive(Clone, Debug)]
pub struct RadarConfig {
    pub market_data: MarketDataConfig,
    /// Merged catalog dump, or a directory of dumps.
    pub reference_path: Option<PathBuf>,
    pub fuzzy_threshold: f64,
    pub fallback_fuzzy_threshold: f64,
}

impl Default for RadarConfig {
    fn default() -> Self {
        Self {
            market_data: MarketDataConfig::default(),
            reference_path: None,
            fuzzy_threshold: DEFAULT_FUZZY_THRESHOLD,
            fallback_fuzzy_threshold: DEFAULT_FALLBACK_FUZZY_THRESHOLD,
        }
    }
}

impl RadarConfig {
    /// Reads `.env` (if present) and the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_settings(&Settings::new(|key| std::env::var(key).ok()))
    }

    pub fn from_settings<F>(settings: &Settings<F>) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Self {
            market_data: MarketDataConfig::from_settings(settings)?,
            reference_path: settings.string("BOND_REFERENCE_PATH").map(PathBuf::from),
            fuzzy_threshold: settings.parsed("FUZZY_THRESHOLD", DEFAULT_FUZZY_THRESHOLD)?,
            fallback_fuzzy_threshold: settings
                .parsed("FALLBACK_FUZZY_THRESHOLD", DEFAULT_FALLBACK_FUZZY_THRESHOLD)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Thresholds must lie in (0, 1].
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (key, value) in [
            ("FUZZY_THRESHOLD", self.fuzzy_threshold),
            ("FALLBACK_FUZZY_THRESHOLD", self.fallback_fuzzy_threshold),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(ConfigError::Invalid {
                    key: key.to_string(),
                    value: value.to_string(),
                });
            }
        }
        self.market_data.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(pairs: &[(&str, &str)]) -> Settings<impl Fn(&str) -> Option<String>> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::new(move |key: &str| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = RadarConfig::from_settings(&settings(&[("FEATURE_TBANK", "false")])).unwrap();
        assert_eq!(config.reference_path, None);
        assert_eq!(config.fuzzy_threshold, 0.82);
        assert_eq!(config.fallback_fuzzy_threshold, 0.75);
        assert_eq!(config.market_data.calendar_horizon_days, 365);
    }

    #[test]
    fn test_reads_catalog_path_and_thresholds() {
        let config = RadarConfig::from_settings(&settings(&[
            ("FEATURE_TBANK", "false"),
            ("BOND_REFERENCE_PATH", "data/bonds_reference.json"),
            ("FUZZY_THRESHOLD", "0.9"),
            ("FALLBACK_FUZZY_THRESHOLD", "1"),
        ]))
        .unwrap();
        assert_eq!(
            config.reference_path,
            Some(PathBuf::from("data/bonds_reference.json"))
        );
        assert_eq!(config.fuzzy_threshold, 0.9);
        assert_eq!(config.fallback_fuzzy_threshold, 1.0);
    }

    #[test]
    fn test_rejects_thresholds_out_of_range() {
        for bad in ["0", "-0.5", "1.01", "NaN"] {
            let err = RadarConfig::from_settings(&settings(&[
                ("FEATURE_TBANK", "false"),
                ("FUZZY_THRESHOLD", bad),
            ]))
            .unwrap_err();
            assert!(
                matches!(err, ConfigError::Invalid { ref key, .. } if key == "FUZZY_THRESHOLD"),
                "value {bad}"
            );
        }
        let err = RadarConfig::from_settings(&settings(&[
            ("FEATURE_TBANK", "false"),
            ("FALLBACK_FUZZY_THRESHOLD", "abc"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref key, .. } if key == "FALLBACK_FUZZY_THRESHOLD"));
    }

    #[test]
    fn test_provider_errors_surface() {
        let err = RadarConfig::from_settings(&settings(&[])).unwrap_err();
        assert_eq!(err, ConfigError::Missing("TIN_TOKEN".to_string()));
    }
}
