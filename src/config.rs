//! Construction-time settings for a [`HandleStore`](crate::HandleStore).

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Upper bound on live entries used when nothing else is configured. Sized
/// to stay well below the JVM's global reference table limit.
pub const DEFAULT_CAPACITY: usize = 50_000;

/// Store settings. Fixed for the lifetime of a store instance.
///
/// Deserializes from partial documents; missing fields take their defaults:
///
/// ```
/// use handle_store::StoreConfig;
///
/// let cfg: StoreConfig = serde_json::from_str("{}").unwrap();
/// assert_eq!(cfg.capacity, handle_store::DEFAULT_CAPACITY);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Maximum number of entries the store will hold at once.
    pub capacity: usize,
}

impl StoreConfig {
    pub fn with_capacity(capacity: usize) -> Self {
        Self { capacity }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        Ok(())
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_capacity_is_fifty_thousand() {
        let cfg = StoreConfig::default();
        assert_eq!(cfg.capacity, 50_000);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert_eq!(
            StoreConfig::with_capacity(0).validate(),
            Err(ConfigError::ZeroCapacity)
        );
    }

    #[test]
    fn deserializes_with_defaults_and_overrides() {
        let cfg: StoreConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, StoreConfig::default());

        let cfg: StoreConfig = serde_json::from_str(r#"{"capacity": 2}"#).unwrap();
        assert_eq!(cfg.capacity, 2);

        let text = serde_json::to_string(&StoreConfig::with_capacity(7)).unwrap();
        assert_eq!(text, r#"{"capacity":7}"#);
    }
}
