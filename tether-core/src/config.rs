//! Runtime configuration.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Tunables for a [`Runtime`](crate::Runtime).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Flushes `settle` runs before giving up.
    pub max_settle_passes: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_settle_passes: 16,
        }
    }
}

impl RuntimeConfig {
    /// Parse from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn missing_fields_default() {
        let config = RuntimeConfig::from_json("{}").unwrap();
        assert_eq!(config, RuntimeConfig::default());
        assert_eq!(config.max_settle_passes, 16);
    }

    #[test]
    fn parses_overrides() {
        let config = RuntimeConfig::from_json(r#"{"max_settle_passes": 3}"#).unwrap();
        assert_eq!(config.max_settle_passes, 3);
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(matches!(
            RuntimeConfig::from_json("{\"max_settle_passes\": -1}"),
            Err(Error::Config(_))
        ));
    }
}
