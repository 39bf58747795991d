//! Runtime configuration.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default number of flush passes before a flush gives up.
pub const DEFAULT_MAX_FLUSH_PASSES: usize = 100;

/// Tunables for a [`Runtime`](crate::reactive::Runtime).
///
/// Every field has a default, so a partial (or empty) document is valid:
///
/// ```
/// use lattice_reactive::config::RuntimeConfig;
///
/// let config = RuntimeConfig::from_json_str(r#"{ "max_flush_passes": 8 }"#).unwrap();
/// assert_eq!(config.max_flush_passes, 8);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// How many passes a single flush may take. A pass drains everything
    /// that was queued when it started; effects queued while it runs go to
    /// the next pass. Effects that keep waking each other up would otherwise
    /// loop forever.
    pub max_flush_passes: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_flush_passes: DEFAULT_MAX_FLUSH_PASSES,
        }
    }
}

impl RuntimeConfig {
    /// Parse a config from JSON.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: RuntimeConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check field values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_flush_passes == 0 {
            return Err(ConfigError::Invalid {
                field: "max_flush_passes",
                reason: "must be at least 1",
            });
        }
        Ok(())
    }

    /// Builder-style setter for [`max_flush_passes`](Self::max_flush_passes).
    pub fn with_max_flush_passes(mut self, passes: usize) -> Self {
        self.max_flush_passes = passes;
        self
    }
}
