//! Dispatcher configuration

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Operator-facing dispatcher configuration.
///
/// Missing fields take their defaults, so `{}` is a valid configuration.
///
/// # Example
/// ```
/// use flux_dispatch_core::DispatchConfig;
///
/// let config = DispatchConfig::from_json(r#"{ "outside_zone": false }"#).unwrap();
/// assert_eq!(config.outside_zone, Some(false));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Run dispatches outside the tracked domain on the client.
    ///
    /// `None` and `Some(true)` run outside, `Some(false)` runs inside.
    /// Ignored on the server, which always runs inside.
    pub outside_zone: Option<bool>,
}

impl DispatchConfig {
    /// Parse a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Set the outside-zone switch.
    pub fn with_outside_zone(mut self, outside_zone: Option<bool>) -> Self {
        self.outside_zone = outside_zone;
        self
    }
}
