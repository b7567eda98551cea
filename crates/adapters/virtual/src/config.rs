//! Virtual plugin configuration.

use serde::Deserialize;

/// Configuration for the virtual plugin.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct VirtualConfig {
    /// Whether the plugin publishes anything at all.
    pub enabled: bool,
    /// Suffix distinguishing several plugin instances in device addresses.
    pub instance: String,
    /// Scenes mapped onto remote keys, in key order.
    pub scenes: Vec<String>,
    /// Names of simulated dimmers.
    pub dimmers: Vec<String>,
    /// Names of simulated switches.
    pub switches: Vec<String>,
}

impl Default for VirtualConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            instance: "0".to_string(),
            scenes: Vec::new(),
            dimmers: Vec::new(),
            switches: Vec::new(),
        }
    }
}
