//! Resolver configuration
//!
//! Plain data that can come from a config file. Every field has a default, so
//! `{}` is a valid configuration:
//!
//! ```rust
//! use prow_server::ResolverConfig;
//!
//! let config = ResolverConfig::from_json(r#"{"batching": {"enabled": false}}"#).unwrap();
//! assert!(!config.batching.enabled);
//! assert!(!config.metrics);
//!
//! assert!(ResolverConfig::from_json("{}").unwrap().batching.enabled);
//! ```

use prow_core::{Error, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResolverConfig {
    pub batching: BatchingConfig,
    /// Record `ResolverMetrics` on the global meter provider
    pub metrics: bool,
    /// Instrumentation scope for metrics
    pub service_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BatchingConfig {
    /// Accept envelopes with `isBatchCall: true`
    pub enabled: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            batching: BatchingConfig::default(),
            metrics: false,
            service_name: "prow".to_string(),
        }
    }
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl ResolverConfig {
    /// Parse a JSON configuration document
    ///
    /// # Errors
    ///
    /// `Error::Parse` for malformed JSON or fields of the wrong type.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::Parse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ResolverConfig::default();
        assert!(config.batching.enabled);
        assert!(!config.metrics);
        assert_eq!(config.service_name, "prow");
    }

    #[test]
    fn test_from_json_camel_case() {
        let config = ResolverConfig::from_json(
            r#"{"batching": {"enabled": false}, "metrics": true, "serviceName": "issues"}"#,
        )
        .unwrap();

        assert!(!config.batching.enabled);
        assert!(config.metrics);
        assert_eq!(config.service_name, "issues");
    }

    #[test]
    fn test_from_json_rejects_wrong_types() {
        let error = ResolverConfig::from_json(r#"{"batching": {"enabled": "yes"}}"#).unwrap_err();
        assert!(matches!(error, Error::Parse(_)));
    }
}
