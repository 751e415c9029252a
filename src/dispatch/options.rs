//! Per-process dispatch options, fixed at construction.

use crate::config::GatewayConfig;
use crate::dispatch::error::DEFAULT_REALM;

/// Immutable settings shared by every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOptions {
    /// `maxFeatures` applied when a request gives none.
    pub default_features: u32,
    /// Upper bound for `maxFeatures`.
    pub max_features: u32,
    /// Limit on the decoded POST body.
    pub max_body_size: usize,
    /// Realm announced in `WWW-Authenticate`.
    pub realm: String,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            default_features: 1000,
            max_features: 10_000,
            max_body_size: 2 * 1024 * 1024,
            realm: DEFAULT_REALM.to_string(),
        }
    }
}

impl From<&GatewayConfig> for DispatchOptions {
    fn from(config: &GatewayConfig) -> Self {
        Self {
            default_features: config.features.default_features,
            max_features: config.features.max_features,
            max_body_size: config.limits.max_body_size,
            realm: config.auth.realm.clone(),
        }
    }
}
