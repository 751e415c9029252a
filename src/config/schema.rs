//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::dispatch::error::DEFAULT_REALM;
use crate::protocol::Service;

/// Root configuration for the OWS gateway.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Request size limits.
    pub limits: LimitsConfig,

    /// Feature count defaults for WFS.
    pub features: FeaturesConfig,

    /// Text encoding of string bodies. Only `utf-8` is supported.
    pub encoding: String,

    /// Authorization settings.
    pub auth: AuthConfig,

    /// Endpoint name → allowed. Absent means every endpoint is accepted.
    pub endpoints: Option<BTreeMap<String, bool>>,

    /// Per-service settings.
    pub services: ServicesConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listener: ListenerConfig::default(),
            timeouts: TimeoutConfig::default(),
            limits: LimitsConfig::default(),
            features: FeaturesConfig::default(),
            encoding: "utf-8".to_string(),
            auth: AuthConfig::default(),
            endpoints: None,
            services: ServicesConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum POST body size in bytes, before and after content decoding.
    pub max_body_size: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_size: 2 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FeaturesConfig {
    /// Features returned when `maxFeatures` is not given.
    pub default_features: u32,

    /// Upper bound applied to `maxFeatures`.
    pub max_features: u32,
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            default_features: 1000,
            max_features: 10_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Bearer token required for non-capabilities requests.
    pub api_key: Option<String>,

    /// Realm sent in the `WWW-Authenticate` challenge.
    pub realm: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            realm: DEFAULT_REALM.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ServicesConfig {
    pub wfs: ServiceConfig,
    pub wms: ServiceConfig,
    pub wmts: ServiceConfig,
}

impl ServicesConfig {
    pub fn get(&self, service: Service) -> &ServiceConfig {
        match service {
            Service::Wfs => &self.wfs,
            Service::Wms => &self.wms,
            Service::Wmts => &self.wmts,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Capabilities document served for `GetCapabilities`.
    pub capabilities: Option<PathBuf>,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
