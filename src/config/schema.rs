//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::filter::REWRITE_RESPONSE_FILTER_ORDER;

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Response body rewrite limits.
    pub rewrite: RewriteConfig,

    /// Internal → public host table used by the host rewrite filters.
    pub hosts: Vec<HostMapping>,

    /// Route definitions mapping requests to upstreams.
    pub routes: Vec<RouteConfig>,

    /// Observability settings.
    pub observability: ObservabilityConfig,
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

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Upstream connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Request timeout (total time for request/response, rewrite included) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 30,
        }
    }
}

/// Body rewrite limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RewriteConfig {
    /// Wall-clock budget for parsing one XML document, in milliseconds.
    pub parse_timeout_ms: u64,

    /// Largest body (wire and decoded) that will be buffered for rewriting.
    pub max_body_bytes: usize,

    /// Dump rejected upstream bodies at debug level. May leak upstream data.
    pub log_upstream_bodies: bool,
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            parse_timeout_ms: 2_000,
            max_body_bytes: 16 * 1024 * 1024, // 16MB
            log_upstream_bodies: false,
        }
    }
}

/// One host substitution.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct HostMapping {
    /// Host string as the upstream writes it.
    pub from: String,

    /// Host string the client should see.
    pub to: String,
}

/// Route configuration mapping requests to an upstream.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Route identifier for logging/metrics.
    pub name: String,

    /// Host header to match (exact match).
    pub host: Option<String>,

    /// Path prefix to match.
    pub path_prefix: Option<String>,

    /// Upstream base URL (e.g., "http://10.0.0.5:8080/geoserver").
    pub upstream: String,

    /// Remove the matched path prefix before forwarding.
    #[serde(default)]
    pub strip_prefix: bool,

    /// Route priority (higher = checked first).
    #[serde(default)]
    pub priority: u32,

    /// Response rewrite filters enabled on this route.
    #[serde(default)]
    pub filters: Vec<FilterConfig>,
}

/// A response rewrite filter on a route.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FilterConfig {
    /// Regex replace over text, JSON and XML bodies.
    StringReplace {
        pattern: String,
        replacement: String,
        order: Option<i32>,
    },
    /// Host table over JSON keys and string values.
    JsonHostRewrite { order: Option<i32> },
    /// Host table over XML attribute values and text.
    XmlHostRewrite { order: Option<i32> },
}

impl FilterConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::StringReplace { .. } => "string_replace",
            Self::JsonHostRewrite { .. } => "json_host_rewrite",
            Self::XmlHostRewrite { .. } => "xml_host_rewrite",
        }
    }

    /// Chain order, defaulting to just before the response write.
    pub fn order(&self) -> i32 {
        let order = match self {
            Self::StringReplace { order, .. }
            | Self::JsonHostRewrite { order }
            | Self::XmlHostRewrite { order } => *order,
        };
        order.unwrap_or(REWRITE_RESPONSE_FILTER_ORDER)
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
