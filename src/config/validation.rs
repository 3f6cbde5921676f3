//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check upstream URLs and filter patterns compile
//! - Enforce the filter ordering invariant
//! - Validate value ranges (timeouts > 0, limits > 0)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;

use thiserror::Error;
use url::Url;

use crate::config::schema::{FilterConfig, GatewayConfig};
use crate::filter::WRITE_RESPONSE_FILTER_ORDER;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("duplicate route name '{0}'")]
    DuplicateRoute(String),

    #[error("route '{route}': invalid upstream '{upstream}': {reason}")]
    InvalidUpstream {
        route: String,
        upstream: String,
        reason: String,
    },

    #[error("route '{route}': invalid pattern '{pattern}': {reason}")]
    InvalidPattern {
        route: String,
        pattern: String,
        reason: String,
    },

    #[error(
        "route '{route}': filter '{filter}' has order {order}, must be below {} to run before the response write",
        WRITE_RESPONSE_FILTER_ORDER
    )]
    FilterAfterWrite {
        route: String,
        filter: &'static str,
        order: i32,
    },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("host mapping #{0} has an empty 'from'")]
    EmptyHostMapping(usize),
}

/// Check everything serde cannot.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.rewrite.parse_timeout_ms == 0 {
        errors.push(ValidationError::Zero("rewrite.parse_timeout_ms"));
    }
    if config.rewrite.max_body_bytes == 0 {
        errors.push(ValidationError::Zero("rewrite.max_body_bytes"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::Zero("timeouts.request_secs"));
    }

    for (i, mapping) in config.hosts.iter().enumerate() {
        if mapping.from.is_empty() {
            errors.push(ValidationError::EmptyHostMapping(i));
        }
    }

    let mut names = HashSet::new();
    for route in &config.routes {
        if !names.insert(route.name.as_str()) {
            errors.push(ValidationError::DuplicateRoute(route.name.clone()));
        }

        match Url::parse(&route.upstream) {
            Ok(url) if url.scheme() == "http" && url.host().is_some() => {}
            Ok(url) => errors.push(ValidationError::InvalidUpstream {
                route: route.name.clone(),
                upstream: route.upstream.clone(),
                reason: format!("unsupported scheme '{}' or missing host", url.scheme()),
            }),
            Err(e) => errors.push(ValidationError::InvalidUpstream {
                route: route.name.clone(),
                upstream: route.upstream.clone(),
                reason: e.to_string(),
            }),
        }

        for filter in &route.filters {
            if let FilterConfig::StringReplace { pattern, .. } = filter {
                if let Err(e) = regex::Regex::new(pattern) {
                    errors.push(ValidationError::InvalidPattern {
                        route: route.name.clone(),
                        pattern: pattern.clone(),
                        reason: e.to_string(),
                    });
                }
            }
            if filter.order() >= WRITE_RESPONSE_FILTER_ORDER {
                errors.push(ValidationError::FilterAfterWrite {
                    route: route.name.clone(),
                    filter: filter.kind(),
                    order: filter.order(),
                });
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
