//! Per-response rewrite context.

use std::time::Duration;

use crate::config::schema::RewriteConfig;
use crate::rewrite::gate::{Charset, ContentEncoding, ContentTypeClass, Eligibility};

/// Read-only limits shared by every rewrite on a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RewriteSettings {
    pub parse_timeout: Duration,
    pub max_body_bytes: usize,
    pub log_upstream_bodies: bool,
}

impl Default for RewriteSettings {
    fn default() -> Self {
        Self::from(&RewriteConfig::default())
    }
}

impl From<&RewriteConfig> for RewriteSettings {
    fn from(config: &RewriteConfig) -> Self {
        Self {
            parse_timeout: Duration::from_millis(config.parse_timeout_ms),
            max_body_bytes: config.max_body_bytes,
            log_upstream_bodies: config.log_upstream_bodies,
        }
    }
}

/// Everything a transformer may know about the response it rewrites.
/// Built once per response and passed explicitly into each call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteContext {
    pub media_type: String,
    pub class: ContentTypeClass,
    pub charset: Charset,
    pub encoding: ContentEncoding,
    pub parse_timeout: Duration,
    pub log_upstream_bodies: bool,
}

impl RewriteContext {
    /// The charset is finalised later by the assembler, once the body is known.
    pub fn new(verdict: &Eligibility, settings: &RewriteSettings) -> Self {
        Self {
            media_type: verdict.media_type.clone(),
            class: verdict.class,
            charset: verdict.charset.unwrap_or(Charset::Utf8),
            encoding: verdict.encoding.clone(),
            parse_timeout: settings.parse_timeout,
            log_upstream_bodies: settings.log_upstream_bodies,
        }
    }
}
