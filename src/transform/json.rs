//! JSON host rewrite.
//!
//! Walks the parsed tree and runs every object key and every string value
//! through the host table. Numbers, booleans, nulls and the tree shape are
//! left alone. When nothing changes the original text is returned as-is.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde_json::{Map, Value};

use crate::rewrite::{ContentTypeClass, RewriteContext, RewriteError};
use crate::transform::{ensure_live, run_blocking, HostReplacer, Transformer};

#[derive(Debug, Clone)]
pub struct JsonHostRewrite {
    hosts: Arc<HostReplacer>,
}

impl JsonHostRewrite {
    pub fn new(hosts: Arc<HostReplacer>) -> Self {
        Self { hosts }
    }

    pub fn rewrite(&self, body: String) -> Result<String, RewriteError> {
        self.rewrite_until(body, &AtomicBool::new(false))
    }

    /// Same as [`rewrite`](Self::rewrite), giving up once `cancelled` is raised.
    pub fn rewrite_until(
        &self,
        body: String,
        cancelled: &AtomicBool,
    ) -> Result<String, RewriteError> {
        if body.trim().is_empty() {
            return Ok(body);
        }
        let mut value: Value =
            serde_json::from_str(&body).map_err(|e| RewriteError::parse("json", e))?;
        if !rewrite_value(&mut value, &self.hosts, cancelled)? {
            return Ok(body);
        }
        ensure_live(cancelled)?;
        serde_json::to_string(&value).map_err(|e| RewriteError::serialization("json", e))
    }
}

fn rewrite_value(
    value: &mut Value,
    hosts: &HostReplacer,
    cancelled: &AtomicBool,
) -> Result<bool, RewriteError> {
    let changed = match value {
        Value::String(s) => rewrite_string(s, hosts),
        Value::Array(items) => {
            let mut changed = false;
            for item in items.iter_mut() {
                ensure_live(cancelled)?;
                changed |= rewrite_value(item, hosts, cancelled)?;
            }
            changed
        }
        Value::Object(map) => {
            let mut changed = false;
            let entries = std::mem::take(map);
            let mut rewritten = Map::with_capacity(entries.len());
            for (mut key, mut item) in entries {
                ensure_live(cancelled)?;
                changed |= rewrite_string(&mut key, hosts);
                changed |= rewrite_value(&mut item, hosts, cancelled)?;
                rewritten.insert(key, item);
            }
            *map = rewritten;
            changed
        }
        Value::Null | Value::Bool(_) | Value::Number(_) => false,
    };
    Ok(changed)
}

fn rewrite_string(s: &mut String, hosts: &HostReplacer) -> bool {
    if s.trim().is_empty() {
        return false;
    }
    hosts.replace_in_place(s)
}

impl Transformer for JsonHostRewrite {
    fn name(&self) -> &'static str {
        "json_host_rewrite"
    }

    fn applies_to(&self, class: ContentTypeClass) -> bool {
        class == ContentTypeClass::Json
    }

    fn transform<'a>(
        &'a self,
        body: String,
        _ctx: &'a RewriteContext,
    ) -> BoxFuture<'a, Result<String, RewriteError>> {
        let this = self.clone();
        Box::pin(run_blocking(move |cancelled| this.rewrite_until(body, cancelled)))
    }
}
