//! Gateway filter chain.
//!
//! # Data Flow
//! ```text
//! pre phase, ascending order:
//!     rewrite filters (order -2)  → install response decorators on the Exchange
//!     write filter    (order -1)  → captures the decorators installed so far
//!     filters with order >= -1    → anything they install is never seen
//! forward to upstream
//! post phase:
//!     write filter runs the captured decorators over the upstream response
//!     → response handed to the transport
//! ```
//!
//! # Design Decisions
//! - Lower order runs its pre logic earlier and its post logic later
//! - The write filter finalises the response; body edits must be installed
//!   before it, so rewrite filters sit strictly below `WRITE_RESPONSE_FILTER_ORDER`
//! - Orders are validated at config load; the chain still tolerates a bad
//!   order by ignoring the late decorator rather than corrupting the response

pub mod chain;
pub mod rewrite;

use std::fmt;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Response};
use futures_util::future::BoxFuture;

pub use chain::{FilterChain, WriteResponseFilter};
pub use rewrite::RewriteResponseFilter;

/// Order of the filter that commits the response to the transport.
pub const WRITE_RESPONSE_FILTER_ORDER: i32 = -1;

/// Default order of body rewrite filters: just before the write.
pub const REWRITE_RESPONSE_FILTER_ORDER: i32 = WRITE_RESPONSE_FILTER_ORDER - 1;

/// Wraps the upstream response on its way to the client.
pub trait ResponseDecorator: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn decorate(&self, response: Response<Body>) -> BoxFuture<'_, Response<Body>>;
}

/// A filter taking part in the pre phase of a route's chain.
pub trait GatewayFilter: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Position in the chain. Lower runs its pre phase earlier.
    fn order(&self) -> i32;

    /// Runs before the request is forwarded upstream.
    fn pre(&self, exchange: &mut Exchange);
}

/// Per-request state shared by the filters of one chain.
#[derive(Debug)]
pub struct Exchange {
    pub method: Method,
    pub route: String,
    decorators: Vec<Arc<dyn ResponseDecorator>>,
    /// Number of decorators the write filter captured, once it has run.
    captured: Option<usize>,
}

impl Exchange {
    pub fn new(method: Method, route: impl Into<String>) -> Self {
        Self {
            method,
            route: route.into(),
            decorators: Vec::new(),
            captured: None,
        }
    }

    /// Install a decorator for the response of this exchange.
    pub fn decorate_response(&mut self, decorator: Arc<dyn ResponseDecorator>) {
        if self.captured.is_some() {
            tracing::debug!(
                route = %self.route,
                decorator = decorator.name(),
                "Decorator installed after the response writer; it will not run"
            );
        }
        self.decorators.push(decorator);
    }

    fn capture_writer(&mut self) {
        self.captured = Some(self.decorators.len());
    }

    /// Decorators the response writer will apply.
    pub fn active_decorators(&self) -> &[Arc<dyn ResponseDecorator>] {
        let captured = self.captured.unwrap_or(0);
        &self.decorators[..captured]
    }
}
