//! Route filter installing the response rewrite decorator.

use std::sync::Arc;

use crate::filter::{Exchange, GatewayFilter, REWRITE_RESPONSE_FILTER_ORDER};
use crate::rewrite::ResponseRewriteDecorator;

#[derive(Debug, Clone)]
pub struct RewriteResponseFilter {
    order: i32,
    decorator: Arc<ResponseRewriteDecorator>,
}

impl RewriteResponseFilter {
    pub fn new(decorator: ResponseRewriteDecorator) -> Self {
        Self::with_order(decorator, REWRITE_RESPONSE_FILTER_ORDER)
    }

    pub fn with_order(decorator: ResponseRewriteDecorator, order: i32) -> Self {
        Self {
            order,
            decorator: Arc::new(decorator),
        }
    }
}

impl GatewayFilter for RewriteResponseFilter {
    fn name(&self) -> &str {
        self.decorator.transformer().name()
    }

    fn order(&self) -> i32 {
        self.order
    }

    fn pre(&self, exchange: &mut Exchange) {
        exchange.decorate_response(self.decorator.clone());
    }
}
