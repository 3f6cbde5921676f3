//! Ordered filter chain and the response write filter.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Response};

use crate::filter::{Exchange, GatewayFilter, WRITE_RESPONSE_FILTER_ORDER};

/// Commits the response. Its pre phase fixes which decorators apply.
#[derive(Debug, Default, Clone, Copy)]
pub struct WriteResponseFilter;

impl GatewayFilter for WriteResponseFilter {
    fn name(&self) -> &str {
        "write_response"
    }

    fn order(&self) -> i32 {
        WRITE_RESPONSE_FILTER_ORDER
    }

    fn pre(&self, exchange: &mut Exchange) {
        exchange.capture_writer();
    }
}

impl WriteResponseFilter {
    /// Run the captured decorators in installation order.
    pub async fn write(&self, exchange: &Exchange, mut response: Response<Body>) -> Response<Body> {
        if exchange.method == Method::HEAD {
            return response;
        }
        for decorator in exchange.active_decorators() {
            response = decorator.decorate(response).await;
        }
        response
    }
}

/// Filters of one route, sorted by order. Always contains the write filter.
#[derive(Debug, Clone)]
pub struct FilterChain {
    filters: Vec<Arc<dyn GatewayFilter>>,
    writer: WriteResponseFilter,
}

impl FilterChain {
    pub fn new(mut filters: Vec<Arc<dyn GatewayFilter>>) -> Self {
        let writer = WriteResponseFilter;
        // Stable sort: the writer precedes filters of equal order, and
        // filters of equal order keep their configuration order.
        filters.insert(0, Arc::new(writer));
        filters.sort_by_key(|f| f.order());
        Self { filters, writer }
    }

    pub fn filters(&self) -> &[Arc<dyn GatewayFilter>] {
        &self.filters
    }

    /// Pre phase, ascending order.
    pub fn pre(&self, exchange: &mut Exchange) {
        for filter in &self.filters {
            tracing::trace!(filter = filter.name(), order = filter.order(), "pre");
            filter.pre(exchange);
        }
    }

    /// Post phase: hand the upstream response through the response writer.
    pub async fn write(&self, exchange: &Exchange, response: Response<Body>) -> Response<Body> {
        self.writer.write(exchange, response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{ResponseDecorator, REWRITE_RESPONSE_FILTER_ORDER};
    use axum::http::HeaderValue;
    use futures_util::future::BoxFuture;

    /// Appends its tag to the `x-trail` header.
    #[derive(Debug)]
    struct Tag(&'static str, i32);

    impl ResponseDecorator for Tag {
        fn name(&self) -> &str {
            self.0
        }

        fn decorate(&self, mut response: Response<Body>) -> BoxFuture<'_, Response<Body>> {
            Box::pin(async move {
                let trail = response
                    .headers()
                    .get("x-trail")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                let value = HeaderValue::from_str(&format!("{trail}{}", self.0)).unwrap();
                response.headers_mut().insert("x-trail", value);
                response
            })
        }
    }

    #[derive(Debug)]
    struct TagFilter(Arc<Tag>);

    impl GatewayFilter for TagFilter {
        fn name(&self) -> &str {
            self.0 .0
        }

        fn order(&self) -> i32 {
            self.0 .1
        }

        fn pre(&self, exchange: &mut Exchange) {
            exchange.decorate_response(self.0.clone());
        }
    }

    fn tag(name: &'static str, order: i32) -> Arc<dyn GatewayFilter> {
        Arc::new(TagFilter(Arc::new(Tag(name, order))))
    }

    async fn run(chain: &FilterChain, method: Method) -> Option<String> {
        let mut exchange = Exchange::new(method, "test");
        chain.pre(&mut exchange);
        let response = chain.write(&exchange, Response::new(Body::empty())).await;
        response
            .headers()
            .get("x-trail")
            .map(|v| v.to_str().unwrap().to_string())
    }

    #[test]
    fn test_chain_sorted_with_writer() {
        let chain = FilterChain::new(vec![tag("late", 5), tag("early", -10)]);
        let orders: Vec<i32> = chain.filters().iter().map(|f| f.order()).collect();
        assert_eq!(orders, vec![-10, WRITE_RESPONSE_FILTER_ORDER, 5]);
    }

    #[tokio::test]
    async fn test_decorators_before_writer_apply_in_order() {
        let chain = FilterChain::new(vec![
            tag("b", REWRITE_RESPONSE_FILTER_ORDER),
            tag("a", -5),
        ]);
        assert_eq!(run(&chain, Method::GET).await.as_deref(), Some("ab"));
    }

    #[tokio::test]
    async fn test_decorator_after_writer_never_runs() {
        let chain = FilterChain::new(vec![tag("late", WRITE_RESPONSE_FILTER_ORDER + 1)]);
        assert_eq!(run(&chain, Method::GET).await, None);
    }

    #[tokio::test]
    async fn test_equal_order_to_writer_is_too_late() {
        let chain = FilterChain::new(vec![tag("same", WRITE_RESPONSE_FILTER_ORDER)]);
        assert_eq!(chain.filters()[0].name(), "write_response");
        assert_eq!(run(&chain, Method::GET).await, None);
    }

    #[tokio::test]
    async fn test_head_skips_decorators() {
        let chain = FilterChain::new(vec![tag("a", REWRITE_RESPONSE_FILTER_ORDER)]);
        assert_eq!(run(&chain, Method::HEAD).await, None);
    }
}
