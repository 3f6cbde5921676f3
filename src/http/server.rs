//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the proxy handler
//! - Wire up middleware (timeout, tracing, request ID)
//! - Dispatch requests to the routing engine
//! - Forward requests upstream and run the route's filter chain
//!   over the response
//! - Observability (metrics, correlation IDs)

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, Response, StatusCode},
    routing::any,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::GatewayConfig;
use crate::filter::Exchange;
use crate::http::request::{self, MakeRequestUuid};
use crate::http::response::{gateway_response, strip_hop_by_hop};
use crate::observability::metrics;
use crate::routing::{RouteError, Router};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<Router>,
    pub client: Client<HttpConnector, Body>,
}

/// HTTP server for the gateway.
pub struct HttpServer {
    app: axum::Router,
    config: GatewayConfig,
}

impl HttpServer {
    /// Compile routes and build the service stack.
    pub fn new(config: GatewayConfig) -> Result<Self, RouteError> {
        let router = Arc::new(Router::from_config(&config)?);

        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_secs(config.timeouts.connect_secs)));
        let client = Client::builder(TokioExecutor::new()).build(connector);

        let state = AppState { router, client };
        let app = Self::build_router(&config, state);
        Ok(Self { app, config })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &GatewayConfig, state: AppState) -> axum::Router {
        axum::Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http().make_span_with(|req: &Request<Body>| {
                tracing::info_span!(
                    "request",
                    request_id = %request::request_id(req),
                    method = %req.method(),
                    uri = %req.uri(),
                )
            }))
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// Run the server until `shutdown` fires, then drain in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            routes = self.config.routes.len(),
            "HTTP server starting"
        );

        let app = self.app.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }
}

/// Main proxy handler.
/// Looks up the route, runs its filter chain and forwards the request.
async fn proxy_handler(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response<Body> {
    let start_time = Instant::now();
    let method = request.method().clone();

    let Some(route) = state.router.match_request(&request) else {
        tracing::warn!(path = %request.uri().path(), "No route matched");
        metrics::record_request(method.as_str(), 404, "none", start_time);
        return gateway_response(StatusCode::NOT_FOUND, "No matching route found");
    };

    let mut exchange = Exchange::new(method.clone(), route.name.clone());
    route.chain.pre(&mut exchange);

    let outbound = match request::forward_request(request, route, Some(addr)) {
        Ok(req) => req,
        Err(e) => {
            tracing::error!(route = %route.name, error = %e, "Cannot address upstream");
            metrics::record_request(method.as_str(), 502, &route.name, start_time);
            return gateway_response(StatusCode::BAD_GATEWAY, "Upstream request failed");
        }
    };
    tracing::debug!(route = %route.name, upstream = %outbound.uri(), "Forwarding request");

    let response = match state.client.request(outbound).await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(route = %route.name, error = %e, "Upstream error");
            metrics::record_request(method.as_str(), 502, &route.name, start_time);
            return gateway_response(StatusCode::BAD_GATEWAY, "Upstream request failed");
        }
    };

    let (mut parts, body) = response.into_parts();
    strip_hop_by_hop(&mut parts.headers);
    let response = route
        .chain
        .write(&exchange, Response::from_parts(parts, Body::new(body)))
        .await;

    metrics::record_request(
        method.as_str(),
        response.status().as_u16(),
        &route.name,
        start_time,
    );
    response
}
