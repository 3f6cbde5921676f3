//! Request handling and transformation.
//!
//! # Responsibilities
//! - Generate unique request ID (UUID v4)
//! - Prepare the client request for forwarding to the upstream
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - The request body is streamed upstream, never buffered
//! - Host is rewritten to the upstream authority; the original goes in
//!   `x-forwarded-host`

use std::net::SocketAddr;

use axum::body::Body;
use axum::http::{header, HeaderName, HeaderValue, Request};
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

use crate::http::response::strip_hop_by_hop;
use crate::routing::{Route, RouteError};

pub const X_REQUEST_ID: &str = "x-request-id";

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");

/// Issues a fresh UUID v4 for requests arriving without `x-request-id`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeRequestUuid;

impl MakeRequestId for MakeRequestUuid {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// The request ID set by the request-id layer, or `-`.
pub fn request_id<B>(request: &Request<B>) -> &str {
    request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
}

/// Turn the client request into the upstream request for `route`.
pub fn forward_request(
    request: Request<Body>,
    route: &Route,
    client: Option<SocketAddr>,
) -> Result<Request<Body>, RouteError> {
    let (mut parts, body) = request.into_parts();
    parts.uri = route.upstream_uri(&parts.uri)?;

    let original_host = parts.headers.remove(header::HOST);
    strip_hop_by_hop(&mut parts.headers);

    let authority = HeaderValue::from_str(&route.upstream_authority())
        .map_err(|_| RouteError::MissingHost {
            route: route.name.clone(),
        })?;
    parts.headers.insert(header::HOST, authority);
    if let Some(host) = original_host {
        parts.headers.insert(X_FORWARDED_HOST, host);
    }
    if let Some(addr) = client {
        append_forwarded_for(&mut parts.headers, addr);
    }

    Ok(Request::from_parts(parts, body))
}

fn append_forwarded_for(headers: &mut header::HeaderMap, addr: SocketAddr) {
    let ip = addr.ip().to_string();
    let value = match headers.get(&X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        Some(existing) => format!("{existing}, {ip}"),
        None => ip,
    };
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(X_FORWARDED_FOR, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{GatewayConfig, RouteConfig};
    use crate::routing::Router;

    fn router() -> Router {
        let mut config = GatewayConfig::default();
        config.routes.push(RouteConfig {
            name: "wms".into(),
            host: None,
            path_prefix: Some("/wms".into()),
            upstream: "http://geo.internal:8080/geoserver".into(),
            strip_prefix: true,
            priority: 0,
            filters: vec![],
        });
        Router::from_config(&config).unwrap()
    }

    #[test]
    fn test_make_request_uuid() {
        let req = Request::new(());
        let id = MakeRequestUuid.make_request_id(&req).unwrap();
        let text = id.header_value().to_str().unwrap();
        assert!(Uuid::parse_str(text).is_ok());
    }

    #[test]
    fn test_forward_request_rewrites_target() {
        let router = router();
        let request = Request::builder()
            .uri("/wms/ows?service=WMS")
            .header(header::HOST, "maps.example.org")
            .header(header::CONNECTION, "keep-alive, x-secret")
            .header("x-secret", "1")
            .header("x-forwarded-for", "10.1.1.1")
            .header(X_REQUEST_ID, "abc")
            .body(Body::empty())
            .unwrap();
        let route = router.match_request(&request).unwrap();
        let client: SocketAddr = "192.0.2.7:5000".parse().unwrap();
        let out = forward_request(request, route, Some(client)).unwrap();

        assert_eq!(
            out.uri().to_string(),
            "http://geo.internal:8080/geoserver/ows?service=WMS"
        );
        assert_eq!(out.headers()[header::HOST], "geo.internal:8080");
        assert_eq!(out.headers()["x-forwarded-host"], "maps.example.org");
        assert_eq!(out.headers()["x-forwarded-for"], "10.1.1.1, 192.0.2.7");
        assert_eq!(out.headers()[X_REQUEST_ID], "abc");
        assert!(out.headers().get(header::CONNECTION).is_none());
        assert!(out.headers().get("x-secret").is_none());
    }
}
