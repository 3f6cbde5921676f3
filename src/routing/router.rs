//! Route lookup and upstream addressing.
//!
//! # Responsibilities
//! - Compile route configs into matchers and filter chains
//! - Look up the matching route for a request
//! - Build the upstream URI for a matched request
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(n) scan in priority order; first match wins
//! - Explicit no-match rather than silent default

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, Uri};
use thiserror::Error;
use url::Url;

use crate::config::schema::{GatewayConfig, RouteConfig};
use crate::filter::{FilterChain, GatewayFilter, RewriteResponseFilter};
use crate::rewrite::{ResponseRewriteDecorator, RewriteSettings};
use crate::routing::matcher::{AndMatcher, HostMatcher, Matcher, PathPrefixMatcher};
use crate::transform::{self, HostReplacer};

/// Error compiling routes or addressing an upstream.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("route '{route}': invalid upstream URL: {source}")]
    InvalidUpstream {
        route: String,
        #[source]
        source: url::ParseError,
    },

    #[error("route '{route}': upstream has no host")]
    MissingHost { route: String },

    #[error("route '{route}': invalid filter pattern: {source}")]
    InvalidPattern {
        route: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid upstream URI: {0}")]
    InvalidUri(#[from] axum::http::uri::InvalidUri),
}

/// A compiled route.
#[derive(Debug)]
pub struct Route {
    pub name: String,
    pub upstream: Url,
    pub chain: FilterChain,
    matcher: AndMatcher,
    path_prefix: Option<String>,
    strip_prefix: bool,
    priority: u32,
}

impl Route {
    fn compile(
        config: &RouteConfig,
        hosts: &Arc<HostReplacer>,
        settings: RewriteSettings,
    ) -> Result<Self, RouteError> {
        let upstream = Url::parse(&config.upstream).map_err(|source| RouteError::InvalidUpstream {
            route: config.name.clone(),
            source,
        })?;
        if upstream.host_str().is_none() {
            return Err(RouteError::MissingHost {
                route: config.name.clone(),
            });
        }

        let mut matchers: Vec<Box<dyn Matcher>> = Vec::new();
        if let Some(host) = &config.host {
            matchers.push(Box::new(HostMatcher::new(host)));
        }
        if let Some(prefix) = &config.path_prefix {
            matchers.push(Box::new(PathPrefixMatcher::new(prefix)));
        }

        let mut filters: Vec<Arc<dyn GatewayFilter>> = Vec::with_capacity(config.filters.len());
        for filter in &config.filters {
            let transformer =
                transform::build(filter, hosts).map_err(|source| RouteError::InvalidPattern {
                    route: config.name.clone(),
                    source,
                })?;
            let decorator = ResponseRewriteDecorator::new(transformer, settings);
            filters.push(Arc::new(RewriteResponseFilter::with_order(
                decorator,
                filter.order(),
            )));
        }

        Ok(Self {
            name: config.name.clone(),
            upstream,
            chain: FilterChain::new(filters),
            matcher: AndMatcher::new(matchers),
            path_prefix: config.path_prefix.clone(),
            strip_prefix: config.strip_prefix,
            priority: config.priority,
        })
    }

    pub fn matches(&self, req: &Request<Body>) -> bool {
        self.matcher.matches(req)
    }

    /// `host[:port]` of the upstream, for the forwarded Host header.
    pub fn upstream_authority(&self) -> String {
        let host = self.upstream.host_str().unwrap_or_default();
        match self.upstream.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        }
    }

    /// Map a client request URI onto the upstream base URL.
    ///
    /// `/wms/ows?x=1` on a route with prefix `/wms`, `strip_prefix` and
    /// upstream `http://geo:8080/geoserver` becomes
    /// `http://geo:8080/geoserver/ows?x=1`.
    pub fn upstream_uri(&self, uri: &Uri) -> Result<Uri, RouteError> {
        let mut path = uri.path();
        if self.strip_prefix {
            if let Some(prefix) = &self.path_prefix {
                path = path.strip_prefix(prefix.as_str()).unwrap_or(path);
            }
        }
        let base = self.upstream.path().trim_end_matches('/');
        let path = match (base.is_empty(), path.is_empty()) {
            (true, true) => "/".to_string(),
            (false, true) => base.to_string(),
            _ if path.starts_with('/') => format!("{base}{path}"),
            _ => format!("{base}/{path}"),
        };
        let query = uri.query().map(|q| format!("?{q}")).unwrap_or_default();
        let target = format!(
            "{}://{}{}{}",
            self.upstream.scheme(),
            self.upstream_authority(),
            path,
            query
        );
        Ok(target.parse()?)
    }
}

/// All routes of the gateway, highest priority first.
#[derive(Debug)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn from_config(config: &GatewayConfig) -> Result<Self, RouteError> {
        let hosts = Arc::new(HostReplacer::from_config(&config.hosts));
        let settings = RewriteSettings::from(&config.rewrite);

        let mut routes = config
            .routes
            .iter()
            .map(|route| Route::compile(route, &hosts, settings))
            .collect::<Result<Vec<_>, _>>()?;
        // Stable: equal priorities keep configuration order.
        routes.sort_by(|a, b| b.priority.cmp(&a.priority));

        for route in &routes {
            tracing::debug!(
                route = %route.name,
                upstream = %route.upstream,
                filters = route.chain.filters().len() - 1,
                "Route compiled"
            );
        }
        Ok(Self { routes })
    }

    pub fn match_request(&self, req: &Request<Body>) -> Option<&Route> {
        self.routes.iter().find(|route| route.matches(req))
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }
}
