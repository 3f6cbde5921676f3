//! Geodata API gateway library.
//!
//! Proxies requests to backend geodata services and rewrites eligible
//! response bodies (plain text, JSON, XML/GML) on the way back to the client.

pub mod config;
pub mod filter;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod rewrite;
pub mod routing;
pub mod transform;

pub use config::schema::GatewayConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
