//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware)
//!     → request.rs (request ID, upstream request)
//!     → routing → filter chain pre phase
//!     → upstream via hyper-util client
//!     → response.rs (hop-by-hop stripping)
//!     → filter chain write (body rewrite)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{MakeRequestUuid, X_REQUEST_ID};
pub use server::HttpServer;
