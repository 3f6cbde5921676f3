//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → compiled into routes and filter chains at startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Rewrite limits are handed to each filter explicitly, never read globally

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    FilterConfig, GatewayConfig, HostMapping, ListenerConfig, LogFormat, ObservabilityConfig,
    RewriteConfig, RouteConfig, TimeoutConfig,
};
pub use validation::{validate_config, ValidationError};
