//! Response body rewriting pipeline.
//!
//! # Data Flow
//! ```text
//! upstream Response<Body>
//!     → gate.rs (Content-Type / Content-Encoding → eligibility, before any read)
//!         ineligible → forwarded untouched
//!     → assembler.rs (join chunks under a size bound, decompress, decode charset)
//!     → Transformer (string replace | JSON host rewrite | XML document rewrite)
//!     → assembler.rs (re-encode in source charset)
//!     → headers.rs (drop Content-Length / Content-Encoding, chunked transfer)
//!
//! any failure:
//!     → error.rs (RewriteError → ErrorKind → ErrorDetails → enveloped body)
//! ```
//!
//! # Design Decisions
//! - A response is forwarded byte-for-byte, fully replaced by the rewritten
//!   body, or fully replaced by an error body. Never a mix.
//! - Every failure is caught in the decorator; nothing escapes to transport.
//! - Rewritten bodies go out uncompressed, whatever the upstream encoding was.
//! - No retries: rewriting the same buffered body again yields the same result.

pub mod assembler;
pub mod context;
pub mod decorator;
pub mod error;
pub mod gate;
pub mod headers;

pub use context::{RewriteContext, RewriteSettings};
pub use decorator::ResponseRewriteDecorator;
pub use error::{ErrorDetails, ErrorKind, RewriteError};
pub use gate::{Charset, ContentEncoding, ContentTypeClass, Eligibility};

/// Result of a single body rewrite attempt.
pub type BodyRewriteOutcome = Result<bytes::Bytes, RewriteError>;
