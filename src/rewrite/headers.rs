//! Header adjustment for rewritten responses.

use std::convert::Infallible;

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue};
use bytes::Bytes;

/// Prepare headers for a body whose length is no longer the upstream's.
///
/// The rewritten body goes out uncompressed and chunked.
pub fn prepare_rewritten(headers: &mut HeaderMap) {
    headers.remove(header::CONTENT_LENGTH);
    headers.remove(header::CONTENT_ENCODING);
    // Validators describe the upstream representation, not ours.
    headers.remove(header::ETAG);
    headers.remove("content-md5");
    headers.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
}

/// Body without a size hint, so the server frames it as chunked.
pub fn streamed(bytes: Bytes) -> Body {
    Body::from_stream(futures_util::stream::once(async move {
        Ok::<_, Infallible>(bytes)
    }))
}
