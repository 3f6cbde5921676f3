//! Rewrite failure taxonomy and its translation into client-facing errors.
//!
//! # Responsibilities
//! - Carry the internal detail of a failed rewrite for server-side logs
//! - Map every failure kind to a status and a generic message (total table)
//! - Wrap the message in an envelope matching the response family
//!
//! # Design Decisions
//! - Internal error text is never sent to the client
//! - XML family gets `<error>…</error>`, JSON gets `{"error":{…}}`, the rest plain text

use std::time::Duration;

use axum::http::{HeaderValue, StatusCode};
use bytes::Bytes;
use thiserror::Error;

use crate::rewrite::gate::ContentTypeClass;

/// Failure of a single body rewrite. The `Display` output is for logs only.
#[derive(Debug, Error)]
pub enum RewriteError {
    #[error("content type mismatch: expected {expected}, upstream sent {actual}")]
    ContentTypeMismatch {
        expected: ContentTypeClass,
        actual: String,
    },

    #[error("failed to decode {encoding} body: {source}")]
    Decompression {
        encoding: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("body exceeds the {limit} byte rewrite limit")]
    BodyTooLarge { limit: usize },

    #[error("document parse exceeded its {budget:?} budget")]
    ParseTimeout { budget: Duration },

    #[error("malformed {format} document: {reason}")]
    Parse { format: &'static str, reason: String },

    #[error("failed to serialize rewritten {format} document: {reason}")]
    Serialization { format: &'static str, reason: String },

    #[error("failed to read upstream body: {0}")]
    BodyRead(String),

    #[error("rewrite task failed: {0}")]
    Internal(String),

    #[error("rewrite abandoned, nobody is waiting for it")]
    Cancelled,
}

impl RewriteError {
    pub fn parse(format: &'static str, reason: impl ToString) -> Self {
        Self::Parse {
            format,
            reason: reason.to_string(),
        }
    }

    pub fn serialization(format: &'static str, reason: impl ToString) -> Self {
        Self::Serialization {
            format,
            reason: reason.to_string(),
        }
    }

    /// Classify the failure for the translation table.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ContentTypeMismatch { .. } => ErrorKind::ContentTypeMismatch,
            Self::Decompression { .. } => ErrorKind::DecompressionFailure,
            Self::BodyTooLarge { .. } => ErrorKind::BodyTooLarge,
            Self::ParseTimeout { .. } => ErrorKind::ParseTimeout,
            Self::Parse { .. } => ErrorKind::ParseFailure,
            Self::Serialization { .. } => ErrorKind::SerializationFailure,
            Self::BodyRead(_) => ErrorKind::UpstreamReadFailure,
            Self::Internal(_) | Self::Cancelled => ErrorKind::Unknown,
        }
    }
}

/// Tag of a rewrite failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ContentTypeMismatch,
    DecompressionFailure,
    BodyTooLarge,
    ParseTimeout,
    ParseFailure,
    SerializationFailure,
    UpstreamReadFailure,
    Unknown,
}

impl ErrorKind {
    /// Label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ContentTypeMismatch => "content_type_mismatch",
            Self::DecompressionFailure => "decompression_failure",
            Self::BodyTooLarge => "body_too_large",
            Self::ParseTimeout => "parse_timeout",
            Self::ParseFailure => "parse_failure",
            Self::SerializationFailure => "serialization_failure",
            Self::UpstreamReadFailure => "upstream_read_failure",
            Self::Unknown => "unknown",
        }
    }
}

/// Status and message sent to the client in place of a failed rewrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorDetails {
    pub status: StatusCode,
    pub message: &'static str,
}

/// Translate a failure kind into the client-facing error.
pub fn translate(kind: ErrorKind) -> ErrorDetails {
    let (status, message) = match kind {
        ErrorKind::ContentTypeMismatch => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Upstream service returned an unexpected content type",
        ),
        ErrorKind::DecompressionFailure => (
            StatusCode::BAD_GATEWAY,
            "Upstream response body could not be decoded",
        ),
        ErrorKind::BodyTooLarge => (
            StatusCode::BAD_GATEWAY,
            "Upstream response body is too large to process",
        ),
        ErrorKind::ParseTimeout => (
            StatusCode::GATEWAY_TIMEOUT,
            "Timed out while processing upstream response",
        ),
        ErrorKind::ParseFailure => (
            StatusCode::BAD_GATEWAY,
            "Upstream response body is malformed",
        ),
        ErrorKind::SerializationFailure => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to produce the rewritten response",
        ),
        ErrorKind::UpstreamReadFailure => (
            StatusCode::BAD_GATEWAY,
            "Upstream response body could not be read",
        ),
        ErrorKind::Unknown => (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error"),
    };
    ErrorDetails { status, message }
}

impl ErrorDetails {
    /// Render the error body and its content type for the given family.
    pub fn render(&self, family: ContentTypeClass) -> (HeaderValue, Bytes) {
        match family {
            ContentTypeClass::XmlOrGml => {
                let body = format!(
                    "<?xml version=\"1.0\" encoding=\"UTF-8\"?><error>{}</error>",
                    quick_xml::escape::escape(self.message)
                );
                (
                    HeaderValue::from_static("application/xml; charset=utf-8"),
                    Bytes::from(body),
                )
            }
            ContentTypeClass::Json => {
                let body = serde_json::json!({
                    "error": {
                        "status": self.status.as_u16(),
                        "message": self.message,
                    }
                });
                (
                    HeaderValue::from_static("application/json"),
                    Bytes::from(body.to_string()),
                )
            }
            ContentTypeClass::Text | ContentTypeClass::Other => (
                HeaderValue::from_static("text/plain; charset=utf-8"),
                Bytes::from_static(self.message.as_bytes()),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_kind_has_a_mapping() {
        let kinds = [
            ErrorKind::ContentTypeMismatch,
            ErrorKind::DecompressionFailure,
            ErrorKind::BodyTooLarge,
            ErrorKind::ParseTimeout,
            ErrorKind::ParseFailure,
            ErrorKind::SerializationFailure,
            ErrorKind::UpstreamReadFailure,
            ErrorKind::Unknown,
        ];
        for kind in kinds {
            let details = translate(kind);
            assert!(details.status.is_server_error(), "{kind:?}");
            assert!(!details.message.is_empty());
        }
    }

    #[test]
    fn test_mismatch_maps_to_500() {
        let err = RewriteError::ContentTypeMismatch {
            expected: ContentTypeClass::XmlOrGml,
            actual: "text/html".into(),
        };
        assert_eq!(translate(err.kind()).status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_upstream_read_failure_maps_to_502() {
        let err = RewriteError::BodyRead("connection reset by peer".into());
        assert_eq!(err.kind(), ErrorKind::UpstreamReadFailure);
        let details = translate(err.kind());
        assert_eq!(details.status, StatusCode::BAD_GATEWAY);
        let (_, body) = details.render(ContentTypeClass::Text);
        assert!(!std::str::from_utf8(&body).unwrap().contains("reset"));
    }

    #[test]
    fn test_internal_detail_not_rendered() {
        let err = RewriteError::Internal("secret stack frame".into());
        let (_, body) = translate(err.kind()).render(ContentTypeClass::Text);
        assert_eq!(&body[..], b"Internal server error");
    }

    #[test]
    fn test_xml_envelope() {
        let (ct, body) = translate(ErrorKind::ParseFailure).render(ContentTypeClass::XmlOrGml);
        assert!(ct.to_str().unwrap().starts_with("application/xml"));
        let body = std::str::from_utf8(&body).unwrap();
        assert!(body.contains("<error>Upstream response body is malformed</error>"));
    }

    #[test]
    fn test_json_envelope() {
        let (ct, body) = translate(ErrorKind::ParseTimeout).render(ContentTypeClass::Json);
        assert_eq!(ct, "application/json");
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["error"]["status"], 504);
    }
}
