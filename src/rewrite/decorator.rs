//! Response rewrite decorator.
//!
//! # Responsibilities
//! - Ask the gate whether the response may be rewritten
//! - Assemble, transform and re-encode the body
//! - Replace the whole response with a structured error on any failure
//! - Fix up framing headers on both replacement paths
//!
//! # Design Decisions
//! - One concrete decorator; the rewrite strategy is an injected `Transformer`
//! - Exactly one of three paths per response: untouched, rewritten, error
//! - Upstream status and content type survive a successful rewrite

use std::sync::Arc;

use axum::body::Body;
use axum::http::response::Parts;
use axum::http::{header, HeaderValue, Response};
use futures_util::future::BoxFuture;

use crate::filter::ResponseDecorator;
use crate::observability::metrics;
use crate::rewrite::assembler;
use crate::rewrite::context::{RewriteContext, RewriteSettings};
use crate::rewrite::error::{self, RewriteError};
use crate::rewrite::gate::{self, Charset, ContentEncoding, ContentTypeClass};
use crate::rewrite::headers;
use crate::rewrite::BodyRewriteOutcome;
use crate::transform::{run_blocking, Transformer};

#[derive(Debug, Clone)]
pub struct ResponseRewriteDecorator {
    transformer: Arc<dyn Transformer>,
    settings: RewriteSettings,
}

impl ResponseRewriteDecorator {
    pub fn new(transformer: Arc<dyn Transformer>, settings: RewriteSettings) -> Self {
        Self {
            transformer,
            settings,
        }
    }

    pub fn transformer(&self) -> &dyn Transformer {
        self.transformer.as_ref()
    }

    /// Rewrite one upstream response. Never fails: errors become error responses.
    pub async fn rewrite_response(&self, response: Response<Body>) -> Response<Body> {
        let name = self.transformer.name();
        let (mut parts, body) = response.into_parts();
        let verdict = gate::eligible(parts.status, &parts.headers);

        if !verdict.eligible {
            tracing::debug!(
                transformer = name,
                media_type = %verdict.media_type,
                reason = verdict.skip_reason.unwrap_or_default(),
                "Passing response through"
            );
            if let ContentEncoding::Unsupported(coding) = &verdict.encoding {
                tracing::debug!(transformer = name, encoding = %coding, "Encoding left undecoded");
            }
            metrics::record_rewrite(name, "skipped");
            return Response::from_parts(parts, body);
        }

        let mismatch = self
            .transformer
            .expected_class()
            .filter(|expected| *expected != verdict.class);
        if mismatch.is_none() && !self.transformer.applies_to(verdict.class) {
            metrics::record_rewrite(name, "skipped");
            return Response::from_parts(parts, body);
        }

        let mut ctx = RewriteContext::new(&verdict, &self.settings);
        let outcome = match mismatch {
            Some(expected) => self.reject(body, expected, verdict.charset, &mut ctx).await,
            None => self.rewrite_body(body, verdict.charset, &mut ctx).await,
        };

        match outcome {
            Ok(bytes) => {
                metrics::record_rewrite(name, "rewritten");
                headers::prepare_rewritten(&mut parts.headers);
                Response::from_parts(parts, headers::streamed(bytes))
            }
            Err(err) => {
                let family = mismatch.unwrap_or(verdict.class);
                self.error_response(parts, err, family)
            }
        }
    }

    async fn rewrite_body(
        &self,
        body: Body,
        declared: Option<Charset>,
        ctx: &mut RewriteContext,
    ) -> BodyRewriteOutcome {
        let (decoded, text) = self.assemble(body, declared, ctx).await?;
        if text.trim().is_empty() {
            return Ok(decoded);
        }
        let rewritten = self.transformer.transform(text, ctx).await?;
        assembler::encode_text(rewritten, ctx.charset)
    }

    /// The upstream broke the content-type contract of this route.
    async fn reject(
        &self,
        body: Body,
        expected: ContentTypeClass,
        declared: Option<Charset>,
        ctx: &mut RewriteContext,
    ) -> BodyRewriteOutcome {
        let text = if ctx.log_upstream_bodies {
            self.assemble(body, declared, ctx).await.ok().map(|(_, text)| text)
        } else {
            None
        };
        log_rejected_body(ctx, expected, text.as_deref(), "unexpected content type");
        Err(RewriteError::ContentTypeMismatch {
            expected,
            actual: ctx.media_type.clone(),
        })
    }

    /// Buffer, decompress and decode the body; settles the charset on `ctx`.
    async fn assemble(
        &self,
        body: Body,
        declared: Option<Charset>,
        ctx: &mut RewriteContext,
    ) -> Result<(bytes::Bytes, String), RewriteError> {
        let limit = self.settings.max_body_bytes;
        let raw = assembler::collect(body, limit).await?;
        let decoded = match &ctx.encoding {
            ContentEncoding::Identity | ContentEncoding::Unsupported(_) => raw,
            encoding => {
                let encoding = encoding.clone();
                run_blocking(move |cancelled| {
                    assembler::decompress(raw, &encoding, limit, cancelled)
                })
                .await?
            }
        };
        ctx.charset = assembler::resolve_charset(declared, ctx.class, &decoded);
        let text = assembler::decode_text(&decoded, ctx.charset)?;
        Ok((decoded, text))
    }

    fn error_response(&self, mut parts: Parts, err: RewriteError, family: ContentTypeClass) -> Response<Body> {
        let kind = err.kind();
        tracing::warn!(
            transformer = self.transformer.name(),
            kind = kind.as_str(),
            error = %err,
            "Response rewrite failed"
        );
        metrics::record_rewrite(self.transformer.name(), kind.as_str());

        let details = error::translate(kind);
        let (content_type, body) = details.render(family);
        parts.status = details.status;
        parts.headers.insert(header::CONTENT_TYPE, content_type);
        parts
            .headers
            .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
        headers::prepare_rewritten(&mut parts.headers);
        Response::from_parts(parts, headers::streamed(body))
    }
}

impl ResponseDecorator for ResponseRewriteDecorator {
    fn name(&self) -> &str {
        self.transformer.name()
    }

    fn decorate(&self, response: Response<Body>) -> BoxFuture<'_, Response<Body>> {
        Box::pin(self.rewrite_response(response))
    }
}

/// Log a rejected upstream body. The raw text is only emitted at debug level
/// and only when body logging is switched on; otherwise a summary.
pub fn log_rejected_body(
    ctx: &RewriteContext,
    expected: ContentTypeClass,
    body: Option<&str>,
    reason: &str,
) {
    if let Some(body) = body.filter(|_| ctx.log_upstream_bodies) {
        tracing::debug!(
            media_type = %ctx.media_type,
            expected = %expected,
            reason,
            body = %body,
            "Rejected upstream body"
        );
    }
    tracing::warn!(
        media_type = %ctx.media_type,
        expected = %expected,
        body_bytes = body.map(str::len),
        reason,
        "Upstream content does not match the expected type"
    );
}
