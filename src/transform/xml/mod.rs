//! XML / GML document rewrite.
//!
//! # Data Flow
//! ```text
//! decoded body
//!     → HTML sniff (upstream said XML but sent an HTML error page?)
//!     → guard.rs (parse on the blocking pool within the budget)
//!     → mutator callback (call-site specific edit of the tree)
//!     → document.rs (serialize)
//! ```
//!
//! Only the envelope is generic. What gets edited is the injected
//! [`XmlMutator`]; the gateway ships [`xml_host_rewrite`].

pub mod document;
pub mod guard;

use std::fmt;
use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::rewrite::decorator::log_rejected_body;
use crate::rewrite::{ContentTypeClass, RewriteContext, RewriteError};
use crate::transform::{ensure_live, run_blocking, HostReplacer, Transformer};

pub use document::{XmlDeclaration, XmlDocument, XmlElement, XmlNode};
pub use guard::{parse_with_budget, ParseGuard};

/// Edit applied to each successfully parsed document.
pub type XmlMutator = Arc<dyn Fn(&mut XmlDocument) -> Result<(), RewriteError> + Send + Sync>;

#[derive(Clone)]
pub struct XmlDocumentRewrite {
    name: &'static str,
    mutator: XmlMutator,
}

impl fmt::Debug for XmlDocumentRewrite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XmlDocumentRewrite")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl XmlDocumentRewrite {
    pub fn new(name: &'static str, mutator: XmlMutator) -> Self {
        Self { name, mutator }
    }

    pub async fn rewrite(&self, body: String, ctx: &RewriteContext) -> Result<String, RewriteError> {
        if body.trim().is_empty() {
            return Ok(body);
        }
        if looks_like_html(&body) {
            log_rejected_body(
                ctx,
                ContentTypeClass::XmlOrGml,
                Some(&body),
                "xml expected, html received",
            );
            return Err(RewriteError::ContentTypeMismatch {
                expected: ContentTypeClass::XmlOrGml,
                actual: format!("{} (html body)", ctx.media_type),
            });
        }

        let mut doc = parse_with_budget(body, ctx.parse_timeout).await?;
        let mutator = self.mutator.clone();
        run_blocking(move |cancelled| {
            mutator(&mut doc)?;
            ensure_live(cancelled)?;
            Ok(doc.to_xml())
        })
        .await
    }
}

impl Transformer for XmlDocumentRewrite {
    fn name(&self) -> &'static str {
        self.name
    }

    fn applies_to(&self, class: ContentTypeClass) -> bool {
        class == ContentTypeClass::XmlOrGml
    }

    fn expected_class(&self) -> Option<ContentTypeClass> {
        Some(ContentTypeClass::XmlOrGml)
    }

    fn transform<'a>(
        &'a self,
        body: String,
        ctx: &'a RewriteContext,
    ) -> BoxFuture<'a, Result<String, RewriteError>> {
        Box::pin(self.rewrite(body, ctx))
    }
}

/// Rewrites hosts in every attribute value and text node, e.g. the
/// `xlink:href` of WMS `OnlineResource` elements.
pub fn xml_host_rewrite(hosts: Arc<HostReplacer>) -> XmlDocumentRewrite {
    XmlDocumentRewrite::new(
        "xml_host_rewrite",
        Arc::new(move |doc: &mut XmlDocument| {
            doc.root_mut().visit_mut(&mut |el: &mut XmlElement| {
                for (_, value) in &mut el.attributes {
                    hosts.replace_in_place(value);
                }
                for child in &mut el.children {
                    if let XmlNode::Text(text) | XmlNode::CData(text) = child {
                        hosts.replace_in_place(text);
                    }
                }
            });
            Ok(())
        }),
    )
}

/// Upstream error pages often arrive labelled as XML.
fn looks_like_html(body: &str) -> bool {
    let head: String = body
        .trim_start_matches('\u{feff}')
        .trim_start()
        .chars()
        .take(16)
        .collect::<String>()
        .to_ascii_lowercase();
    head.starts_with("<!doctype html") || head.starts_with("<html")
}
