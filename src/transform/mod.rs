//! Body transformers.
//!
//! # Data Flow
//! ```text
//! route filter config
//!     → build() picks the transformer for the filter type
//!     → Transformer::transform(decoded body, RewriteContext) → rewritten body
//! ```
//!
//! # Design Decisions
//! - Transformers are pure body-in/body-out; headers belong to the decorator
//! - CPU-heavy work (regex over the whole body, JSON trees, XML trees) runs
//!   on the blocking pool so the event loop never stalls
//! - Each transformer declares which content-type families it rewrites

pub mod host;
pub mod json;
pub mod string_replace;
pub mod xml;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::config::schema::FilterConfig;
use crate::rewrite::{ContentTypeClass, RewriteContext, RewriteError};

pub use host::HostReplacer;
pub use json::JsonHostRewrite;
pub use string_replace::StringReplace;
pub use xml::{XmlDocument, XmlDocumentRewrite, XmlElement, XmlNode};

/// A body rewrite strategy plugged into the response decorator.
pub trait Transformer: Send + Sync + fmt::Debug {
    /// Name used in logs and metrics.
    fn name(&self) -> &'static str;

    /// Whether a response of this family gets rewritten.
    fn applies_to(&self, class: ContentTypeClass) -> bool;

    /// Family the upstream must send. A rewritable response of any other
    /// family is treated as an upstream contract violation.
    fn expected_class(&self) -> Option<ContentTypeClass> {
        None
    }

    /// Rewrite the fully materialised, decoded body.
    fn transform<'a>(
        &'a self,
        body: String,
        ctx: &'a RewriteContext,
    ) -> BoxFuture<'a, Result<String, RewriteError>>;
}

/// Build the transformer for a configured route filter.
pub fn build(
    filter: &FilterConfig,
    hosts: &Arc<HostReplacer>,
) -> Result<Arc<dyn Transformer>, regex::Error> {
    let transformer: Arc<dyn Transformer> = match filter {
        FilterConfig::StringReplace {
            pattern,
            replacement,
            ..
        } => Arc::new(StringReplace::new(pattern, replacement)?),
        FilterConfig::JsonHostRewrite { .. } => Arc::new(JsonHostRewrite::new(hosts.clone())),
        FilterConfig::XmlHostRewrite { .. } => Arc::new(xml::xml_host_rewrite(hosts.clone())),
    };
    Ok(transformer)
}

/// Raises the shared flag when dropped.
pub(crate) struct CancelOnDrop(pub(crate) Arc<AtomicBool>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

/// Fail fast once the caller has stopped waiting.
pub(crate) fn ensure_live(cancelled: &AtomicBool) -> Result<(), RewriteError> {
    if cancelled.load(Ordering::Relaxed) {
        return Err(RewriteError::Cancelled);
    }
    Ok(())
}

/// Run CPU-bound rewrite work off the event loop.
///
/// The flag handed to `f` is raised when the returned future is dropped
/// (client gone, request timeout); long loops poll it via [`ensure_live`].
pub(crate) async fn run_blocking<T, F>(f: F) -> Result<T, RewriteError>
where
    F: FnOnce(&AtomicBool) -> Result<T, RewriteError> + Send + 'static,
    T: Send + 'static,
{
    let cancelled = Arc::new(AtomicBool::new(false));
    let _cancel = CancelOnDrop(cancelled.clone());
    tokio::task::spawn_blocking(move || f(&cancelled))
        .await
        .map_err(|e| RewriteError::Internal(e.to_string()))?
}
