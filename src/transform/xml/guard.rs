//! Time-bounded XML parsing.
//!
//! # Responsibilities
//! - Run the parse on the blocking pool, never on the event loop
//! - Stop waiting once the budget expires and report `ParseTimeout`
//! - Make the abandoned parse notice and stop at its next checkpoint
//!
//! # Design Decisions
//! - Two layers: an outer `tokio::time::timeout` bounds the caller, an inner
//!   deadline/cancel check bounds the worker thread
//! - Dropping the future (client gone, request timeout) cancels the worker too
//! - A timed-out parse is never retried

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::rewrite::RewriteError;
use crate::transform::xml::document::XmlDocument;
use crate::transform::CancelOnDrop;

/// Events between deadline checks.
const CHECK_INTERVAL: u64 = 64;

/// Deadline and cancellation flag polled by the parser.
#[derive(Debug, Clone)]
pub struct ParseGuard {
    budget: Duration,
    deadline: Option<Instant>,
    cancelled: Arc<AtomicBool>,
}

impl ParseGuard {
    pub fn new(budget: Duration, cancelled: Arc<AtomicBool>) -> Self {
        Self {
            budget,
            deadline: Instant::now().checked_add(budget),
            cancelled,
        }
    }

    /// Guard that never fires. For tests and offline tooling.
    pub fn unbounded() -> Self {
        Self {
            budget: Duration::MAX,
            deadline: None,
            cancelled: Arc::default(),
        }
    }

    /// Fail when the budget is spent or the owner went away.
    pub fn check(&self, events: u64) -> Result<(), RewriteError> {
        if events % CHECK_INTERVAL != 0 {
            return Ok(());
        }
        let expired = self.deadline.is_some_and(|d| Instant::now() >= d);
        if expired || self.cancelled.load(Ordering::Relaxed) {
            return Err(RewriteError::ParseTimeout {
                budget: self.budget,
            });
        }
        Ok(())
    }
}

/// Parse `body` within `budget`.
pub async fn parse_with_budget(body: String, budget: Duration) -> Result<XmlDocument, RewriteError> {
    let cancelled = Arc::new(AtomicBool::new(false));
    let _cancel = CancelOnDrop(cancelled.clone());
    let guard = ParseGuard::new(budget, cancelled);

    let task = tokio::task::spawn_blocking(move || XmlDocument::parse(&body, &guard));
    match tokio::time::timeout(budget, task).await {
        Ok(Ok(parsed)) => parsed,
        Ok(Err(join)) => Err(RewriteError::Internal(join.to_string())),
        Err(_) => {
            tracing::warn!(budget_ms = budget.as_millis() as u64, "XML parse abandoned after budget");
            Err(RewriteError::ParseTimeout { budget })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Many small sibling elements: cheap to build, slow enough to parse.
    fn large_document(elements: usize) -> String {
        let mut doc = String::with_capacity(elements * 40);
        doc.push_str("<FeatureCollection>");
        for i in 0..elements {
            doc.push_str(&format!("<member id=\"f{i}\" a=\"1\" b=\"2\">x</member>"));
        }
        doc.push_str("</FeatureCollection>");
        doc
    }

    #[test]
    fn test_check_interval() {
        let guard = ParseGuard::new(Duration::ZERO, Arc::default());
        assert!(guard.check(1).is_ok());
        assert!(guard.check(CHECK_INTERVAL).is_err());
    }

    #[test]
    fn test_cancel_flag_stops_parse() {
        let flag = Arc::new(AtomicBool::new(true));
        let guard = ParseGuard::new(Duration::from_secs(60), flag);
        let err = XmlDocument::parse("<a/>", &guard).unwrap_err();
        assert!(matches!(err, RewriteError::ParseTimeout { .. }));
    }

    #[test]
    fn test_cancel_on_drop_sets_flag() {
        let flag = Arc::new(AtomicBool::new(false));
        drop(CancelOnDrop(flag.clone()));
        assert!(flag.load(Ordering::Relaxed));
    }

    #[tokio::test]
    async fn test_small_document_within_budget() {
        let doc = parse_with_budget("<a><b/></a>".into(), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(doc.root().name, "a");
    }

    #[tokio::test]
    async fn test_oversized_document_times_out_in_bounded_time() {
        let budget = Duration::from_millis(1);
        let body = large_document(200_000);
        let started = Instant::now();
        let err = parse_with_budget(body, budget).await.unwrap_err();
        assert!(matches!(err, RewriteError::ParseTimeout { .. }));
        assert!(started.elapsed() < budget + Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_malformed_document_is_parse_failure() {
        let err = parse_with_budget("<a>".into(), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, RewriteError::Parse { .. }));
    }
}
