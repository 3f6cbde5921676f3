//! Regular-expression replace over the whole body.
//!
//! The pattern is a full regex, not a literal: metacharacters in a host name
//! such as `.` match any character unless escaped in the configuration.

use futures_util::future::BoxFuture;
use regex::Regex;

use crate::rewrite::{ContentTypeClass, RewriteContext, RewriteError};
use crate::transform::{ensure_live, run_blocking, Transformer};

#[derive(Debug, Clone)]
pub struct StringReplace {
    pattern: Regex,
    replacement: String,
}

impl StringReplace {
    /// `replacement` may reference capture groups (`$1`, `${name}`).
    pub fn new(pattern: &str, replacement: impl Into<String>) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
            replacement: replacement.into(),
        })
    }

    pub fn apply(&self, body: &str) -> String {
        self.pattern
            .replace_all(body, self.replacement.as_str())
            .into_owned()
    }
}

impl Transformer for StringReplace {
    fn name(&self) -> &'static str {
        "string_replace"
    }

    fn applies_to(&self, class: ContentTypeClass) -> bool {
        class != ContentTypeClass::Other
    }

    fn transform<'a>(
        &'a self,
        body: String,
        _ctx: &'a RewriteContext,
    ) -> BoxFuture<'a, Result<String, RewriteError>> {
        let this = self.clone();
        Box::pin(run_blocking(move |cancelled| {
            ensure_live(cancelled)?;
            Ok(this.apply(&body))
        }))
    }
}
