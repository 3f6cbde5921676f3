//! Host substitution table.

use std::borrow::Cow;

use crate::config::schema::HostMapping;

/// Replaces internal host strings with their public counterparts.
///
/// Mappings apply in configuration order, each over the output of the
/// previous one. Plain substring substitution, no I/O, cannot fail.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostReplacer {
    mappings: Vec<(String, String)>,
}

impl HostReplacer {
    pub fn new<I, F, T>(mappings: I) -> Self
    where
        I: IntoIterator<Item = (F, T)>,
        F: Into<String>,
        T: Into<String>,
    {
        Self {
            mappings: mappings
                .into_iter()
                .map(|(from, to)| (from.into(), to.into()))
                .filter(|(from, _)| !from.is_empty())
                .collect(),
        }
    }

    pub fn from_config(mappings: &[HostMapping]) -> Self {
        Self::new(mappings.iter().map(|m| (m.from.as_str(), m.to.as_str())))
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    /// Apply every mapping. Borrowed when nothing matched.
    pub fn replace<'a>(&self, text: &'a str) -> Cow<'a, str> {
        let mut out = Cow::Borrowed(text);
        for (from, to) in &self.mappings {
            if out.contains(from.as_str()) {
                out = Cow::Owned(out.replace(from.as_str(), to));
            }
        }
        out
    }

    /// Rewrite a string in place. Returns whether it changed.
    pub fn replace_in_place(&self, text: &mut String) -> bool {
        let replaced = match self.replace(text) {
            Cow::Borrowed(_) => return false,
            Cow::Owned(new) => new,
        };
        if replaced == *text {
            return false;
        }
        *text = replaced;
        true
    }
}
