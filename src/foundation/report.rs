use std::collections::BTreeMap;

use crate::foundation::error::{ErrorKind, SplashError};

/// One input dropped by a per-document failure.
#[derive(Debug)]
pub struct Skipped {
    /// File path, document id or entry name the failure belongs to.
    pub source: String,
    pub error: SplashError,
}

/// Everything a batch dropped, in the order it was dropped.
#[derive(Debug, Default)]
pub struct SkipReport {
    entries: Vec<Skipped>,
}

impl SkipReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, source: impl Into<String>, error: SplashError) {
        let source = source.into();
        tracing::warn!(%source, %error, "skipping input");
        self.entries.push(Skipped { source, error });
    }

    pub fn extend(&mut self, other: SkipReport) {
        self.entries.extend(other.entries);
    }

    pub fn entries(&self) -> &[Skipped] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn count_by_kind(&self) -> BTreeMap<ErrorKind, usize> {
        let mut out = BTreeMap::new();
        for e in &self.entries {
            *out.entry(e.error.kind()).or_insert(0) += 1;
        }
        out
    }

    /// One-line summary, e.g. `3 skipped (1 corrupt container, 2 invalid geometry)`.
    pub fn summary(&self) -> String {
        if self.entries.is_empty() {
            return "0 skipped".to_string();
        }
        let parts = self
            .count_by_kind()
            .into_iter()
            .map(|(kind, n)| format!("{n} {}", kind.label()))
            .collect::<Vec<_>>();
        format!("{} skipped ({})", self.entries.len(), parts.join(", "))
    }
}
