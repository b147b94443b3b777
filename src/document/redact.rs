use std::collections::BTreeSet;

use crate::document::model::{MetadataKey, SplashDocument};

/// Metadata fields that identify a person or a place.
pub const IDENTIFYING_KEYS: [MetadataKey; 5] = [
    MetadataKey::Owner,
    MetadataKey::Address,
    MetadataKey::Description,
    MetadataKey::ObserverName,
    MetadataKey::ObserverPosition,
];

/// Removes identifying metadata while leaving id, geometry and mask alone.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Redactor {
    keys: BTreeSet<MetadataKey>,
}

impl Default for Redactor {
    fn default() -> Self {
        Self::with_keys(IDENTIFYING_KEYS)
    }
}

impl Redactor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_keys(keys: impl IntoIterator<Item = MetadataKey>) -> Self {
        Self {
            keys: keys.into_iter().collect(),
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = MetadataKey> + '_ {
        self.keys.iter().copied()
    }

    pub fn redacts(&self, key: MetadataKey) -> bool {
        self.keys.contains(&key)
    }

    /// Remove every configured key from `doc`; returns how many fields were dropped.
    pub fn redact(&self, doc: &mut SplashDocument) -> usize {
        let before = doc.metadata.len();
        doc.metadata.retain(|k, _| !self.keys.contains(k));
        let removed = before - doc.metadata.len();
        if removed > 0 {
            tracing::debug!(id = %doc.id, removed, "redacted metadata");
        }
        removed
    }
}

#[cfg(test)]
#[path = "../../tests/unit/document/redact.rs"]
mod tests;
