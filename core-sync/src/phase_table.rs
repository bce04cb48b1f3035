//! Explicit mapping from an adapter's phase vocabulary to [`Phase`].
//!
//! Each source family names its content categories differently. The table is
//! the single place where those labels meet the engine's phase order.

use crate::{Result, SyncError};
use bridge_traits::catalog::{Phase, SourceKind};
use std::collections::HashMap;

const LISTING_API: &[(&str, Phase)] = &[
    ("live", Phase::Live),
    ("vod", Phase::Movies),
    ("series", Phase::Series),
    ("episodes", Phase::Episodes),
];

const CHAT_ARCHIVE: &[(&str, Phase)] = &[
    ("videos", Phase::Movies),
    ("series_threads", Phase::Series),
    ("series_parts", Phase::Episodes),
];

/// Label → phase lookup table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseTable {
    entries: HashMap<String, Phase>,
}

impl PhaseTable {
    /// Builds a table, rejecting duplicate labels and empty tables.
    pub fn new<I, L>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (L, Phase)>,
        L: Into<String>,
    {
        let mut map = HashMap::new();
        for (label, phase) in entries {
            let label = label.into();
            if map.insert(label.clone(), phase).is_some() {
                return Err(SyncError::DuplicatePhaseLabel(label));
            }
        }

        if map.is_empty() {
            return Err(SyncError::EmptyPhaseTable);
        }

        Ok(Self { entries: map })
    }

    /// Built-in vocabulary of IPTV-style listing APIs.
    pub fn listing_api() -> Self {
        Self::from_static(LISTING_API)
    }

    /// Built-in vocabulary of chat-history media archives.
    pub fn chat_archive() -> Self {
        Self::from_static(CHAT_ARCHIVE)
    }

    pub fn for_kind(kind: SourceKind) -> Self {
        match kind {
            SourceKind::ListingApi => Self::listing_api(),
            SourceKind::ChatArchive => Self::chat_archive(),
        }
    }

    fn from_static(entries: &[(&str, Phase)]) -> Self {
        Self {
            entries: entries
                .iter()
                .map(|(label, phase)| (label.to_string(), *phase))
                .collect(),
        }
    }

    pub fn resolve(&self, label: &str) -> Option<Phase> {
        self.entries.get(label).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
