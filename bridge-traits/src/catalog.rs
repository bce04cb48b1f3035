//! Catalog Domain Types
//!
//! Types shared between source adapters and the sync engine: source identity,
//! catalog phases, sync strategies, fingerprints, discovered items and the
//! event vocabulary an adapter emits during one scan.

use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

// ============================================================================
// Source Identity
// ============================================================================

/// Identity of one external catalog origin.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceId(String);

impl SourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for SourceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// The family a source belongs to. Each family speaks its own phase vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// IPTV-style listing API (live channels, VOD, series).
    ListingApi,
    /// Media shared in a chat history archive.
    ChatArchive,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::ListingApi => "listing_api",
            SourceKind::ChatArchive => "chat_archive",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Phases & Strategies
// ============================================================================

/// Ordered stage of catalog content within a run.
///
/// A run visits phases in declaration order. Phases may be skipped but never
/// revisited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Live,
    Movies,
    Series,
    Episodes,
}

impl Phase {
    /// All phases in run order.
    pub const ALL: [Phase; 4] = [Phase::Live, Phase::Movies, Phase::Series, Phase::Episodes];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Live => "live",
            Phase::Movies => "movies",
            Phase::Series => "series",
            Phase::Episodes => "episodes",
        }
    }

    /// Position of this phase in run order.
    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a run treats the remote catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStrategy {
    /// Re-offer every item.
    Full,
    /// Offer only changed or added items.
    Incremental,
    /// Nothing changed; do not scan.
    Skip,
}

impl SyncStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStrategy::Full => "full",
            SyncStrategy::Incremental => "incremental",
            SyncStrategy::Skip => "skip",
        }
    }
}

impl fmt::Display for SyncStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Fingerprint
// ============================================================================

/// Opaque summary of a source's top-level remote state.
///
/// The engine only compares fingerprints for equality; adapters decide what
/// goes into them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Derives a fingerprint by hashing ordered `(name, value)` markers.
    ///
    /// Typical markers are per-category listing sizes or a server-side
    /// version stamp. The digest is a lowercase SHA-256 hex string, so the
    /// same markers in the same order always produce the same fingerprint.
    pub fn from_markers<'a, I, V>(markers: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, V)>,
        V: fmt::Display,
    {
        let mut hasher = Sha256::new();
        for (name, value) in markers {
            hasher.update(name.as_bytes());
            hasher.update([0x1f]);
            hasher.update(value.to_string().as_bytes());
            hasher.update([0x1e]);
        }

        let digest = hasher.finalize();
        let hex = digest.iter().map(|byte| format!("{:02x}", byte)).collect();
        Self(hex)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Items & Events
// ============================================================================

/// One catalog entry discovered by a source adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    /// Independent catalog key; two items with the same key are the same entry.
    pub key: String,
    /// Content category in the adapter's own vocabulary (e.g. `"vod"`).
    pub kind: String,
    /// Display title.
    pub title: String,
    /// Adapter-specific attributes (stream URL, message id, season, ...).
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl CatalogItem {
    pub fn new(key: impl Into<String>, kind: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            kind: kind.into(),
            title: title.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }
}

/// What the adapter reports when its scan finishes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSummary {
    /// Number of `ItemDiscovered` events the adapter emitted.
    pub items_emitted: u64,
}

/// Event emitted by a source adapter during one scan.
///
/// Exactly one terminal event (`ScanCompleted` or `ScanError`) ends a
/// well-formed sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CatalogEvent {
    /// The adapter is about to start emitting content.
    ScanningInitial,
    /// Progress ping for a phase label in the adapter's vocabulary.
    ScanProgress {
        phase: String,
        discovered_counts_by_kind: BTreeMap<String, u64>,
    },
    /// One item was found.
    ItemDiscovered { item: CatalogItem },
    /// The scan finished normally.
    ScanCompleted { summary: ScanSummary },
    /// The scan failed; transport retries are the adapter's concern.
    ScanError { cause: String },
}

impl CatalogEvent {
    /// Convenience constructor for a progress ping.
    pub fn progress<'a>(
        phase: impl Into<String>,
        counts: impl IntoIterator<Item = (&'a str, u64)>,
    ) -> Self {
        CatalogEvent::ScanProgress {
            phase: phase.into(),
            discovered_counts_by_kind: counts
                .into_iter()
                .map(|(kind, count)| (kind.to_string(), count))
                .collect(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CatalogEvent::ScanCompleted { .. } | CatalogEvent::ScanError { .. }
        )
    }

    /// Short variant name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            CatalogEvent::ScanningInitial => "scanning_initial",
            CatalogEvent::ScanProgress { .. } => "scan_progress",
            CatalogEvent::ItemDiscovered { .. } => "item_discovered",
            CatalogEvent::ScanCompleted { .. } => "scan_completed",
            CatalogEvent::ScanError { .. } => "scan_error",
        }
    }
}

/// Cold, ordered sequence of events for one scan.
pub type CatalogEventStream = BoxStream<'static, CatalogEvent>;
