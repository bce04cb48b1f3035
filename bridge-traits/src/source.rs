//! Catalog Source Abstraction
//!
//! A source adapter turns one external catalog (a listing API account, a chat
//! archive) into a cold stream of [`CatalogEvent`](crate::catalog::CatalogEvent)s.
//! Transport, paging and retries of the remote calls stay inside the adapter;
//! the sync engine only consumes the resulting events.

use async_trait::async_trait;

use crate::catalog::{CatalogEventStream, Fingerprint, SourceId, SourceKind, SyncStrategy};
use crate::error::Result;

/// Catalog source adapter trait
///
/// # Contract
///
/// - `scan` returns a fresh, cold stream on every call. Nothing is fetched
///   until the engine polls it.
/// - Events arrive in emission order. A well-formed stream ends with exactly
///   one `ScanCompleted` or `ScanError`.
/// - `ScanProgress` labels and `CatalogItem::kind` values must belong to
///   [`phase_labels`](SourceAdapter::phase_labels).
/// - `compute_fingerprint` should be cheap: a handful of counts or a version
///   stamp, never a full listing.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::source::SourceAdapter;
///
/// async fn needs_rescan(adapter: &dyn SourceAdapter, previous: &Fingerprint) -> Result<bool> {
///     Ok(&adapter.compute_fingerprint().await? != previous)
/// }
/// ```
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Stable identity of the source this adapter reads.
    fn source_id(&self) -> SourceId;

    /// Source family; selects the built-in phase vocabulary.
    fn kind(&self) -> SourceKind;

    /// Every phase label this adapter may emit, in its own vocabulary.
    fn phase_labels(&self) -> &'static [&'static str];

    /// Whether `scan(SyncStrategy::Incremental)` only offers changed items.
    fn supports_diff(&self) -> bool {
        false
    }

    /// Summarise the current remote state.
    async fn compute_fingerprint(&self) -> Result<Fingerprint>;

    /// Start a scan with the decided strategy.
    fn scan(&self, strategy: SyncStrategy) -> CatalogEventStream;
}
