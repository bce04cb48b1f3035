//! Storage Abstractions
//!
//! Ports the sync engine writes through: the fingerprint store that remembers
//! what each source looked like after its last completed run, and the
//! persistence port that receives discovered catalog items in batches.

use async_trait::async_trait;

use crate::catalog::{CatalogItem, Fingerprint, SourceId};
use crate::error::Result;

/// Last-known fingerprint per source
///
/// Implementations must be atomic per source; the engine never holds a
/// transaction across calls.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::FingerprintStore;
///
/// async fn forget(store: &dyn FingerprintStore, source: &SourceId) -> Result<bool> {
///     Ok(store.get(source).await?.is_some())
/// }
/// ```
#[async_trait]
pub trait FingerprintStore: Send + Sync {
    /// Fingerprint committed by the last completed run, if any.
    async fn get(&self, source: &SourceId) -> Result<Option<Fingerprint>>;

    /// Replace the stored fingerprint for a source.
    async fn set(&self, source: &SourceId, fingerprint: &Fingerprint) -> Result<()>;
}

/// Catalog persistence port
///
/// Receives bounded, ordered batches. A returned error makes the engine retry
/// the same batch with backoff, so implementations should upsert by
/// [`CatalogItem::key`].
#[async_trait]
pub trait PersistencePort: Send + Sync {
    /// Persist one batch of items for a source.
    async fn flush_batch(&self, source: &SourceId, items: &[CatalogItem]) -> Result<()>;
}
