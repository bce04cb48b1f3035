//! # Fingerprint Repositories
//!
//! Implementations of [`FingerprintStore`].
//!
//! ## Overview
//!
//! - [`SqliteFingerprintStore`]: one row per source in `source_fingerprints`,
//!   upserted when a run commits
//! - [`InMemoryFingerprintStore`]: process-local map for tests and hosts
//!   without a database
//!
//! Removing a source's row (`clear`) forces its next run to scan in full.

use crate::Result;
use async_trait::async_trait;
use bridge_traits::catalog::{Fingerprint, SourceId};
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::storage::FingerprintStore;
use chrono::{DateTime, TimeZone, Utc};
use core_async::sync::RwLock;
use sqlx::{FromRow, SqlitePool};
use std::collections::HashMap;
use tracing::debug;

// ============================================================================
// SQLite Implementation
// ============================================================================

/// SQLite-backed fingerprint store
pub struct SqliteFingerprintStore {
    pool: SqlitePool,
}

impl SqliteFingerprintStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Creates the `source_fingerprints` table if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS source_fingerprints (
                source_id TEXT PRIMARY KEY NOT NULL,
                fingerprint TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Forgets the fingerprint of a source.
    ///
    /// Returns `true` if a row was removed.
    pub async fn clear(&self, source: &SourceId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM source_fingerprints WHERE source_id = ?")
            .bind(source.as_str())
            .execute(&self.pool)
            .await?;

        debug!(source_id = %source, removed = result.rows_affected(), "Fingerprint cleared");
        Ok(result.rows_affected() > 0)
    }

    /// When the fingerprint of a source was last committed.
    pub async fn updated_at(&self, source: &SourceId) -> Result<Option<DateTime<Utc>>> {
        let row = self.fetch(source).await?;
        Ok(row.and_then(|row| Utc.timestamp_millis_opt(row.updated_at).single()))
    }

    async fn fetch(&self, source: &SourceId) -> Result<Option<FingerprintRow>> {
        let row = sqlx::query_as::<_, FingerprintRow>(
            "SELECT fingerprint, updated_at FROM source_fingerprints WHERE source_id = ?",
        )
        .bind(source.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }
}

/// Database row representation of a stored fingerprint
#[derive(Debug, FromRow)]
struct FingerprintRow {
    fingerprint: String,
    updated_at: i64,
}

#[async_trait]
impl FingerprintStore for SqliteFingerprintStore {
    async fn get(&self, source: &SourceId) -> BridgeResult<Option<Fingerprint>> {
        let row = self
            .fetch(source)
            .await
            .map_err(|e| BridgeError::DatabaseError(e.to_string()))?;

        Ok(row.map(|row| Fingerprint::new(row.fingerprint)))
    }

    async fn set(&self, source: &SourceId, fingerprint: &Fingerprint) -> BridgeResult<()> {
        sqlx::query(
            r#"
            INSERT INTO source_fingerprints (source_id, fingerprint, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(source_id) DO UPDATE SET
                fingerprint = excluded.fingerprint,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(source.as_str())
        .bind(fingerprint.as_str())
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(|e| BridgeError::DatabaseError(e.to_string()))?;

        Ok(())
    }
}

// ============================================================================
// In-Memory Implementation
// ============================================================================

/// Fingerprints kept in process memory
#[derive(Debug, Default)]
pub struct InMemoryFingerprintStore {
    fingerprints: RwLock<HashMap<SourceId, Fingerprint>>,
}

impl InMemoryFingerprintStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn clear(&self, source: &SourceId) -> bool {
        self.fingerprints.write().await.remove(source).is_some()
    }

    pub async fn len(&self) -> usize {
        self.fingerprints.read().await.len()
    }
}

#[async_trait]
impl FingerprintStore for InMemoryFingerprintStore {
    async fn get(&self, source: &SourceId) -> BridgeResult<Option<Fingerprint>> {
        Ok(self.fingerprints.read().await.get(source).cloned())
    }

    async fn set(&self, source: &SourceId, fingerprint: &Fingerprint) -> BridgeResult<()> {
        self.fingerprints
            .write()
            .await
            .insert(source.clone(), fingerprint.clone());
        Ok(())
    }
}
