//! # Host Bridge Traits
//!
//! Contracts between the catalog sync engine and the layers around it.
//!
//! ## Overview
//!
//! The engine never talks to a remote API or a database directly. Everything it
//! needs from the outside world is expressed as a trait in this crate, and
//! everything it hands back is a plain domain type defined here.
//!
//! ## Traits
//!
//! ### Sources
//! - [`SourceAdapter`](source::SourceAdapter) - Fingerprints a remote catalog and streams its contents
//!
//! ### Storage
//! - [`FingerprintStore`](storage::FingerprintStore) - Remembers the last committed fingerprint per source
//! - [`PersistencePort`](storage::PersistencePort) - Receives discovered items in bounded batches
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! should convert their own errors into it and keep the message actionable
//! (which source, which remote call).
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` bounds; adapters and ports are
//! shared across run tasks behind `Arc`.

pub mod catalog;
pub mod error;
pub mod source;
pub mod storage;
pub mod time;

pub use catalog::{
    CatalogEvent, CatalogEventStream, CatalogItem, Fingerprint, Phase, ScanSummary, SourceId,
    SourceKind, SyncStrategy,
};
pub use error::BridgeError;
pub use source::SourceAdapter;
pub use storage::{FingerprintStore, PersistencePort};
pub use time::{
    Clock, ConsoleLogger, LogEntry, LogLevel, LoggerSink, ManualClock, SystemClock,
};
