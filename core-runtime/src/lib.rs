//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the catalog sync engine:
//! - Logging and tracing infrastructure
//! - Configuration management
//! - Event bus system
//!
//! ## Overview
//!
//! This crate contains the runtime utilities the engine crates depend on. It
//! establishes the logging conventions, the tunables every run is built from,
//! and the broadcast channel runs publish their telemetry on.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{CoreConfig, CoreConfigBuilder, SyncSettings};
pub use error::{Error, Result};
pub use events::{CoreEvent, EventBus, EventSeverity, EventStream, PersistenceEvent, SyncEvent};
