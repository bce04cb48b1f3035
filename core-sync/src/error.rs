use bridge_traits::error::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Source {source_id} is not registered")]
    SourceNotRegistered { source_id: String },

    #[error("Sync already in progress for source {source_id}")]
    SyncInProgress { source_id: String },

    #[error("No active sync run for source {source_id}")]
    NoActiveRun { source_id: String },

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Phase label '{label}' declared by source {source_id} has no phase mapping")]
    UnmappedPhase { label: String, source_id: String },

    #[error("Phase label '{0}' is mapped more than once")]
    DuplicatePhaseLabel(String),

    #[error("Phase table has no entries")]
    EmptyPhaseTable,

    #[error("Handler fault: {0}")]
    Handler(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<core_runtime::Error> for SyncError {
    fn from(err: core_runtime::Error) -> Self {
        SyncError::Config(err.to_string())
    }
}

impl From<BridgeError> for SyncError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::DatabaseError(msg) => SyncError::Database(msg),
            BridgeError::Persistence(msg) => SyncError::Persistence(msg),
            other => SyncError::Handler(other.to_string()),
        }
    }
}

impl From<sqlx::Error> for SyncError {
    fn from(err: sqlx::Error) -> Self {
        SyncError::Database(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
