use crate::domain::subscription::{SubscriptionId, SubscriptionStatus};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Authorization error: missing or invalid trigger credential")]
    AuthorizationError,
    #[error("State conflict on subscription {0}: {1}")]
    StateConflictError(SubscriptionId, String),
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition {
        from: SubscriptionStatus,
        to: SubscriptionStatus,
    },
    #[error("Persistence error: {0}")]
    PersistenceError(String),
    #[error("Notification error: {0}")]
    NotificationError(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Cycle failed: {0}")]
    CycleFailed(String),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("Configuration error: {0}")]
    ConfigError(#[from] Box<figment::Error>),
    #[cfg(feature = "storage-rocksdb")]
    #[error("RocksDB error: {0}")]
    RocksDbError(#[from] rocksdb::Error),
}

impl From<figment::Error> for EngineError {
    fn from(err: figment::Error) -> Self {
        Self::ConfigError(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
