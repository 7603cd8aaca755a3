//! Error types for the wheelhouse roulette service
//!
//! Game errors are typed business rejections handed straight back to the
//! caller and never retried. Storage and configuration errors belong to the
//! plumbing around the core and are wrapped by [`WheelhouseError`].

use crate::games::types::Phase;
use thiserror::Error;

/// Root error type for all wheelhouse operations
#[derive(Debug, Error)]
pub enum WheelhouseError {
    /// Round or ledger rejections
    #[error("Game error: {0}")]
    Game(#[from] GameError),

    /// Durable store and backup errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration loading and validation errors
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
}

/// Caller misuse or legitimate business rejection
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GameError {
    #[error("operation not allowed in {actual} phase (expected {expected})")]
    InvalidPhase { expected: Phase, actual: Phase },

    #[error("no pending bets to spin")]
    NoBets,

    #[error("insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: u64, available: u64 },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation failed: {0}")]
    Validation(String),
}

impl GameError {
    /// Stable machine-readable code used by the HTTP layer
    pub fn code(&self) -> &'static str {
        match self {
            GameError::InvalidPhase { .. } => "INVALID_PHASE",
            GameError::NoBets => "NO_BETS",
            GameError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            GameError::NotFound(_) => "NOT_FOUND",
            GameError::Validation(_) => "VALIDATION_ERROR",
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        GameError::Validation(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        GameError::NotFound(what.into())
    }
}

/// Storage system errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database open failed: {0}")]
    DatabaseOpenFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Corrupted data: {0}")]
    CorruptedData(String),

    #[error("Backup failed: {0}")]
    BackupFailed(String),
}

/// Configuration and validation errors
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Missing required field: {0}")]
    MissingRequired(String),

    #[error("Invalid value for {field}: '{value}' ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("Failed to save configuration: {0}")]
    SaveFailed(String),
}

impl From<rocksdb::Error> for StorageError {
    fn from(e: rocksdb::Error) -> Self {
        StorageError::WriteFailed(e.to_string())
    }
}

impl From<rocksdb::Error> for WheelhouseError {
    fn from(e: rocksdb::Error) -> Self {
        WheelhouseError::Storage(e.into())
    }
}

impl From<std::io::Error> for WheelhouseError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => {
                WheelhouseError::Storage(StorageError::ReadFailed(e.to_string()))
            }
            _ => WheelhouseError::Storage(StorageError::WriteFailed(e.to_string())),
        }
    }
}

impl From<serde_json::Error> for WheelhouseError {
    fn from(e: serde_json::Error) -> Self {
        WheelhouseError::Storage(StorageError::CorruptedData(e.to_string()))
    }
}

impl From<toml::de::Error> for WheelhouseError {
    fn from(e: toml::de::Error) -> Self {
        WheelhouseError::Configuration(ConfigurationError::LoadFailed(e.to_string()))
    }
}

impl From<toml::ser::Error> for WheelhouseError {
    fn from(e: toml::ser::Error) -> Self {
        WheelhouseError::Configuration(ConfigurationError::SaveFailed(e.to_string()))
    }
}

/// Convenience alias for service-level results
pub type WheelhouseResult<T> = Result<T, WheelhouseError>;

/// Result of a round or ledger operation
pub type GameResult<T> = Result<T, GameError>;

/// Result of a durable store operation
pub type StorageResult<T> = Result<T, StorageError>;
