//! Error types for bsi

use thiserror::Error;

use crate::types::ValueKind;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Type mismatch: index holds {expected} values, got {found}")]
    TypeMismatch { expected: ValueKind, found: ValueKind },

    #[error("Index is uninitialized (bit width 0)")]
    Uninitialized,

    #[error("Invalid bit width: {0} (expected 1..=64)")]
    InvalidBitWidth(u8),

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Column already exists: {0}")]
    ColumnExists(String),

    #[error("Key not found: {0}")]
    NotFound(String),

    #[error("Invalid table name: {0:?} (must be non-empty and contain no '.')")]
    InvalidTableName(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn decode(msg: impl Into<String>) -> Self {
        Error::Decode(msg.into())
    }

    pub fn not_found(key: impl Into<String>) -> Self {
        Error::NotFound(key.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Error::Storage(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }

    /// True when the error came from malformed serialized bytes.
    pub fn is_decode(&self) -> bool {
        matches!(self, Error::Decode(_))
    }
}
