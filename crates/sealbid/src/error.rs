//! error types for sealbid

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    // === input errors ===
    #[error("validation error: {0}")]
    Validation(String),

    #[error("bid must be between {min} and {max}, got {amount}")]
    OutOfRange {
        amount: String,
        min: String,
        max: String,
    },

    // === encryption gateway errors ===
    #[error("initialization failed: {0}")]
    Initialization(String),

    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("authorization rejected: {0}")]
    Authorization(String),

    // === ledger errors ===
    #[error("network error: {0}")]
    Network(String),

    #[error("transaction rejected: {0}")]
    Rejected(String),

    #[error("not found: {0}")]
    NotFound(String),

    // === local custody errors ===
    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("key derivation failed")]
    KeyDerivationFailed,
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<sled::Error> for Error {
    fn from(e: sled::Error) -> Self {
        Error::Storage(e.to_string())
    }
}
