//! Error types for weathernode.
//!
//! This module defines the crate-wide error type. Failures that belong to a
//! narrower domain (MAC status codes, hex parsing, shell commands) have their
//! own error enums and convert into this one where they cross module lines.

use std::path::PathBuf;
use thiserror::Error;

use crate::mac::MacError;

/// The main error type for weathernode operations.
#[derive(Error, Debug)]
pub enum Error {
    // === NVM Errors ===
    /// Failed to open or create the NVM database.
    #[cfg(feature = "eeprom")]
    #[error("failed to open NVM database at {path}: {source}")]
    DatabaseOpen {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// An NVM query failed.
    #[cfg(feature = "eeprom")]
    #[error("NVM query failed: {0}")]
    DatabaseQuery(#[from] rusqlite::Error),

    /// Failed to run NVM schema migrations.
    #[cfg(feature = "eeprom")]
    #[error("NVM migration failed: {message}")]
    DatabaseMigration {
        /// Description of what went wrong.
        message: String,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === MAC Errors ===
    /// The MAC stack rejected an operation.
    #[error("MAC stack error: {0}")]
    Mac(#[from] MacError),

    // === I/O Errors ===
    /// File system or terminal operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized Result type for weathernode operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a configuration validation error.
    #[must_use]
    pub fn config_validation(message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            message: message.into(),
        }
    }

    /// Check if this error came from the MAC stack.
    #[must_use]
    pub fn is_mac_error(&self) -> bool {
        matches!(self, Self::Mac(_))
    }
}
