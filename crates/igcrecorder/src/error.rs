//! Error types for igcrecorder.
//!
//! This module defines all error types used throughout the igcrecorder crate.
//! Variants are grouped by how a caller is expected to react: transport
//! failures may be retried, protocol rejections may not, and validation
//! errors are raised before any device I/O happens.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for igcrecorder operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Transport Errors ===
    /// An operation timed out.
    #[error("operation timed out: {operation}")]
    Timeout {
        /// Description of the operation that timed out.
        operation: String,
    },

    /// The device answered with something we did not expect.
    #[error("protocol error: {message}")]
    Protocol {
        /// Description of what went wrong.
        message: String,
    },

    /// The device explicitly refused the request.
    #[error("{device} rejected the request: {reason}")]
    Rejected {
        /// Name of the device driver.
        device: &'static str,
        /// Why the device refused.
        reason: String,
    },

    /// Run-length decoded data did not match the expected size.
    #[error("decompressed {actual} bytes, expected {expected}")]
    Decompress {
        /// Size of the destination buffer.
        expected: usize,
        /// Number of bytes the input decoded to.
        actual: usize,
    },

    // === Device Errors ===
    /// The declaration cannot be sent to this device.
    #[error("invalid declaration: {message}")]
    InvalidDeclaration {
        /// Description of the validation failure.
        message: String,
    },

    /// The device does not implement the requested operation.
    #[error("{device} does not support {operation}")]
    Unsupported {
        /// Name of the device driver.
        device: &'static str,
        /// Name of the operation.
        operation: &'static str,
    },

    /// The operation was cancelled by the caller.
    #[error("operation cancelled")]
    Cancelled,

    // === Storage Errors ===
    /// Not enough free space for a new flight log, even after cleanup.
    #[error("insufficient free space in {path}: {free_kb} kB free, {required_kb} kB required")]
    InsufficientStorage {
        /// Directory that was checked.
        path: PathBuf,
        /// Free space left after cleanup.
        free_kb: u64,
        /// Configured minimum.
        required_kb: u64,
    },

    // === Signature Errors ===
    /// A flight log cannot be signed or its signature is malformed.
    #[error("signature error in {path}: {message}")]
    Signature {
        /// Path of the flight log.
        path: PathBuf,
        /// Description of the problem.
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

    // === I/O Errors ===
    /// File system or port operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to open or create a file.
    #[error("failed to open {path}: {source}")]
    FileOpen {
        /// Path of the file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

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

    // === Generic Errors ===
    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for igcrecorder operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a new timeout error.
    #[must_use]
    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    /// Create a new protocol error.
    #[must_use]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Create a new rejection error.
    #[must_use]
    pub fn rejected(device: &'static str, reason: impl Into<String>) -> Self {
        Self::Rejected {
            device,
            reason: reason.into(),
        }
    }

    /// Create a new declaration validation error.
    #[must_use]
    pub fn invalid_declaration(message: impl Into<String>) -> Self {
        Self::InvalidDeclaration {
            message: message.into(),
        }
    }

    /// Create a new unsupported-operation error.
    #[must_use]
    pub fn unsupported(device: &'static str, operation: &'static str) -> Self {
        Self::Unsupported { device, operation }
    }

    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Check if another attempt at the same exchange could succeed.
    ///
    /// Timeouts and garbled replies are transient; rejections, validation
    /// failures and cancellation are not.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Protocol { .. })
    }

    /// Check if this error is a timeout.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Check if this error is a device rejection.
    #[must_use]
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }

    /// Check if this error was raised by local declaration validation.
    #[must_use]
    pub fn is_invalid_declaration(&self) -> bool {
        matches!(self, Self::InvalidDeclaration { .. })
    }
}
