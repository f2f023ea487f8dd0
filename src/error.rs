//! Error types and handling for Equinox
//!
//! This module defines the error types used throughout the application.
//! Transport-level faults reported by a register channel live in
//! [`crate::channel::Fault`]; they are folded into [`EquinoxError`] at the
//! orchestrator boundary.

use thiserror::Error;

/// Result type alias for Equinox operations
pub type Result<T> = std::result::Result<T, EquinoxError>;

/// Main error type for Equinox
#[derive(Debug, Error)]
pub enum EquinoxError {
    /// Malformed configuration or schedule. Fatal to the iteration.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Device state could not be read. The iteration is skipped.
    #[error("Read error: {message}")]
    Read { message: String },

    /// A register write was not accepted by the device
    #[error("Write error: {register} - {message}")]
    Write { register: String, message: String },

    /// Modbus communication errors
    #[error("Modbus error: {message}")]
    Modbus { message: String },

    /// Timeout errors
    #[error("Timeout error: {message}")]
    Timeout { message: String },

    /// Validation errors
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Generic errors with context
    #[error("Error: {message}")]
    Generic { message: String },
}

impl EquinoxError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        EquinoxError::Config {
            message: message.into(),
        }
    }

    /// Create a new read error
    pub fn read<S: Into<String>>(message: S) -> Self {
        EquinoxError::Read {
            message: message.into(),
        }
    }

    /// Create a new write error for a named register
    pub fn write<R: Into<String>, S: Into<String>>(register: R, message: S) -> Self {
        EquinoxError::Write {
            register: register.into(),
            message: message.into(),
        }
    }

    /// Create a new Modbus error
    pub fn modbus<S: Into<String>>(message: S) -> Self {
        EquinoxError::Modbus {
            message: message.into(),
        }
    }

    /// Create a new timeout error
    pub fn timeout<S: Into<String>>(message: S) -> Self {
        EquinoxError::Timeout {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<F: Into<String>, S: Into<String>>(field: F, message: S) -> Self {
        EquinoxError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        EquinoxError::Io {
            message: message.into(),
        }
    }

    /// Create a new generic error
    pub fn generic<S: Into<String>>(message: S) -> Self {
        EquinoxError::Generic {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for EquinoxError {
    fn from(err: std::io::Error) -> Self {
        EquinoxError::io(err.to_string())
    }
}

impl From<serde_yaml::Error> for EquinoxError {
    fn from(err: serde_yaml::Error) -> Self {
        EquinoxError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for EquinoxError {
    fn from(err: serde_json::Error) -> Self {
        EquinoxError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<chrono::ParseError> for EquinoxError {
    fn from(err: chrono::ParseError) -> Self {
        EquinoxError::validation("datetime", err.to_string())
    }
}
