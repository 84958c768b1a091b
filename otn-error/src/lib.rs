//! Unified error handling for the peripheral monitor
//!
//! This crate provides the single error type shared by the core library and the daemon.
//! It uses thiserror for Display and Error trait impls.

use std::io;
use std::path::PathBuf;

/// Result type alias using PmonError
pub type Result<T> = std::result::Result<T, PmonError>;

/// Unified error type for all peripheral monitor operations
#[derive(thiserror::Error, Debug)]
pub enum PmonError {
    // ============================================================================
    // I/O and File System Errors
    // ============================================================================
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: io::Error,
    },

    #[error("Failed to write file {path}: {source}")]
    FileWrite {
        path: PathBuf,
        source: io::Error,
    },

    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Invalid configuration value for {field}: {reason}")]
    InvalidConfig {
        field: String,
        reason: String,
    },

    // ============================================================================
    // Telemetry (hardware RPC) Errors
    // ============================================================================
    #[error("Telemetry service unavailable: {0}")]
    TelemetryUnavailable(String),

    #[error("Telemetry request for {periph} failed: {reason}")]
    Telemetry {
        periph: String,
        reason: String,
    },

    // ============================================================================
    // Validation Errors
    // ============================================================================
    #[error("Invalid slot status: {0}")]
    InvalidSlotStatus(String),

    #[error("Invalid fan speed rate: {0} (must be 0-100 or \"auto\")")]
    InvalidSpeedRate(String),

    #[error("Invalid fan level table: {0}")]
    InvalidLevelTable(String),

    // ============================================================================
    // Generic Errors
    // ============================================================================
    #[error("{0}")]
    Generic(String),
}

impl PmonError {
    /// Create a generic error from a string
    pub fn generic(msg: impl Into<String>) -> Self {
        Self::Generic(msg.into())
    }

    /// Create a config error from a string
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid config value error
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a telemetry error for a named peripheral
    pub fn telemetry(periph: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Telemetry {
            periph: periph.into(),
            reason: reason.into(),
        }
    }

    /// Whether the error means the hardware could not be reached this tick
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::TelemetryUnavailable(_) | Self::Telemetry { .. })
    }
}

// Allow converting from String to PmonError
impl From<String> for PmonError {
    fn from(s: String) -> Self {
        Self::Generic(s)
    }
}

// Allow converting from &str to PmonError
impl From<&str> for PmonError {
    fn from(s: &str) -> Self {
        Self::Generic(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_telemetry_errors_are_unreachable() {
        assert!(PmonError::telemetry("FAN-1-1", "timeout").is_unreachable());
        assert!(PmonError::TelemetryUnavailable("refused".into()).is_unreachable());
        assert!(!PmonError::config("bad").is_unreachable());
    }

    #[test]
    fn test_display_includes_context() {
        let err = PmonError::telemetry("FAN-1-2", "no such unit");
        assert_eq!(err.to_string(), "Telemetry request for FAN-1-2 failed: no such unit");
        let err = PmonError::invalid_config("poll_interval_ms", "must be positive");
        assert_eq!(
            err.to_string(),
            "Invalid configuration value for poll_interval_ms: must be positive"
        );
    }
}
