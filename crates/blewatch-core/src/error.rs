//! Unified error types for the blewatch core library.
//!
//! This module provides a unified error type [`BlewatchError`] that covers all
//! failure modes callers can observe. Each module also has its own specific
//! error type ([`SourceError`], [`LookupError`], [`TrackerError`],
//! [`ConfigError`]) that converts into it.
//!
//! Note that sighting ingestion never produces an error: per-sighting failures
//! are handled inside the tracker. Only lifecycle, lookup, and configuration
//! operations surface errors.
//!
//! # Example
//!
//! ```rust
//! use blewatch_core::error::{BlewatchError, Result};
//!
//! fn require_listening(listening: bool) -> Result<()> {
//!     if !listening {
//!         return Err(BlewatchError::InvalidState("tracker is stopped".into()));
//!     }
//!     Ok(())
//! }
//! # assert!(require_listening(false).is_err());
//! ```

use thiserror::Error;

use crate::config::ConfigError;
use crate::source::{LookupError, SourceError};
use crate::tracker::TrackerError;

/// The unified error type for blewatch operations.
#[derive(Debug, Error)]
pub enum BlewatchError {
    // =========================================================================
    // ADVERTISEMENT SOURCE ERRORS
    // =========================================================================
    /// No Bluetooth adapter was found on this system.
    #[error(
        "No Bluetooth adapter found. Ensure Bluetooth hardware is present and bluetoothd is running."
    )]
    AdapterNotFound,

    /// The Bluetooth adapter exists but is powered off.
    #[error("Bluetooth adapter is powered off. Run 'bluetoothctl power on' to enable.")]
    AdapterPoweredOff,

    /// The process is not allowed to scan.
    #[error("Permission denied: {0}. Add the user to the 'bluetooth' group or grant CAP_NET_ADMIN.")]
    PermissionDenied(String),

    /// The advertisement source could not be opened.
    #[error("Advertisement source unavailable: {0}")]
    SourceUnavailable(String),

    // =========================================================================
    // TRACKER ERRORS
    // =========================================================================
    /// The operation is not valid in the tracker's current state.
    #[error("Invalid tracker state: {0}")]
    InvalidState(String),

    /// The device is not in the registry.
    #[error("Device not found: '{0}'. It may have timed out or never advertised.")]
    DeviceNotFound(String),

    /// Resolving extra device information failed.
    #[error("Device lookup failed: {0}")]
    LookupFailed(String),

    /// The tracker task has shut down.
    #[error("Tracker is no longer running")]
    TrackerClosed,

    // =========================================================================
    // CONFIGURATION ERRORS
    // =========================================================================
    /// The configuration could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    ConfigParseError(String),

    /// The configuration was parsed but contains invalid values.
    #[error("Configuration validation failed: {0}")]
    ConfigValidationError(String),

    // =========================================================================
    // PERSISTENCE ERRORS
    // =========================================================================
    /// A configuration file could not be read or written.
    #[error("Persistence error: {0}")]
    PersistenceError(String),
}

/// A specialized [`Result`] type for blewatch operations.
pub type Result<T> = std::result::Result<T, BlewatchError>;

impl BlewatchError {
    /// Returns `true` if this error comes from the advertisement source.
    #[inline]
    #[must_use]
    pub const fn is_source_error(&self) -> bool {
        matches!(
            self,
            Self::AdapterNotFound
                | Self::AdapterPoweredOff
                | Self::PermissionDenied(_)
                | Self::SourceUnavailable(_)
        )
    }

    /// Returns an HTTP-appropriate status code for this error.
    #[inline]
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            // 403 Forbidden - the host refused access to the radio
            Self::PermissionDenied(_) => 403,

            // 404 Not Found
            Self::DeviceNotFound(_) => 404,

            // 409 Conflict - valid request, wrong lifecycle state
            Self::InvalidState(_) => 409,

            // 422 Unprocessable Entity - semantic errors
            Self::ConfigParseError(_) | Self::ConfigValidationError(_) => 422,

            // 500 Internal Server Error - server-side issues
            Self::PersistenceError(_) | Self::TrackerClosed => 500,

            // 502 Bad Gateway - the platform lookup failed
            Self::LookupFailed(_) => 502,

            // 503 Service Unavailable - Bluetooth hardware issues
            Self::AdapterNotFound | Self::AdapterPoweredOff | Self::SourceUnavailable(_) => 503,
        }
    }

    /// Returns a machine-readable error code for API responses.
    #[inline]
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::AdapterNotFound => "BLUETOOTH_ADAPTER_NOT_FOUND",
            Self::AdapterPoweredOff => "BLUETOOTH_ADAPTER_POWERED_OFF",
            Self::PermissionDenied(_) => "PERMISSION_DENIED",
            Self::SourceUnavailable(_) => "SOURCE_UNAVAILABLE",
            Self::InvalidState(_) => "INVALID_STATE",
            Self::DeviceNotFound(_) => "DEVICE_NOT_FOUND",
            Self::LookupFailed(_) => "LOOKUP_FAILED",
            Self::TrackerClosed => "TRACKER_CLOSED",
            Self::ConfigParseError(_) => "CONFIG_PARSE_ERROR",
            Self::ConfigValidationError(_) => "CONFIG_VALIDATION_ERROR",
            Self::PersistenceError(_) => "PERSISTENCE_ERROR",
        }
    }
}

// =============================================================================
// CONVERSIONS FROM MODULE-SPECIFIC ERRORS
// =============================================================================

impl From<SourceError> for BlewatchError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::AdapterNotFound => Self::AdapterNotFound,
            SourceError::AdapterPoweredOff => Self::AdapterPoweredOff,
            SourceError::PermissionDenied { message } => Self::PermissionDenied(message),
            SourceError::Unavailable { message } => Self::SourceUnavailable(message),
        }
    }
}

impl From<LookupError> for BlewatchError {
    fn from(err: LookupError) -> Self {
        match err {
            LookupError::DeviceGone { address } => Self::DeviceNotFound(address.to_string()),
            LookupError::Failed { message } => Self::LookupFailed(message),
        }
    }
}

impl From<TrackerError> for BlewatchError {
    fn from(err: TrackerError) -> Self {
        match err {
            TrackerError::SourceUnavailable(source) => Self::from(source),
            TrackerError::PermissionDenied(message) => Self::PermissionDenied(message),
            e @ TrackerError::InvalidState { .. } => Self::InvalidState(e.to_string()),
            TrackerError::UnknownDevice(address) => Self::DeviceNotFound(address.to_string()),
            TrackerError::Lookup(lookup) => Self::from(lookup),
            TrackerError::Closed => Self::TrackerClosed,
        }
    }
}

impl From<ConfigError> for BlewatchError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::ReadError { path, source } => {
                Self::PersistenceError(format!("Failed to read {path}: {source}"))
            }
            ConfigError::WriteError { path, source } => {
                Self::PersistenceError(format!("Failed to write {path}: {source}"))
            }
            ConfigError::ParseError(e) => Self::ConfigParseError(e.to_string()),
            ConfigError::SerializeError(e) => Self::ConfigParseError(e.to_string()),
            ConfigError::ValidationError { field, message } => {
                Self::ConfigValidationError(format!("{field}: {message}"))
            }
            ConfigError::MultipleValidationErrors(errors) => {
                let messages: Vec<String> = errors.into_iter().map(|e| e.to_string()).collect();
                Self::ConfigValidationError(messages.join("; "))
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
