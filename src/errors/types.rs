//! Error type definitions for the EPG aggregator
//!
//! This module defines all error types used throughout the crate, providing
//! a hierarchical error system where each layer owns its own enum and the
//! top-level [`AppError`] wraps them.

use thiserror::Error;

/// Top-level application error type
///
/// Every layer error converts into this type with `?`, so orchestration code
/// (ingestors, the coordinator, web handlers) can work with a single type.
#[derive(Error, Debug)]
pub enum AppError {
    /// Remote document / device transfer errors
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Channel catalog errors
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Refresh schedule errors
    #[error("Schedule error: {0}")]
    Schedule(#[from] ScheduleError),

    /// Listing parse errors
    #[error("Parse error: {source_type} - {message}")]
    Parse { source_type: String, message: String },

    /// Validation errors
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Filesystem errors outside of a transfer
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Errors raised while retrieving a remote document or device payload
#[derive(Error, Debug)]
pub enum FetchError {
    /// Unrecoverable HTTP status or connection failure
    #[error("Transfer failed: {url} - {message}")]
    Transfer {
        url: String,
        status: Option<u16>,
        message: String,
    },

    /// No response arrived inside the configured deadline
    #[error("Peer timed out after {timeout_secs}s: {url}")]
    PeerTimeout { url: String, timeout_secs: u64 },

    /// Server answered 416 to a byte-range request
    #[error("Range not satisfiable: {url} - bytes={start}-{end}")]
    RangeNotSatisfiable { url: String, start: u64, end: u64 },

    /// A fetch of the same listing is already running
    #[error("Fetch already in progress: {url}")]
    AlreadyInProgress { url: String },

    /// The compressed stream could not be decoded after it had started
    #[error("Decode failed: {url} - {message}")]
    Decode { url: String, message: String },

    /// Writing the local copy failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The executor aborted the transfer during shutdown
    #[error("Fetch cancelled: {url}")]
    Cancelled { url: String },
}

/// Errors raised by the channel catalog
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// No record with the given identifier
    #[error("Channel not found: {id}")]
    NotFound { id: String },

    /// The catalog holds no records yet
    #[error("Channel catalog is empty")]
    EmptyCatalog,

    /// A query argument was out of range
    #[error("Invalid argument: {field} - {message}")]
    InvalidArgument { field: String, message: String },

    /// Serialized record or snapshot could not be decoded
    #[error("Malformed record: {message}")]
    MalformedRecord { message: String },
}

/// Errors raised by the refresh coordinator's control API
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    /// The listing already has a schedule
    #[error("Listing already scheduled: {url}")]
    Duplicate { url: String },

    /// The cron expression could not be parsed
    #[error("Invalid schedule '{spec}': {message}")]
    InvalidSchedule { spec: String, message: String },

    /// The listing has no schedule
    #[error("No schedule for listing: {url}")]
    NotFound { url: String },
}

/// Convenience methods for creating common error types
impl AppError {
    /// Create a validation error with a custom message
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a parse error
    pub fn parse_error<S: Into<String>, M: Into<String>>(source_type: S, message: M) -> Self {
        Self::Parse {
            source_type: source_type.into(),
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl FetchError {
    /// Create a transfer error for a failed HTTP status
    pub fn status<U: Into<String>>(url: U, status: u16, message: impl Into<String>) -> Self {
        Self::Transfer {
            url: url.into(),
            status: Some(status),
            message: message.into(),
        }
    }

    /// Create a transfer error without an HTTP status (connection level)
    pub fn transfer<U: Into<String>, M: Into<String>>(url: U, message: M) -> Self {
        Self::Transfer {
            url: url.into(),
            status: None,
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout<U: Into<String>>(url: U, timeout: std::time::Duration) -> Self {
        Self::PeerTimeout {
            url: url.into(),
            timeout_secs: timeout.as_secs(),
        }
    }

    /// Map a reqwest failure onto the transfer taxonomy
    pub fn from_reqwest<U: Into<String>>(url: U, err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => Self::status(url, status.as_u16(), err.to_string()),
            None => Self::transfer(url, err.to_string()),
        }
    }

    /// Whether this error belongs to the transfer family (retried on the next tick)
    pub fn is_transfer(&self) -> bool {
        matches!(
            self,
            Self::Transfer { .. } | Self::PeerTimeout { .. } | Self::RangeNotSatisfiable { .. }
        )
    }
}

impl CatalogError {
    /// Create a not found error
    pub fn not_found<I: Into<String>>(id: I) -> Self {
        Self::NotFound { id: id.into() }
    }

    /// Create an invalid argument error
    pub fn invalid_argument<F: Into<String>, M: Into<String>>(field: F, message: M) -> Self {
        Self::InvalidArgument {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a malformed record error
    pub fn malformed<M: Into<String>>(message: M) -> Self {
        Self::MalformedRecord {
            message: message.into(),
        }
    }
}

impl ScheduleError {
    /// Create an invalid schedule error
    pub fn invalid<S: Into<String>, M: Into<String>>(spec: S, message: M) -> Self {
        Self::InvalidSchedule {
            spec: spec.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_timeout_is_transfer_family() {
        let err = FetchError::timeout("http://example.com/feed", Duration::from_secs(60));
        assert!(err.is_transfer());
        assert_eq!(
            err.to_string(),
            "Peer timed out after 60s: http://example.com/feed"
        );
    }

    #[test]
    fn test_io_is_not_transfer_family() {
        let err = FetchError::from(std::io::Error::other("disk full"));
        assert!(!err.is_transfer());
    }

    #[test]
    fn test_layer_errors_convert_into_app_error() {
        let app: AppError = CatalogError::EmptyCatalog.into();
        assert!(matches!(app, AppError::Catalog(CatalogError::EmptyCatalog)));

        let app: AppError = ScheduleError::NotFound {
            url: "http://example.com".to_string(),
        }
        .into();
        assert!(app.to_string().contains("No schedule for listing"));
    }
}
