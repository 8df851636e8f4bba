//! # Proxy Errors
//!
//! Caller-facing failures of database, query and replicator handles.
//!
//! - Usage errors are detected locally and never retried
//! - Remote failures are surfaced verbatim from the channel
//! - Mixing the blocking and deferred personalities is not an error value:
//!   it panics, since it cannot be recovered from

use thiserror::Error;

use crate::channel::ChannelError;

/// Result type for proxy operations
pub type ProxyResult<T> = Result<T, ProxyError>;

/// Error category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Misuse of a handle, detectable without the remote side
    Usage,
    /// Failure reported by, or on the way to, the remote side
    Remote,
    /// Internal fault such as a poisoned lock
    Internal,
}

/// Proxy errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProxyError {
    // ==================
    // Usage Errors
    // ==================
    /// Operation on a closed resource
    #[error("{0} is closed")]
    ResourceClosed(String),

    /// Operation requires a prepared query
    #[error("Query is not prepared")]
    NotPrepared,

    /// Configuration rejected before reaching the remote side
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    // ==================
    // Remote Failures
    // ==================
    /// Transport or remote-side failure
    #[error(transparent)]
    Channel(#[from] ChannelError),

    // ==================
    // Internal Errors
    // ==================
    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProxyError {
    /// Create a resource closed error
    pub fn closed(resource: impl Into<String>) -> Self {
        Self::ResourceClosed(resource.into())
    }

    /// Get the error category
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ResourceClosed(_) | Self::NotPrepared | Self::InvalidConfiguration(_) => {
                ErrorKind::Usage
            }
            Self::Channel(ChannelError::Internal(_)) | Self::Internal(_) => ErrorKind::Internal,
            Self::Channel(_) => ErrorKind::Remote,
        }
    }

    /// Usage errors are caller mistakes and never worth retrying
    pub fn is_usage_error(&self) -> bool {
        self.kind() == ErrorKind::Usage
    }

    /// Get error code for diagnostics
    pub fn code(&self) -> &'static str {
        match self {
            Self::ResourceClosed(_) => "RESOURCE_CLOSED",
            Self::NotPrepared => "NOT_PREPARED",
            Self::InvalidConfiguration(_) => "INVALID_CONFIGURATION",
            Self::Channel(err) => err.code(),
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}
