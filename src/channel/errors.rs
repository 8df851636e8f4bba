//! # Channel Errors
//!
//! Error types for the call channel.

use thiserror::Error;

use super::protocol::CallbackId;

/// Result type for call channel operations
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Call channel errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ChannelError {
    // ==================
    // Remote Errors
    // ==================
    /// The remote side rejected the request
    #[error("Remote error [{code}]: {message}")]
    Remote {
        /// Engine-defined error code
        code: String,
        /// Engine-provided message, passed through verbatim
        message: String,
    },

    // ==================
    // Transport Errors
    // ==================
    /// The remote execution context is gone
    #[error("Channel disconnected")]
    Disconnected,

    /// The remote answered with a response of the wrong shape
    #[error("Unexpected response: expected {expected}, got {actual}")]
    UnexpectedResponse {
        /// Response kind the request calls for
        expected: &'static str,
        /// Response kind actually received
        actual: &'static str,
    },

    // ==================
    // Callback Errors
    // ==================
    /// No adapter is registered under this id
    #[error("Callback not found: {0}")]
    CallbackNotFound(CallbackId),

    /// An adapter received a payload it does not handle
    #[error("Unexpected callback payload: {0}")]
    UnexpectedPayload(&'static str),

    // ==================
    // Internal Errors
    // ==================
    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ChannelError {
    /// Create a remote error
    pub fn remote(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Remote {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Get error code for diagnostics
    pub fn code(&self) -> &'static str {
        match self {
            Self::Remote { .. } => "REMOTE_FAILURE",
            Self::Disconnected => "CHANNEL_DISCONNECTED",
            Self::UnexpectedResponse { .. } => "UNEXPECTED_RESPONSE",
            Self::CallbackNotFound(_) => "CALLBACK_NOT_FOUND",
            Self::UnexpectedPayload(_) => "UNEXPECTED_PAYLOAD",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_error_passes_message_verbatim() {
        let err = ChannelError::remote("COMPILE", "syntax error near FROM");
        assert_eq!(err.to_string(), "Remote error [COMPILE]: syntax error near FROM");
        assert_eq!(err.code(), "REMOTE_FAILURE");
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(ChannelError::Disconnected.code(), "CHANNEL_DISCONNECTED");
        assert_eq!(
            ChannelError::CallbackNotFound(CallbackId(3)).code(),
            "CALLBACK_NOT_FOUND"
        );
    }
}
