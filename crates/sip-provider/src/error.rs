//! Error types for the SIP provider

use thiserror::Error;

use crate::engine::EngineError;

/// Result type for provider operations
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Errors returned to the caller of a provider command
///
/// Failures reported by the engine through events never show up here; they are
/// folded into the connection state instead (see [`crate::SipErrorType`]).
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Command not allowed in the current connection or call state
    #[error("Invalid state: {message}")]
    InvalidState { message: String },

    /// Command argument rejected
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// Provider could not be assembled from the given configuration
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Engine refused a request synchronously
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// Configuration document could not be parsed
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),

    /// Configuration file could not be read
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProviderError {
    /// Create an invalid state error
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Create an invalid argument error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Whether the error reports caller misuse rather than an engine failure
    pub fn is_usage_error(&self) -> bool {
        matches!(self, Self::InvalidState { .. } | Self::InvalidArgument { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = ProviderError::invalid_state("call already in progress");
        assert_eq!(err.to_string(), "Invalid state: call already in progress");
        assert!(err.is_usage_error());

        let err = ProviderError::from(EngineError::request("bad target"));
        assert_eq!(err.to_string(), "Engine error: Request rejected: bad target");
        assert!(!err.is_usage_error());
    }
}
