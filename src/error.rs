//! Error types for the agon debate engine

use thiserror::Error;

/// Result type alias for agon operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the debate engine
#[derive(Debug, Error)]
pub enum Error {
    /// Unknown or missing entity binding, invalid configuration file
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The model call for a turn failed (network, HTTP status, empty reply)
    #[error("Model invocation error: {entity}: {message}")]
    ModelInvocation {
        /// Entity (or provider) whose call failed
        entity: String,
        /// Transport, HTTP or response detail
        message: String,
    },

    /// The model call for a turn did not finish in time
    #[error("Model timed out: {entity} after {seconds}s")]
    ModelTimeout {
        /// Entity (or provider) whose call timed out
        entity: String,
        /// Timeout that elapsed
        seconds: u64,
    },

    /// Conversation memory backend failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// The in-flight turn was cancelled before it committed
    #[error("Turn cancelled: {0}")]
    Cancelled(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML configuration parse error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a model invocation error
    pub fn invocation(entity: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ModelInvocation {
            entity: entity.into(),
            message: message.into(),
        }
    }

    /// Create a model timeout error
    pub fn timeout(entity: impl Into<String>, seconds: u64) -> Self {
        Self::ModelTimeout {
            entity: entity.into(),
            seconds,
        }
    }

    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Whether retrying the same turn can succeed.
    ///
    /// Failed turns never commit, so the caller may retry any of these
    /// without touching the session.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ModelInvocation { .. }
                | Self::ModelTimeout { .. }
                | Self::Cancelled(_)
                | Self::Storage(_)
        )
    }
}

impl From<sled::Error> for Error {
    fn from(err: sled::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        assert!(Error::invocation("moderator", "503").is_recoverable());
        assert!(Error::timeout("contestant_a", 30).is_recoverable());
        assert!(Error::storage("backend gone").is_recoverable());
        assert!(!Error::config("missing binding").is_recoverable());
        assert!(!Error::invalid_input("empty topic").is_recoverable());
    }

    #[test]
    fn test_display_includes_entity() {
        let err = Error::timeout("contestant_b", 120);
        assert_eq!(err.to_string(), "Model timed out: contestant_b after 120s");
    }
}
