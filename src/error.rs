//! Error types for a3s-dispatch

use thiserror::Error;

/// Errors that can occur in the dispatch core
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Missing or wrongly-typed argument
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Structural naming violation (wrong segment count, separators, case)
    #[error("Malformed event name '{name}': {reason}")]
    MalformedName { name: String, reason: String },

    /// A segment outside its closed vocabulary
    #[error("Invalid {segment} component: '{value}'")]
    InvalidComponent { segment: String, value: String },

    /// Priority outside [0, 500)
    #[error("Invalid priority {0}: must be in [0, 500)")]
    InvalidPriority(u32),

    /// Migration validation requested for a platform that is not supported
    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    /// A named validation layer failed its check
    #[error("Validation failed in layer '{layer}': {reason}")]
    ValidationFailure { layer: String, reason: String },

    /// A subscriber reported failure while handling an event
    #[error("Handler error: {0}")]
    Handler(String),

    /// Serialization/deserialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl DispatchError {
    /// Shorthand for a handler failure with a message
    pub fn handler(msg: impl Into<String>) -> Self {
        Self::Handler(msg.into())
    }
}

/// Result type alias for dispatch operations
pub type Result<T> = std::result::Result<T, DispatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_the_offender() {
        let err = DispatchError::InvalidComponent {
            segment: "platform".to_string(),
            value: "NOOK".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid platform component: 'NOOK'");

        let err = DispatchError::InvalidPriority(512);
        assert!(err.to_string().contains("512"));
    }

    #[test]
    fn test_serde_error_converts() {
        let parse: std::result::Result<serde_json::Value, _> = serde_json::from_str("{");
        let err: DispatchError = parse.unwrap_err().into();
        assert!(matches!(err, DispatchError::Serialization(_)));
    }
}
