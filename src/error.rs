//! Error types for the stage system.

use std::sync::Arc;

use thiserror::Error as ThisError;

/// The error type carried on a stage's error channel.
///
/// Errors are cloneable so that bubbling can re-emit the same error value on
/// every linked upstream source without wrapping or mutating it.
#[derive(Debug, Clone, ThisError)]
pub enum Error {
    /// A transform failed while processing an item
    #[error("transform failed: {0}")]
    Transform(Arc<dyn std::error::Error + Send + Sync>),

    /// The abstract extension point was invoked without an implementation
    #[error("{0} must be implemented by the concrete stage")]
    Unimplemented(&'static str),

    /// An item does not expose the requested method
    #[error("`{type_name}` has no method `{method}`")]
    NoSuchMethod {
        type_name: &'static str,
        method: String,
    },

    /// A custom error with a message
    #[error("{0}")]
    Custom(String),
}

// Convenience constructors
impl Error {
    /// Create a transform error from any error type
    pub fn transform<E: std::error::Error + Send + Sync + 'static>(error: E) -> Self {
        Error::Transform(Arc::new(error))
    }

    /// Create a custom error with a message
    pub fn custom<S: Into<String>>(message: S) -> Self {
        Error::Custom(message.into())
    }

    /// Create a missing-method error for an item type
    pub fn no_such_method(type_name: &'static str, method: impl Into<String>) -> Self {
        Error::NoSuchMethod {
            type_name,
            method: method.into(),
        }
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Custom(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Custom(s.to_string())
    }
}

/// Convenience type alias for Results in this crate
pub type Result<T> = std::result::Result<T, Error>;
