//! Resolution error types.

use thiserror::Error;

/// Errors surfaced while deriving contexts or resolving services.
///
/// Every variant is synchronous and propagates straight to the caller; the
/// resolver never swallows or retries one.
#[derive(Error, Debug)]
pub enum DiError {
    // Configuration errors
    #[error("Invalid provider: {0}")]
    Configuration(String),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    // Resolution errors
    #[error("Circular dependency detected while resolving {service}: {path}")]
    CircularDependency { service: String, path: String },

    #[error("Cannot construct abstract service '{service}': no concrete mapping or constructor")]
    UnresolvedAbstractType { service: String },

    #[error("Injector for '{service}' outlived the context that constructed it")]
    ContextReleased { service: String },

    // Construction errors
    #[error("Argument {index} of '{service}' is not a {expected}")]
    ArgumentMismatch {
        service: String,
        index: usize,
        expected: &'static str,
    },

    #[error("Failed to construct '{service}': {message}")]
    Construction { service: String, message: String },

    // Cache errors
    #[error(
        "Singleton cache for '{service}' is keyed by {expected} dependencies but lookup used {actual}"
    )]
    InternalConsistency {
        service: String,
        expected: usize,
        actual: usize,
    },
}

impl DiError {
    /// Shorthand for a constructor reporting its own failure.
    pub fn construction(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Construction {
            service: service.into(),
            message: message.into(),
        }
    }
}

pub type Result<T, E = DiError> = std::result::Result<T, E>;
