//! Error types for the bouncer webhook.

use thiserror::Error;

use crate::cache::CacheError;
use crate::classify::ClassifyError;
use crate::config::ConfigError;
use crate::identity::IdentityError;

/// Webhook errors.
#[derive(Debug, Error)]
pub enum BouncerError {
    /// Startup configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Malformed or invalid review request.
    #[error("Bad request: {message}")]
    BadRequest {
        /// Error message. Never echoed to the client.
        message: String,
    },

    /// Request method other than POST on the review endpoint.
    #[error("Method not allowed: {method}")]
    MethodNotAllowed {
        /// Method received.
        method: String,
    },

    /// Identity-service failure.
    #[error("Identity service error: {0}")]
    Identity(#[from] IdentityError),

    /// Decision cache construction failure.
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// TLS material could not be loaded.
    #[error("TLS error: {message}")]
    Tls {
        /// Error message.
        message: String,
    },

    /// Server startup error.
    #[error("Server error: {message}")]
    Server {
        /// Error message.
        message: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Response encoding or validation failure.
    #[error("Internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
    },
}

impl BouncerError {
    /// Create a bad request error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    /// Create a method not allowed error.
    pub fn method_not_allowed(method: impl Into<String>) -> Self {
        Self::MethodNotAllowed {
            method: method.into(),
        }
    }

    /// Create a TLS error.
    pub fn tls(message: impl Into<String>) -> Self {
        Self::Tls {
            message: message.into(),
        }
    }

    /// Create a server error.
    pub fn server(message: impl Into<String>) -> Self {
        Self::Server {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the HTTP status code for this error.
    #[allow(clippy::match_same_arms)]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Config(_) => 500,
            Self::BadRequest { .. } => 400,
            Self::MethodNotAllowed { .. } => 405,
            Self::Identity(_) => 502,
            Self::Cache(_) => 500,
            Self::Tls { .. } => 500,
            Self::Server { .. } => 500,
            Self::Io(_) => 500,
            Self::Internal { .. } => 500,
        }
    }

    /// Get the error category for logs and metrics.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config(_) | Self::Cache(_) => "config",
            Self::BadRequest { .. } => "bad_request",
            Self::MethodNotAllowed { .. } => "method_not_allowed",
            Self::Identity(e) if e.is_unauthorized() => "upstream_401",
            Self::Identity(_) => "upstream",
            Self::Tls { .. } => "tls",
            Self::Server { .. } => "server",
            Self::Io(_) => "io",
            Self::Internal { .. } => "internal",
        }
    }
}

impl From<ClassifyError> for BouncerError {
    fn from(err: ClassifyError) -> Self {
        Self::bad_request(err.to_string())
    }
}

/// Result type for webhook operations.
pub type BouncerResult<T> = Result<T, BouncerError>;
