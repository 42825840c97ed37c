//! Keystone v3 identity service access.
//!
//! [`IdentityService`] is the seam the authenticator depends on;
//! [`IdentityClient`] is its HTTP implementation.

mod client;
mod types;

use async_trait::async_trait;
use thiserror::Error;

pub use client::{IdentityClient, DEFAULT_USER_DOMAIN};
pub use types::{
    DomainRef, Federation, IdRef, IdentityGroup, IdentityProject, IdentityRole, IdentityToken,
    IdentityUser, ScopedToken,
};

/// Identity-service failures.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// The base URL does not parse.
    #[error("invalid identity service URL {url:?}: {message}")]
    InvalidBaseUrl {
        /// URL as given.
        url: String,
        /// Parse failure.
        message: String,
    },

    /// The request body could not be encoded.
    #[error("encode identity request: {0}")]
    RequestEncode(#[source] serde_json::Error),

    /// Connection, timeout, or an unexpected status on a group query.
    #[error("send identity request: {message}")]
    Transport {
        /// Failure description.
        message: String,
    },

    /// Authentication answered with a status other than 201.
    #[error("identity response error: {status} - {message}")]
    Response {
        /// HTTP status code.
        status: u16,
        /// Status line, e.g. `401 Unauthorized`.
        message: String,
    },

    /// The response body could not be decoded.
    #[error("decode identity response: {0}")]
    Decode(#[source] serde_json::Error),
}

impl IdentityError {
    /// Create a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// True for a 401 answer, which is a definitive rejection.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Response { status: 401, .. })
    }

    /// Upstream HTTP status, when one was received.
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            Self::Response { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Get the error category for metrics.
    pub fn category(&self) -> &'static str {
        match self {
            Self::InvalidBaseUrl { .. } => "config",
            Self::RequestEncode(_) => "encode",
            Self::Transport { .. } => "transport",
            Self::Response { .. } => "response",
            Self::Decode(_) => "decode",
        }
    }
}

impl From<reqwest::Error> for IdentityError {
    fn from(err: reqwest::Error) -> Self {
        let mut message = err.to_string();
        let mut source = std::error::Error::source(&err);
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        Self::Transport { message }
    }
}

/// Result type for identity-service calls.
pub type IdentityResult<T> = Result<T, IdentityError>;

/// Operations the authenticator needs from the identity service.
#[async_trait]
pub trait IdentityService: Send + Sync {
    /// Exchanges a token id for a token scoped to `project_id`.
    async fn project_token_from_token_id(
        &self,
        token_id: &str,
        project_id: &str,
    ) -> IdentityResult<ScopedToken>;

    /// Password authentication scoped to `project_id`.
    async fn project_token_from_credentials_with_project_id(
        &self,
        username: &str,
        password: &str,
        project_id: &str,
    ) -> IdentityResult<ScopedToken>;

    /// Password authentication scoped to a project named within a domain.
    async fn project_token_from_credentials_with_project_name(
        &self,
        username: &str,
        password: &str,
        project_name: &str,
        domain_id: &str,
    ) -> IdentityResult<ScopedToken>;

    /// Names of all groups the token's user belongs to, federated and local.
    async fn groups_from_project_token(&self, token: &ScopedToken) -> IdentityResult<Vec<String>>;
}
