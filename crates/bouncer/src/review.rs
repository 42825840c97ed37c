//! `TokenReview` request/response envelope.
//!
//! The Kubernetes API server posts a `TokenReview` carrying `spec.token`;
//! the webhook answers with the same envelope, `spec` stripped and `status`
//! filled in.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Envelope kind.
pub const TOKEN_REVIEW_KIND: &str = "TokenReview";

/// Envelope API version.
pub const TOKEN_REVIEW_API_VERSION: &str = "authentication.k8s.io/v1beta1";

/// Envelope validation failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReviewError {
    /// `kind` is not `TokenReview`.
    #[error("validate metadata: invalid kind {0:?}")]
    InvalidKind(String),

    /// `apiVersion` is not the supported version.
    #[error("validate metadata: invalid apiVersion {0:?}")]
    InvalidApiVersion(String),

    /// Request without `spec`.
    #[error("validate request: missing spec")]
    MissingSpec,

    /// Response without `status`.
    #[error("validate response: missing status")]
    MissingStatus,

    /// Response still carrying `spec`.
    #[error("validate response: spec must be omitted")]
    UnexpectedSpec,

    /// Unauthenticated status carrying a user.
    #[error("validate response: unauthenticated status carries a user")]
    UnexpectedUser,
}

/// A `TokenReview` envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenReview {
    /// API version, always [`TOKEN_REVIEW_API_VERSION`] when valid.
    #[serde(default)]
    pub api_version: String,
    /// Kind, always [`TOKEN_REVIEW_KIND`] when valid.
    #[serde(default)]
    pub kind: String,
    /// Request direction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<TokenReviewSpec>,
    /// Response direction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TokenReviewStatus>,
}

/// Request body of a review.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenReviewSpec {
    /// Opaque bearer token to authenticate.
    #[serde(default)]
    pub token: String,
}

impl std::fmt::Debug for TokenReviewSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenReviewSpec")
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Outcome of a review.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenReviewStatus {
    /// Whether the token was accepted.
    #[serde(default)]
    pub authenticated: bool,
    /// Authenticated user; absent when `authenticated` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserInfo>,
}

/// Identity attached to an authenticated review.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    /// User name.
    pub username: String,
    /// Stable user id.
    pub uid: String,
    /// Group memberships, in emission order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<String>,
}

impl TokenReviewStatus {
    /// An authenticated status for `user`.
    pub fn authenticated(user: UserInfo) -> Self {
        Self {
            authenticated: true,
            user: Some(user),
        }
    }

    /// A rejected status. Never carries a user.
    pub fn unauthenticated() -> Self {
        Self::default()
    }
}

impl TokenReview {
    /// A request envelope for `token`.
    pub fn request(token: impl Into<String>) -> Self {
        Self {
            api_version: TOKEN_REVIEW_API_VERSION.to_string(),
            kind: TOKEN_REVIEW_KIND.to_string(),
            spec: Some(TokenReviewSpec {
                token: token.into(),
            }),
            status: None,
        }
    }

    /// The token carried by a request, if any.
    pub fn token(&self) -> Option<&str> {
        self.spec.as_ref().map(|spec| spec.token.as_str())
    }

    /// Turns a request into its response: `spec` stripped, `status` set.
    #[must_use]
    pub fn into_response(mut self, status: TokenReviewStatus) -> Self {
        self.spec = None;
        self.status = Some(status);
        self
    }

    fn validate_metadata(&self) -> Result<(), ReviewError> {
        if self.kind != TOKEN_REVIEW_KIND {
            return Err(ReviewError::InvalidKind(self.kind.clone()));
        }
        if self.api_version != TOKEN_REVIEW_API_VERSION {
            return Err(ReviewError::InvalidApiVersion(self.api_version.clone()));
        }
        Ok(())
    }

    /// Checks metadata and that `spec` is present.
    pub fn validate_request(&self) -> Result<(), ReviewError> {
        self.validate_metadata()?;
        if self.spec.is_none() {
            return Err(ReviewError::MissingSpec);
        }
        Ok(())
    }

    /// Checks metadata, that `status` is present and `spec` is not, and that
    /// a rejected status carries no user.
    pub fn validate_response(&self) -> Result<(), ReviewError> {
        self.validate_metadata()?;
        if self.spec.is_some() {
            return Err(ReviewError::UnexpectedSpec);
        }
        match &self.status {
            None => Err(ReviewError::MissingStatus),
            Some(status) if !status.authenticated && status.user.is_some() => {
                Err(ReviewError::UnexpectedUser)
            }
            Some(_) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn user() -> UserInfo {
        UserInfo {
            username: "dummy-username".to_string(),
            uid: "dummy-user-id".to_string(),
            groups: Vec::new(),
        }
    }

    #[test]
    fn test_decode_request() {
        let body = r#"{
            "apiVersion": "authentication.k8s.io/v1beta1",
            "kind": "TokenReview",
            "spec": { "token": "abc" }
        }"#;
        let review: TokenReview = serde_json::from_str(body).unwrap();
        assert!(review.validate_request().is_ok());
        assert_eq!(review.token(), Some("abc"));
        assert!(review.status.is_none());
    }

    #[test]
    fn test_request_metadata_validation() {
        let mut review = TokenReview::request("abc");
        review.kind = "SubjectAccessReview".to_string();
        assert_eq!(
            review.validate_request(),
            Err(ReviewError::InvalidKind("SubjectAccessReview".to_string()))
        );

        let mut review = TokenReview::request("abc");
        review.api_version = "authentication.k8s.io/v1".to_string();
        assert!(matches!(
            review.validate_request(),
            Err(ReviewError::InvalidApiVersion(_))
        ));

        let mut review = TokenReview::request("abc");
        review.spec = None;
        assert_eq!(review.validate_request(), Err(ReviewError::MissingSpec));
    }

    #[test]
    fn test_response_strips_spec() {
        let response = TokenReview::request("secret-token")
            .into_response(TokenReviewStatus::authenticated(user()));
        assert!(response.validate_response().is_ok());

        let encoded = serde_json::to_value(&response).unwrap();
        assert_eq!(
            encoded,
            json!({
                "apiVersion": "authentication.k8s.io/v1beta1",
                "kind": "TokenReview",
                "status": {
                    "authenticated": true,
                    "user": { "username": "dummy-username", "uid": "dummy-user-id" }
                }
            })
        );
        assert!(!serde_json::to_string(&response).unwrap().contains("secret-token"));
    }

    #[test]
    fn test_unauthenticated_response_has_no_user() {
        let response =
            TokenReview::request("t").into_response(TokenReviewStatus::unauthenticated());
        let encoded = serde_json::to_value(&response).unwrap();
        assert_eq!(encoded["status"], json!({ "authenticated": false }));

        let mut bogus = response;
        bogus.status = Some(TokenReviewStatus {
            authenticated: false,
            user: Some(user()),
        });
        assert_eq!(bogus.validate_response(), Err(ReviewError::UnexpectedUser));
    }

    #[test]
    fn test_response_validation_requires_status() {
        let mut review = TokenReview::request("t");
        review.spec = None;
        assert_eq!(review.validate_response(), Err(ReviewError::MissingStatus));

        let review = TokenReview::request("t");
        assert_eq!(review.validate_response(), Err(ReviewError::UnexpectedSpec));
    }

    #[test]
    fn test_response_reencodes_identically() {
        let body = r#"{"apiVersion":"authentication.k8s.io/v1beta1","kind":"TokenReview","status":{"authenticated":true,"user":{"username":"u","uid":"1","groups":["b","a"]}}}"#;
        let decoded: TokenReview = serde_json::from_str(body).unwrap();
        let reencoded = serde_json::to_string(&decoded).unwrap();

        let expected: Value = serde_json::from_str(body).unwrap();
        let actual: Value = serde_json::from_str(&reencoded).unwrap();
        assert_eq!(expected, actual);
        assert_eq!(reencoded, body);
    }

    #[test]
    fn test_spec_debug_redacts_token() {
        let review = TokenReview::request("super-secret");
        assert!(!format!("{review:?}").contains("super-secret"));
    }
}
