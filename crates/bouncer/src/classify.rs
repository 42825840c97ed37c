//! Bearer token classification.
//!
//! A bearer token is either a Keystone Fernet token ID or a base64-encoded
//! JSON credential pair produced by `makecred`. The two encodings are told
//! apart by decoding, never by length or prefix heuristics.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// First byte of every decoded Fernet token.
pub const FERNET_VERSION: u8 = 0x80;

/// Credential decoding failures. Both map to a bad request.
#[derive(Debug, Error)]
pub enum ClassifyError {
    /// Not standard padded base64.
    #[error("decode credentials: {0}")]
    Encoding(#[from] base64::DecodeError),

    /// Decoded bytes are not a credential object.
    #[error("unmarshal credentials: {0}")]
    Envelope(#[from] serde_json::Error),
}

/// Username/password pair carried inside a bearer token.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Identity-service user name.
    pub username: String,
    /// Plaintext password.
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    /// Creates a credential pair.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Encodes the pair as a bearer token.
    ///
    /// # Errors
    ///
    /// Returns the serializer error; string fields never fail in practice.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        let json = serde_json::to_vec(self)?;
        Ok(STANDARD.encode(json))
    }
}

/// What a bearer token turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    /// A Fernet token ID.
    TokenId,
    /// An encoded credential pair.
    Credentials(Credentials),
    /// Neither.
    Unrecognized,
}

/// True if `token` decodes as unpadded URL-safe base64 with the Fernet
/// version byte first.
pub fn is_token_id(token: &str) -> bool {
    URL_SAFE_NO_PAD
        .decode(token)
        .is_ok_and(|bytes| bytes.first() == Some(&FERNET_VERSION))
}

/// True if `token` decodes as standard padded base64.
pub fn is_credentials(token: &str) -> bool {
    STANDARD.decode(token).is_ok()
}

/// Decodes a credentials token.
///
/// # Errors
///
/// Returns `ClassifyError` if the token is not padded base64 or the payload
/// is not a JSON object with string `username` and `password` fields.
pub fn decode_credentials(token: &str) -> Result<Credentials, ClassifyError> {
    let bytes = STANDARD.decode(token)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Classifies a bearer token.
///
/// Token ids are checked first. A decoded credentials payload starts with
/// `{`, never with the Fernet version byte, so the two cannot collide. A
/// base64 token whose payload is not a credentials object is
/// [`TokenKind::Unrecognized`].
pub fn classify(token: &str) -> TokenKind {
    if is_token_id(token) {
        return TokenKind::TokenId;
    }
    match decode_credentials(token) {
        Ok(credentials) => TokenKind::Credentials(credentials),
        Err(_) => TokenKind::Unrecognized,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN_ID: &str = "gAAAAABYt5PWnXGdQUWq6sXo8sj_n_1cOHbQ13F_a6sCMUkqjMjxPEgdtuFnTC4E8HXHwHTENpkn_NEnZKmsO7B8t4v1VL8PRaoILIiyNq-JrvRhDk911QVfb_SzQupPLbiieNGvddQCDve8mnbJkPj4bA_ikem7q-KFz2IhZj7nWFpWxgtVSrU";
    const CREDENTIALS: &str =
        "eyJ1c2VybmFtZSI6ICJkdW1teS11c2VybmFtZSIsICJwYXNzd29yZCI6ICJkdW1teS1wYXNzd29yZCJ9";

    #[test]
    fn test_token_id_fixture() {
        assert!(is_token_id(TOKEN_ID));
        assert!(!is_credentials(TOKEN_ID));
        assert_eq!(classify(TOKEN_ID), TokenKind::TokenId);
    }

    #[test]
    fn test_credentials_fixture() {
        assert!(!is_token_id(CREDENTIALS));
        assert!(is_credentials(CREDENTIALS));
        assert_eq!(
            classify(CREDENTIALS),
            TokenKind::Credentials(Credentials::new("dummy-username", "dummy-password"))
        );
    }

    #[test]
    fn test_wrong_version_byte_is_not_a_token_id() {
        let token = URL_SAFE_NO_PAD.encode([0x81, 1, 2, 3, 4, 5]);
        assert!(!is_token_id(&token));
    }

    #[test]
    fn test_padded_url_safe_is_not_a_token_id() {
        let token = base64::engine::general_purpose::URL_SAFE.encode([0x80, 1, 2, 3, 4]);
        assert!(token.ends_with('='));
        assert!(!is_token_id(&token));
    }

    #[test]
    fn test_garbage_is_unrecognized() {
        assert_eq!(classify("not a token!"), TokenKind::Unrecognized);
        assert_eq!(classify(""), TokenKind::Unrecognized);
    }

    #[test]
    fn test_token_id_valid_in_both_alphabets() {
        // No '-' or '_' and a length divisible by four: also padded base64.
        let token = URL_SAFE_NO_PAD.encode([0x80, 0, 0, 0, 0, 0x58, 0xb7, 0x93, 0xd6, 0x9d, 0x71, 0x9d]);
        assert_eq!(token, "gAAAAABYt5PWnXGd");
        assert!(is_token_id(&token));
        assert!(is_credentials(&token));
        assert_eq!(classify(&token), TokenKind::TokenId);

        let short = STANDARD.encode([0x80, 0x00, 0x00]);
        assert_eq!(classify(&short), TokenKind::TokenId);
    }

    #[test]
    fn test_credentials_with_bad_payload() {
        let token = STANDARD.encode(b"{\"username\": 1}");
        assert!(matches!(
            decode_credentials(&token),
            Err(ClassifyError::Envelope(_))
        ));
        assert_eq!(classify(&token), TokenKind::Unrecognized);

        assert!(matches!(
            decode_credentials("%%%"),
            Err(ClassifyError::Encoding(_))
        ));
    }

    #[test]
    fn test_encode_then_classify() {
        let credentials = Credentials::new("alice", "s3cret/+");
        let token = credentials.encode().unwrap();
        assert_eq!(classify(&token), TokenKind::Credentials(credentials));
    }

    #[test]
    fn test_debug_redacts_password() {
        let credentials = Credentials::new("alice", "hunter2");
        let rendered = format!("{credentials:?}");
        assert!(rendered.contains("alice"));
        assert!(!rendered.contains("hunter2"));
    }
}
