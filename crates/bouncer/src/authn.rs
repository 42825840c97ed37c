//! TokenReview authentication.
//!
//! The [`Authenticator`] decodes a review, classifies its bearer token and
//! settles it either from the decision cache or through the identity
//! service. Positive decisions and 401-confirmed rejections are cached; any
//! other identity-service failure yields an uncached rejection so an outage
//! does not outlive itself in the cache.
//!
//! Token ids are cached under the raw id. Credentials are cached under the
//! username together with a bcrypt hash of the password, so a cached
//! decision is only reused for the same password.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bouncer_telemetry::metrics::record_cache_lookup;
use tracing::{debug, info, warn};

use crate::alert::{AlertSink, SLOW_REQUEST_THRESHOLD};
use crate::cache::{CacheStats, ExpiringLruCache};
use crate::classify::{classify, Credentials, TokenKind};
use crate::config::BouncerConfig;
use crate::error::{BouncerError, BouncerResult};
use crate::identity::{IdentityError, IdentityResult, IdentityService, ScopedToken};
use crate::policy::RoleMapper;
use crate::review::{TokenReview, TokenReviewStatus, UserInfo};

const TOKEN_KIND: &str = "token";
const CREDENTIALS_KIND: &str = "credentials";

/// A cached review outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CachedDecision {
    /// Outcome for a token id, keyed by the id.
    TokenId(TokenReviewStatus),
    /// Outcome for a credential pair, keyed by the username.
    Credentials {
        /// bcrypt hash of the password that produced `status`.
        hashed_password: String,
        /// Review outcome.
        status: TokenReviewStatus,
    },
}

/// Authenticator tunables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatorSettings {
    /// Project every scoped token is bound to.
    pub project_id: String,
    /// TTL of a positive decision.
    pub auth_ttl: Duration,
    /// TTL of a 401-confirmed negative decision.
    pub unauth_ttl: Duration,
    /// Decision cache capacity.
    pub cache_size: usize,
    /// Cost of hashing cached passwords.
    pub bcrypt_cost: u32,
    /// Credentials reviews slower than this raise an alert.
    pub slow_request_threshold: Duration,
}

impl From<&BouncerConfig> for AuthenticatorSettings {
    fn from(config: &BouncerConfig) -> Self {
        Self {
            project_id: config.project_id.clone(),
            auth_ttl: config.auth_ttl,
            unauth_ttl: config.unauth_ttl,
            cache_size: config.cache_size,
            bcrypt_cost: config.bcrypt_cost,
            slow_request_threshold: SLOW_REQUEST_THRESHOLD,
        }
    }
}

/// Settles TokenReview requests.
pub struct Authenticator {
    identity: Arc<dyn IdentityService>,
    roles: RoleMapper,
    cache: ExpiringLruCache<String, CachedDecision>,
    settings: AuthenticatorSettings,
    alerts: AlertSink,
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("roles", &self.roles.len())
            .field("cache", &self.cache.stats())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Authenticator {
    /// Create an authenticator.
    ///
    /// # Errors
    ///
    /// Returns `BouncerError::Cache` when the cache size is zero.
    pub fn new(
        identity: Arc<dyn IdentityService>,
        roles: RoleMapper,
        settings: AuthenticatorSettings,
        alerts: AlertSink,
    ) -> BouncerResult<Self> {
        let cache = ExpiringLruCache::new(settings.cache_size)?;
        Ok(Self {
            identity,
            roles,
            cache,
            settings,
            alerts,
        })
    }

    /// Decision cache statistics.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Settles the JSON-encoded review in `body`.
    ///
    /// # Errors
    ///
    /// Returns `BouncerError::BadRequest` for an undecodable or invalid
    /// request or an unrecognized token, and `BouncerError::Internal` if the
    /// response fails validation. Error messages never contain the token.
    pub async fn review(&self, body: &[u8]) -> BouncerResult<TokenReview> {
        let request: TokenReview = serde_json::from_slice(body)
            .map_err(|_| BouncerError::bad_request("decode tokenreview request"))?;
        request
            .validate_request()
            .map_err(|_| BouncerError::bad_request("validate tokenreview request"))?;

        let token = request.token().unwrap_or_default();
        let status = match classify(token) {
            TokenKind::TokenId => self.authenticate_token_id(token).await,
            TokenKind::Credentials(credentials) => self.authenticate_credentials(credentials).await,
            TokenKind::Unrecognized => {
                return Err(BouncerError::bad_request("unrecognized token format"));
            }
        };

        let response = request.into_response(status);
        response
            .validate_response()
            .map_err(|e| BouncerError::internal(format!("validate tokenreview response: {e}")))?;
        Ok(response)
    }

    /// Settles a token id.
    pub async fn authenticate_token_id(&self, token_id: &str) -> TokenReviewStatus {
        match self.cache.get(token_id) {
            Some(CachedDecision::TokenId(status)) => {
                record_cache_lookup(TOKEN_KIND, "hit");
                debug!(event = "cache_hit", kind = TOKEN_KIND);
                return status;
            }
            Some(CachedDecision::Credentials { .. }) => {
                record_cache_lookup(TOKEN_KIND, "shape_mismatch");
                warn!(event = "cache_shape_mismatch", kind = TOKEN_KIND, "treating as miss");
            }
            None => record_cache_lookup(TOKEN_KIND, "miss"),
        }

        let result = self
            .identity
            .project_token_from_token_id(token_id, &self.settings.project_id)
            .await;

        if let Some((status, ttl)) = self.settle(TOKEN_KIND, result).await {
            self.cache
                .add(token_id.to_string(), CachedDecision::TokenId(status.clone()), ttl);
            status
        } else {
            TokenReviewStatus::unauthenticated()
        }
    }

    /// Settles a credential pair, raising an alert when it is slow.
    pub async fn authenticate_credentials(&self, credentials: Credentials) -> TokenReviewStatus {
        let started = Instant::now();
        let status = self.credentials_status(credentials).await;
        let elapsed = started.elapsed();
        if elapsed > self.settings.slow_request_threshold {
            self.alerts.notify_slow_request(elapsed);
        }
        status
    }

    async fn credentials_status(&self, credentials: Credentials) -> TokenReviewStatus {
        let Credentials { username, password } = credentials;

        match self.cache.get(username.as_str()) {
            Some(CachedDecision::Credentials {
                hashed_password,
                status,
            }) => {
                if verify_password(password.clone(), hashed_password).await {
                    record_cache_lookup(CREDENTIALS_KIND, "hit");
                    debug!(event = "cache_hit", kind = CREDENTIALS_KIND);
                    return status;
                }
                record_cache_lookup(CREDENTIALS_KIND, "stale_password");
                debug!(event = "cache_stale_password", kind = CREDENTIALS_KIND);
            }
            Some(CachedDecision::TokenId(_)) => {
                record_cache_lookup(CREDENTIALS_KIND, "shape_mismatch");
                warn!(
                    event = "cache_shape_mismatch",
                    kind = CREDENTIALS_KIND,
                    "treating as miss"
                );
            }
            None => record_cache_lookup(CREDENTIALS_KIND, "miss"),
        }

        let result = self
            .identity
            .project_token_from_credentials_with_project_id(
                &username,
                &password,
                &self.settings.project_id,
            )
            .await;

        let Some((status, ttl)) = self.settle(CREDENTIALS_KIND, result).await else {
            return TokenReviewStatus::unauthenticated();
        };

        if let Some(hashed_password) = hash_password(password, self.settings.bcrypt_cost).await {
            self.cache.add(
                username,
                CachedDecision::Credentials {
                    hashed_password,
                    status: status.clone(),
                },
                ttl,
            );
        }
        status
    }

    /// Turns an identity-service answer into a status and the TTL to cache
    /// it for. `None` means the rejection must not be cached.
    async fn settle(
        &self,
        kind: &'static str,
        result: IdentityResult<ScopedToken>,
    ) -> Option<(TokenReviewStatus, Duration)> {
        match result {
            Ok(token) => {
                let status = self.authenticated_status(&token).await;
                info!(
                    event = "authenticated",
                    kind,
                    username = %token.token.user.name,
                    "review accepted"
                );
                Some((status, self.settings.auth_ttl))
            }
            Err(e) if e.is_unauthorized() => {
                info!(event = "rejected", kind, upstream_status = 401, "review rejected");
                Some((TokenReviewStatus::unauthenticated(), self.settings.unauth_ttl))
            }
            Err(e) => {
                log_identity_failure(kind, &e);
                None
            }
        }
    }

    /// Authenticated status for `token`: mapped role groups first, then the
    /// identity-service groups.
    async fn authenticated_status(&self, token: &ScopedToken) -> TokenReviewStatus {
        let mut groups = self.roles.groups_from_roles(&token.token);
        match self.identity.groups_from_project_token(token).await {
            Ok(identity_groups) => groups.extend(identity_groups),
            Err(e) => warn!(
                event = "group_lookup_failed",
                error = %e,
                "continuing with role-mapped groups only"
            ),
        }

        TokenReviewStatus::authenticated(UserInfo {
            username: token.token.user.name.clone(),
            uid: token.token.user.id.clone(),
            groups,
        })
    }
}

fn log_identity_failure(kind: &'static str, error: &IdentityError) {
    warn!(
        event = "identity_unavailable",
        kind,
        upstream_status = error.upstream_status(),
        category = error.category(),
        error = %error,
        "review rejected without caching"
    );
}

async fn hash_password(password: String, cost: u32) -> Option<String> {
    match tokio::task::spawn_blocking(move || bcrypt::hash(password, cost)).await {
        Ok(Ok(hash)) => Some(hash),
        Ok(Err(e)) => {
            warn!(error = %e, "cannot add to cache: hash password");
            None
        }
        Err(e) => {
            warn!(error = %e, "cannot add to cache: hashing task failed");
            None
        }
    }
}

async fn verify_password(password: String, hash: String) -> bool {
    matches!(
        tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash)).await,
        Ok(Ok(true))
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::AlertConfig;
    use crate::identity::{IdentityRole, IdentityToken, IdentityUser};
    use async_trait::async_trait;
    use base64::Engine;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TOKEN_ID: &str = "gAAAAABYt5PWnXGdQUWq6sXo8sj_n_1cOHbQ13F_a6sCMUkqjMjxPEgdtuFnTC4E8HXHwHTENpkn_NEnZKmsO7B8t4v1VL8PRaoILIiyNq-JrvRhDk911QVfb_SzQupPLbiieNGvddQCDve8mnbJkPj4bA_ikem7q-KFz2IhZj7nWFpWxgtVSrU";
    const CREDENTIALS: &str =
        "eyJ1c2VybmFtZSI6ICJkdW1teS11c2VybmFtZSIsICJwYXNzd29yZCI6ICJkdW1teS1wYXNzd29yZCJ9";

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Upstream {
        Up,
        Outage,
    }

    /// Identity service double: accepts `TOKEN_ID` and one password per
    /// user, answers 401 otherwise, and counts every call.
    struct FakeIdentity {
        upstream: Mutex<Upstream>,
        passwords: Mutex<HashMap<String, String>>,
        groups: Result<Vec<String>, ()>,
        roles: Vec<String>,
        delay: Duration,
        token_calls: AtomicUsize,
        credential_calls: AtomicUsize,
    }

    impl FakeIdentity {
        fn new() -> Self {
            let mut passwords = HashMap::new();
            passwords.insert("dummy-username".to_string(), "dummy-password".to_string());
            Self {
                upstream: Mutex::new(Upstream::Up),
                passwords: Mutex::new(passwords),
                groups: Ok(Vec::new()),
                roles: Vec::new(),
                delay: Duration::ZERO,
                token_calls: AtomicUsize::new(0),
                credential_calls: AtomicUsize::new(0),
            }
        }

        fn with_groups(mut self, groups: Result<Vec<String>, ()>) -> Self {
            self.groups = groups;
            self
        }

        fn with_roles(mut self, roles: &[&str]) -> Self {
            self.roles = roles.iter().map(|name| (*name).to_string()).collect();
            self
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        fn set_upstream(&self, upstream: Upstream) {
            *self.upstream.lock() = upstream;
        }

        fn set_password(&self, username: &str, password: &str) {
            self.passwords
                .lock()
                .insert(username.to_string(), password.to_string());
        }

        fn token_calls(&self) -> usize {
            self.token_calls.load(Ordering::SeqCst)
        }

        fn credential_calls(&self) -> usize {
            self.credential_calls.load(Ordering::SeqCst)
        }

        fn check_upstream(&self) -> IdentityResult<()> {
            match *self.upstream.lock() {
                Upstream::Up => Ok(()),
                Upstream::Outage => Err(IdentityError::transport("connection refused")),
            }
        }

        fn scoped_token(&self, username: &str) -> ScopedToken {
            ScopedToken {
                token: IdentityToken {
                    user: IdentityUser {
                        id: "dummy-user-id".to_string(),
                        name: username.to_string(),
                        ..IdentityUser::default()
                    },
                    roles: self
                        .roles
                        .iter()
                        .enumerate()
                        .map(|(i, name)| IdentityRole {
                            id: format!("r{}", i + 1),
                            name: name.clone(),
                        })
                        .collect(),
                    ..IdentityToken::default()
                },
                token_id: "scoped".to_string(),
            }
        }

        fn unauthorized() -> IdentityError {
            IdentityError::Response {
                status: 401,
                message: "401 Unauthorized".to_string(),
            }
        }
    }

    #[async_trait]
    impl IdentityService for FakeIdentity {
        async fn project_token_from_token_id(
            &self,
            token_id: &str,
            project_id: &str,
        ) -> IdentityResult<ScopedToken> {
            self.token_calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(project_id, "dummy-project-id");
            self.check_upstream()?;
            if token_id == TOKEN_ID {
                Ok(self.scoped_token("dummy-username"))
            } else {
                Err(Self::unauthorized())
            }
        }

        async fn project_token_from_credentials_with_project_id(
            &self,
            username: &str,
            password: &str,
            project_id: &str,
        ) -> IdentityResult<ScopedToken> {
            self.credential_calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(project_id, "dummy-project-id");
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.check_upstream()?;
            if self.passwords.lock().get(username).map(String::as_str) == Some(password) {
                Ok(self.scoped_token(username))
            } else {
                Err(Self::unauthorized())
            }
        }

        async fn project_token_from_credentials_with_project_name(
            &self,
            _username: &str,
            _password: &str,
            _project_name: &str,
            _domain_id: &str,
        ) -> IdentityResult<ScopedToken> {
            Err(IdentityError::transport("not used by the authenticator"))
        }

        async fn groups_from_project_token(
            &self,
            _token: &ScopedToken,
        ) -> IdentityResult<Vec<String>> {
            self.groups
                .clone()
                .map_err(|()| IdentityError::transport("groups unavailable"))
        }
    }

    fn settings() -> AuthenticatorSettings {
        AuthenticatorSettings {
            project_id: "dummy-project-id".to_string(),
            auth_ttl: Duration::from_secs(300),
            unauth_ttl: Duration::from_secs(60),
            cache_size: 16,
            bcrypt_cost: 4,
            slow_request_threshold: SLOW_REQUEST_THRESHOLD,
        }
    }

    fn authenticator_with(
        identity: Arc<FakeIdentity>,
        roles: RoleMapper,
        settings: AuthenticatorSettings,
        alerts: AlertConfig,
    ) -> Authenticator {
        Authenticator::new(identity, roles, settings, AlertSink::new(alerts).unwrap()).unwrap()
    }

    fn authenticator(identity: Arc<FakeIdentity>) -> Authenticator {
        authenticator_with(
            identity,
            RoleMapper::default(),
            settings(),
            AlertConfig::default(),
        )
    }

    fn request(token: &str) -> Vec<u8> {
        serde_json::to_vec(&TokenReview::request(token)).unwrap()
    }

    fn credentials_token(username: &str, password: &str) -> String {
        Credentials::new(username, password).encode().unwrap()
    }

    fn authenticated_body() -> serde_json::Value {
        json!({
            "apiVersion": "authentication.k8s.io/v1beta1",
            "kind": "TokenReview",
            "status": {
                "authenticated": true,
                "user": { "username": "dummy-username", "uid": "dummy-user-id" }
            }
        })
    }

    fn rejected_body() -> serde_json::Value {
        json!({
            "apiVersion": "authentication.k8s.io/v1beta1",
            "kind": "TokenReview",
            "status": { "authenticated": false }
        })
    }

    async fn review_json(authn: &Authenticator, token: &str) -> serde_json::Value {
        let response = authn.review(&request(token)).await.unwrap();
        serde_json::to_value(response).unwrap()
    }

    #[test]
    fn test_zero_cache_size_rejected() {
        let result = Authenticator::new(
            Arc::new(FakeIdentity::new()),
            RoleMapper::default(),
            AuthenticatorSettings {
                cache_size: 0,
                ..settings()
            },
            AlertSink::new(AlertConfig::default()).unwrap(),
        );
        assert!(matches!(result, Err(BouncerError::Cache(_))));
    }

    #[tokio::test]
    async fn test_token_id_success() {
        let identity = Arc::new(FakeIdentity::new());
        let authn = authenticator(identity.clone());

        assert_eq!(review_json(&authn, TOKEN_ID).await, authenticated_body());
        assert_eq!(review_json(&authn, TOKEN_ID).await, authenticated_body());
        assert_eq!(identity.token_calls(), 1);
    }

    #[tokio::test]
    async fn test_credentials_success_is_cached() {
        let identity = Arc::new(FakeIdentity::new());
        let authn = authenticator(identity.clone());

        assert_eq!(review_json(&authn, CREDENTIALS).await, authenticated_body());
        assert_eq!(review_json(&authn, CREDENTIALS).await, authenticated_body());
        assert_eq!(identity.credential_calls(), 1);
        assert_eq!(authn.cache_stats().size, 1);
    }

    #[tokio::test]
    async fn test_credentials_rejection_is_cached() {
        let identity = Arc::new(FakeIdentity::new());
        let authn = authenticator(identity.clone());
        let token = credentials_token("dummy-username", "wrong");

        assert_eq!(review_json(&authn, &token).await, rejected_body());
        assert_eq!(review_json(&authn, &token).await, rejected_body());
        assert_eq!(identity.credential_calls(), 1);
    }

    #[tokio::test]
    async fn test_credentials_outage_is_not_cached() {
        let identity = Arc::new(FakeIdentity::new());
        identity.set_upstream(Upstream::Outage);
        let authn = authenticator(identity.clone());

        assert_eq!(review_json(&authn, CREDENTIALS).await, rejected_body());
        assert_eq!(review_json(&authn, CREDENTIALS).await, rejected_body());
        assert_eq!(identity.credential_calls(), 2);
        assert_eq!(authn.cache_stats().size, 0);

        identity.set_upstream(Upstream::Up);
        assert_eq!(review_json(&authn, CREDENTIALS).await, authenticated_body());
    }

    #[tokio::test]
    async fn test_token_id_outage_is_not_cached() {
        let identity = Arc::new(FakeIdentity::new());
        identity.set_upstream(Upstream::Outage);
        let authn = authenticator(identity.clone());

        assert_eq!(review_json(&authn, TOKEN_ID).await, rejected_body());
        assert_eq!(review_json(&authn, TOKEN_ID).await, rejected_body());
        assert_eq!(identity.token_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_id_rejection_expires() {
        let identity = Arc::new(FakeIdentity::new());
        let authn = authenticator(identity.clone());
        let unknown = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .encode([0x80, 1, 2, 3, 4, 5, 6, 7]);
        let unknown = unknown.as_str();
        assert_eq!(classify(unknown), TokenKind::TokenId);

        assert_eq!(review_json(&authn, unknown).await, rejected_body());
        assert_eq!(review_json(&authn, unknown).await, rejected_body());
        assert_eq!(identity.token_calls(), 1);

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(review_json(&authn, unknown).await, rejected_body());
        assert_eq!(identity.token_calls(), 2);
    }

    #[tokio::test]
    async fn test_password_change_bypasses_cache() {
        let identity = Arc::new(FakeIdentity::new());
        let authn = authenticator(identity.clone());
        let first = credentials_token("u", "p1");
        let second = credentials_token("u", "p2");

        identity.set_password("u", "p1");
        let status = authn.review(&request(&first)).await.unwrap().status.unwrap();
        assert!(status.authenticated);

        identity.set_password("u", "p2");
        let status = authn.review(&request(&second)).await.unwrap().status.unwrap();
        assert!(status.authenticated);
        assert_eq!(identity.credential_calls(), 2);

        // The entry now holds the p2 hash.
        authn.review(&request(&second)).await.unwrap();
        assert_eq!(identity.credential_calls(), 2);
    }

    #[tokio::test]
    async fn test_cached_success_not_reused_for_wrong_password() {
        let identity = Arc::new(FakeIdentity::new());
        let authn = authenticator(identity.clone());

        assert_eq!(review_json(&authn, CREDENTIALS).await, authenticated_body());
        let wrong = credentials_token("dummy-username", "guess");
        assert_eq!(review_json(&authn, &wrong).await, rejected_body());
        assert_eq!(identity.credential_calls(), 2);
    }

    #[tokio::test]
    async fn test_groups_mapped_roles_first() {
        let identity = Arc::new(
            FakeIdentity::new()
                .with_roles(&["admin"])
                .with_groups(Ok(vec!["name1".to_string(), "name3".to_string()])),
        );
        let roles = RoleMapper::from_json(r#"{"admin": "system:masters"}"#).unwrap();
        let authn = authenticator_with(identity, roles, settings(), AlertConfig::default());

        let body = review_json(&authn, TOKEN_ID).await;
        assert_eq!(
            body["status"]["user"]["groups"],
            json!(["system:masters", "name1", "name3"])
        );
    }

    #[tokio::test]
    async fn test_group_failure_keeps_mapped_groups() {
        let identity = Arc::new(
            FakeIdentity::new()
                .with_roles(&["admin"])
                .with_groups(Err(())),
        );
        let roles = RoleMapper::from_json(r#"{"admin": "system:masters"}"#).unwrap();
        let authn = authenticator_with(identity, roles, settings(), AlertConfig::default());

        let body = review_json(&authn, CREDENTIALS).await;
        assert_eq!(body["status"]["authenticated"], true);
        assert_eq!(body["status"]["user"]["groups"], json!(["system:masters"]));
    }

    #[tokio::test]
    async fn test_unmapped_roles_report_empty_groups() {
        let identity = Arc::new(
            FakeIdentity::new()
                .with_roles(&["a", "b"])
                .with_groups(Ok(vec!["name1".to_string()])),
        );
        let roles = RoleMapper::from_json(r#"{"a": "g1"}"#).unwrap();
        let authn = authenticator_with(identity, roles, settings(), AlertConfig::default());

        let body = review_json(&authn, TOKEN_ID).await;
        assert_eq!(body["status"]["user"]["groups"], json!(["g1", "", "name1"]));
    }

    #[tokio::test]
    async fn test_shape_mismatch_is_a_miss() {
        let identity = Arc::new(FakeIdentity::new());
        identity.set_password(TOKEN_ID, "pw");
        let authn = authenticator(identity.clone());

        // A username equal to a token id shares its cache key.
        let token = credentials_token(TOKEN_ID, "pw");
        let status = authn.review(&request(&token)).await.unwrap().status.unwrap();
        assert!(status.authenticated);
        assert_eq!(review_json(&authn, TOKEN_ID).await, authenticated_body());
        assert_eq!(identity.token_calls(), 1);

        authn.review(&request(&token)).await.unwrap();
        assert_eq!(identity.credential_calls(), 2);
    }

    #[tokio::test]
    async fn test_bad_requests() {
        let authn = authenticator(Arc::new(FakeIdentity::new()));

        let err = authn.review(b"{not json").await.unwrap_err();
        assert_eq!(err.status_code(), 400);

        let mut wrong_kind = TokenReview::request(TOKEN_ID);
        wrong_kind.kind = "SubjectAccessReview".to_string();
        let err = authn
            .review(&serde_json::to_vec(&wrong_kind).unwrap())
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);

        let err = authn.review(&request("not base64!")).await.unwrap_err();
        assert_eq!(err.status_code(), 400);

        let err = authn
            .review(br#"{"apiVersion":"authentication.k8s.io/v1beta1","kind":"TokenReview"}"#)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn test_bad_request_message_omits_token() {
        let authn = authenticator(Arc::new(FakeIdentity::new()));
        let err = authn
            .review(&request("c2VjcmV0LXBheWxvYWQ="))
            .await
            .unwrap_err();
        assert!(!err.to_string().contains("c2VjcmV0"));
        assert!(!err.to_string().contains("secret-payload"));
    }

    #[tokio::test]
    async fn test_slow_credentials_review_raises_alert() {
        use wiremock::matchers::{body_json, method};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_json(json!({
                "text": "host=h du=d cluster=c: authentication took too long"
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let identity = Arc::new(FakeIdentity::new().with_delay(Duration::from_millis(50)));
        let alerts = AlertConfig {
            webhook_url: Some(server.uri()),
            host_name: "h".to_string(),
            du_fqdn: "d".to_string(),
            cluster_id: "c".to_string(),
        };
        let authn = authenticator_with(
            identity,
            RoleMapper::default(),
            AuthenticatorSettings {
                slow_request_threshold: Duration::from_millis(10),
                ..settings()
            },
            alerts,
        );

        assert_eq!(review_json(&authn, CREDENTIALS).await, authenticated_body());

        for _ in 0..50 {
            if !server.received_requests().await.unwrap_or_default().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}
