//! HTTP client for the Keystone v3 API.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bouncer_telemetry::metrics::record_identity_request;
use http::header::CONTENT_TYPE;
use http::StatusCode;
use reqwest::{redirect, Client, Url};
use serde::Serialize;
use tracing::{debug, warn};

use super::types::{AuthResponse, GroupsResponse, IdentityGroup, ScopedToken};
use super::{IdentityError, IdentityResult, IdentityService};

/// Domain password users are looked up in.
pub const DEFAULT_USER_DOMAIN: &str = "default";

const TOKENS_PATH: &str = "v3/auth/tokens?nocatalog";
const SUBJECT_TOKEN_HEADER: &str = "X-Subject-Token";
const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";

#[derive(Debug, Serialize)]
struct AuthRequest<'a> {
    auth: Auth<'a>,
}

#[derive(Debug, Serialize)]
struct Auth<'a> {
    identity: AuthIdentity<'a>,
    scope: AuthScope<'a>,
}

#[derive(Debug, Serialize)]
struct AuthIdentity<'a> {
    methods: [&'static str; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    password: Option<PasswordMethod<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    token: Option<TokenMethod<'a>>,
}

#[derive(Debug, Serialize)]
struct PasswordMethod<'a> {
    user: PasswordUser<'a>,
}

#[derive(Debug, Serialize)]
struct PasswordUser<'a> {
    name: &'a str,
    domain: NamedDomain<'a>,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct NamedDomain<'a> {
    name: &'a str,
}

#[derive(Debug, Serialize)]
struct TokenMethod<'a> {
    id: &'a str,
}

#[derive(Debug, Serialize)]
struct AuthScope<'a> {
    project: ProjectScope<'a>,
}

#[derive(Debug, Default, Serialize)]
struct ProjectScope<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    domain: Option<DomainId<'a>>,
}

#[derive(Debug, Serialize)]
struct DomainId<'a> {
    id: &'a str,
}

impl<'a> AuthRequest<'a> {
    fn token(token_id: &'a str, project: ProjectScope<'a>) -> Self {
        Self {
            auth: Auth {
                identity: AuthIdentity {
                    methods: ["token"],
                    password: None,
                    token: Some(TokenMethod { id: token_id }),
                },
                scope: AuthScope { project },
            },
        }
    }

    fn password(username: &'a str, password: &'a str, project: ProjectScope<'a>) -> Self {
        Self {
            auth: Auth {
                identity: AuthIdentity {
                    methods: ["password"],
                    password: Some(PasswordMethod {
                        user: PasswordUser {
                            name: username,
                            domain: NamedDomain {
                                name: DEFAULT_USER_DOMAIN,
                            },
                            password,
                        },
                    }),
                    token: None,
                },
                scope: AuthScope { project },
            },
        }
    }
}

/// Keystone client.
///
/// Redirects are never followed: any answer other than `201 Created` to an
/// authentication request is reported as [`IdentityError::Response`].
#[derive(Debug, Clone)]
pub struct IdentityClient {
    client: Client,
    base_url: Url,
    timeout: Duration,
}

impl IdentityClient {
    /// Create a client for the service at `base_url`, applying `timeout` to
    /// every request.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::InvalidBaseUrl` if the URL does not parse or
    /// cannot carry a path, and `IdentityError::Transport` if the HTTP client
    /// cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> IdentityResult<Self> {
        let invalid = |message: String| IdentityError::InvalidBaseUrl {
            url: base_url.to_string(),
            message,
        };

        let mut url = Url::parse(base_url).map_err(|e| invalid(e.to_string()))?;
        if url.cannot_be_a_base() {
            return Err(invalid("URL cannot be a base".to_string()));
        }
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }

        let client = Client::builder()
            .timeout(timeout)
            .redirect(redirect::Policy::none())
            .user_agent(format!("bouncer:{} keystone client", crate::VERSION))
            .build()
            .map_err(|e| IdentityError::transport(format!("failed to create client: {e}")))?;

        Ok(Self {
            client,
            base_url: url,
            timeout,
        })
    }

    /// Base URL, always ending in `/`.
    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// Get the timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn endpoint(&self, segments: &[&str]) -> IdentityResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| IdentityError::InvalidBaseUrl {
                url: self.base_url.to_string(),
                message: "URL cannot be a base".to_string(),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn authenticate(&self, request: &AuthRequest<'_>) -> IdentityResult<ScopedToken> {
        let body = serde_json::to_vec(request).map_err(IdentityError::RequestEncode)?;
        let url = self
            .base_url
            .join(TOKENS_PATH)
            .map_err(|e| IdentityError::InvalidBaseUrl {
                url: self.base_url.to_string(),
                message: e.to_string(),
            })?;

        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::CREATED {
            return Err(IdentityError::Response {
                status: status.as_u16(),
                message: status.to_string(),
            });
        }

        let token_id = response
            .headers()
            .get(SUBJECT_TOKEN_HEADER)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let bytes = response.bytes().await?;
        let decoded: AuthResponse = serde_json::from_slice(&bytes).map_err(IdentityError::Decode)?;

        Ok(ScopedToken {
            token: decoded.token,
            token_id,
        })
    }

    async fn fetch_groups(&self, url: Url, token_id: &str) -> IdentityResult<Vec<IdentityGroup>> {
        let response = self
            .client
            .get(url)
            .header(AUTH_TOKEN_HEADER, token_id)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(IdentityError::transport(format!(
                "unexpected status {status} from {}",
                response.url().path()
            )));
        }

        let bytes = response.bytes().await?;
        let decoded: GroupsResponse =
            serde_json::from_slice(&bytes).map_err(IdentityError::Decode)?;
        Ok(decoded.groups)
    }

    /// Groups the token's user is a direct local member of.
    async fn user_groups(&self, token: &ScopedToken) -> IdentityResult<Vec<IdentityGroup>> {
        let url = self.endpoint(&["v3", "users", &token.token.user.id, "groups"])?;
        observe("user_groups", self.fetch_groups(url, &token.token_id).await)
    }

    /// Every group visible to the token, used to resolve ids to names.
    async fn list_groups(&self, token: &ScopedToken) -> IdentityResult<Vec<IdentityGroup>> {
        let url = self.endpoint(&["v3", "groups"])?;
        observe("list_groups", self.fetch_groups(url, &token.token_id).await)
    }
}

fn observe<T>(operation: &'static str, result: IdentityResult<T>) -> IdentityResult<T> {
    let outcome = match &result {
        Ok(_) => "ok",
        Err(e) if e.is_unauthorized() => "unauthorized",
        Err(e) => e.category(),
    };
    record_identity_request(operation, outcome);
    result
}

#[async_trait]
impl IdentityService for IdentityClient {
    async fn project_token_from_token_id(
        &self,
        token_id: &str,
        project_id: &str,
    ) -> IdentityResult<ScopedToken> {
        let request = AuthRequest::token(
            token_id,
            ProjectScope {
                id: Some(project_id),
                ..ProjectScope::default()
            },
        );
        observe("token_id", self.authenticate(&request).await)
    }

    async fn project_token_from_credentials_with_project_id(
        &self,
        username: &str,
        password: &str,
        project_id: &str,
    ) -> IdentityResult<ScopedToken> {
        let request = AuthRequest::password(
            username,
            password,
            ProjectScope {
                id: Some(project_id),
                ..ProjectScope::default()
            },
        );
        observe("credentials", self.authenticate(&request).await)
    }

    async fn project_token_from_credentials_with_project_name(
        &self,
        username: &str,
        password: &str,
        project_name: &str,
        domain_id: &str,
    ) -> IdentityResult<ScopedToken> {
        let request = AuthRequest::password(
            username,
            password,
            ProjectScope {
                id: None,
                name: Some(project_name),
                domain: Some(DomainId { id: domain_id }),
            },
        );
        observe("credentials_by_name", self.authenticate(&request).await)
    }

    async fn groups_from_project_token(&self, token: &ScopedToken) -> IdentityResult<Vec<String>> {
        let mut wanted: Vec<String> = token
            .token
            .federated_group_ids()
            .map(str::to_string)
            .collect();
        wanted.extend(self.user_groups(token).await?.into_iter().map(|g| g.id));
        wanted.sort_unstable();
        wanted.dedup();

        let known = self.list_groups(token).await?;
        let names_by_id: HashMap<&str, &str> = known
            .iter()
            .map(|group| (group.id.as_str(), group.name.as_str()))
            .collect();

        let mut names = Vec::with_capacity(wanted.len());
        for id in &wanted {
            match names_by_id.get(id.as_str()) {
                Some(name) => names.push((*name).to_string()),
                None => warn!(group_id = %id, "group id not found in group listing; dropping"),
            }
        }
        names.sort_unstable();
        names.dedup();

        debug!(count = names.len(), "resolved identity groups");
        Ok(names)
    }
}
