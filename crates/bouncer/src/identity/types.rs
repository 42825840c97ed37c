//! Keystone v3 token and group documents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `{ "id": ..., "name": ... }` reference to a domain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainRef {
    /// Domain id.
    pub id: String,
    /// Domain name.
    pub name: String,
}

/// Project the token is scoped to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityProject {
    /// Owning domain.
    pub domain: DomainRef,
    /// Project id.
    pub id: String,
    /// Project name.
    pub name: String,
}

/// `{ "id": ... }` reference used by federation metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdRef {
    /// Referenced id.
    pub id: String,
}

/// Federation metadata present on tokens of SSO users.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Federation {
    /// Groups asserted by the identity provider. Only ids are populated.
    pub groups: Vec<IdentityGroup>,
    /// Identity provider.
    pub identity_provider: IdRef,
    /// Federation protocol.
    pub protocol: IdRef,
}

/// User the token was issued to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityUser {
    /// User domain.
    pub domain: DomainRef,
    /// User id.
    pub id: String,
    /// User name.
    pub name: String,
    /// Federation metadata, absent for local users.
    #[serde(rename = "OS-FEDERATION", skip_serializing_if = "Option::is_none")]
    pub federation: Option<Federation>,
}

/// Role assignment carried by a project-scoped token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityRole {
    /// Role id.
    pub id: String,
    /// Role name.
    pub name: String,
}

/// Identity-service group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityGroup {
    /// Group id.
    pub id: String,
    /// Group name; empty when only the id is known.
    pub name: String,
}

/// Project-scoped token body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityToken {
    /// Audit ids.
    pub audit_ids: Vec<String>,
    /// Expiry time.
    pub expires_at: Option<DateTime<Utc>>,
    /// Issue time.
    pub issued_at: Option<DateTime<Utc>>,
    /// Authentication methods used.
    pub methods: Vec<String>,
    /// Scoped project.
    pub project: IdentityProject,
    /// Token owner.
    pub user: IdentityUser,
    /// Roles held on the scoped project.
    pub roles: Vec<IdentityRole>,
}

impl IdentityToken {
    /// Ids of the groups asserted through federation.
    pub fn federated_group_ids(&self) -> impl Iterator<Item = &str> {
        self.user
            .federation
            .iter()
            .flat_map(|federation| federation.groups.iter())
            .map(|group| group.id.as_str())
    }
}

/// A project-scoped token together with its id from `X-Subject-Token`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopedToken {
    /// Token body.
    pub token: IdentityToken,
    /// Token id used to authenticate follow-up queries.
    pub token_id: String,
}

/// `{ "token": ... }` body of a successful authentication.
#[derive(Debug, Deserialize)]
pub(crate) struct AuthResponse {
    pub token: IdentityToken,
}

/// `{ "groups": [...] }` body of the group listings.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct GroupsResponse {
    #[serde(default)]
    pub groups: Vec<IdentityGroup>,
}
