//! Role-to-group mapping.
//!
//! Operators may map identity-service role names to Kubernetes group names
//! through a JSON object such as `{"admin": "system:masters"}`.

use std::collections::HashMap;
use std::path::Path;

use tracing::{info, warn};

use crate::identity::IdentityToken;

/// Where the mapping file is mounted by default.
pub const DEFAULT_ROLE_MAPPING_PATH: &str = "/etc/config/rbac_mappings.json";

/// Maps role names to group names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleMapper {
    mapping: HashMap<String, String>,
}

impl RoleMapper {
    /// Creates a mapper from an explicit mapping.
    pub fn new(mapping: HashMap<String, String>) -> Self {
        Self { mapping }
    }

    /// Parses a JSON object of role name to group name.
    ///
    /// # Errors
    ///
    /// Returns the parse error if `json` is not such an object.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json).map(Self::new)
    }

    /// Loads the mapping file at `path`.
    ///
    /// A missing, unreadable, or malformed file yields an empty mapping.
    pub fn from_file(path: &Path) -> Self {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) => {
                info!(path = %path.display(), error = %e, "role mapping file not loaded; no role groups");
                return Self::default();
            }
        };

        match Self::from_json(&contents) {
            Ok(mapper) => {
                info!(path = %path.display(), roles = mapper.len(), "loaded role mapping");
                mapper
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "invalid role mapping file; no role groups");
                Self::default()
            }
        }
    }

    /// Group names for the token's roles, one per role in role order. An
    /// unmapped role yields an empty group name.
    pub fn groups_from_roles(&self, token: &IdentityToken) -> Vec<String> {
        token
            .roles
            .iter()
            .map(|role| self.mapping.get(&role.name).cloned().unwrap_or_default())
            .collect()
    }

    /// Number of mapped roles.
    pub fn len(&self) -> usize {
        self.mapping.len()
    }

    /// True if no roles are mapped.
    pub fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }
}
