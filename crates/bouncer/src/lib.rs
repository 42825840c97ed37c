//! # Bouncer
//!
//! Kubernetes `TokenReview` webhook backed by a Keystone v3 identity
//! service.
//!
//! A review token is either a Keystone token id (URL-safe base64 whose first
//! byte is the Fernet version `0x80`) or a standard base64 JSON envelope
//! holding a username and password. Either is exchanged for a token scoped
//! to the configured project; the resulting user is reported together with
//! groups mapped from its roles and the groups the identity service reports
//! for it. Decisions are cached in a bounded, expiring LRU cache.
//!
//! ## Modules
//!
//! - [`classify`] - token shape detection and the credential envelope
//! - [`review`] - the `TokenReview` wire envelope
//! - [`cache`] - expiring LRU decision cache
//! - [`identity`] - Keystone client
//! - [`policy`] - role to group mapping
//! - [`authn`] - the authenticator that ties the above together
//! - [`alert`] - slow-request alerts
//! - [`config`] - startup configuration
//! - [`server`] and [`tls`] - HTTP front end

#![warn(missing_docs)]

pub mod alert;
pub mod authn;
pub mod cache;
pub mod classify;
pub mod config;
pub mod error;
pub mod identity;
pub mod policy;
pub mod review;
pub mod server;
pub mod tls;

pub use alert::{AlertConfig, AlertSink};
pub use authn::{Authenticator, AuthenticatorSettings};
pub use cache::{CacheStats, ExpiringLruCache};
pub use classify::{classify, Credentials, TokenKind};
pub use config::{BouncerConfig, BouncerConfigBuilder, ConfigError};
pub use error::{BouncerError, BouncerResult};
pub use identity::{IdentityClient, IdentityError, IdentityService};
pub use policy::RoleMapper;
pub use review::{TokenReview, TokenReviewStatus, UserInfo};
pub use server::{BouncerServer, Router};

/// Crate version, reported by `/version` and in the identity client's
/// User-Agent.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
