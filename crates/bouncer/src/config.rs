//! Configuration for the bouncer webhook.

use std::path::PathBuf;
use std::time::Duration;

use bouncer_telemetry::{normalize_interval, DEFAULT_LOG_STATS_INTERVAL};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::alert::AlertConfig;
use crate::policy::DEFAULT_ROLE_MAPPING_PATH;

/// Default TTL of a positive decision.
pub const DEFAULT_AUTH_TTL: Duration = Duration::from_secs(5 * 60);
/// Default TTL of a 401-confirmed negative decision.
pub const DEFAULT_UNAUTH_TTL: Duration = Duration::from_secs(60);
/// Default per-call identity-service timeout.
pub const DEFAULT_IDENTITY_TIMEOUT: Duration = Duration::from_secs(30);
/// Default decision cache capacity.
pub const DEFAULT_CACHE_SIZE: usize = 2048;
/// Default bcrypt cost.
pub const DEFAULT_BCRYPT_COST: u32 = 7;
/// Smallest bcrypt cost accepted.
pub const MIN_BCRYPT_COST: u32 = 4;
/// Largest bcrypt cost accepted.
pub const MAX_BCRYPT_COST: u32 = 31;
/// Longest TTL or timeout accepted.
pub const MAX_DURATION: Duration = Duration::from_secs(365 * 24 * 3600);

/// Configuration errors. All are fatal at startup.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A required value is empty.
    #[error("{0} is required")]
    Missing(&'static str),

    /// The identity URL is not http(s).
    #[error("identity-url must start with http:// or https://, got {0:?}")]
    InvalidIdentityUrl(String),

    /// Cache capacity of zero.
    #[error("cache-size must be at least 1")]
    ZeroCacheSize,

    /// A TTL or timeout exceeds `MAX_DURATION`.
    #[error("{0} must not exceed one year")]
    DurationTooLong(&'static str),

    /// Some but not all of the TLS files were given.
    #[error("must set all or none of ca-file, cert-file, key-file ({0} of 3 set)")]
    PartialTls(usize),
}

/// Files enabling mutual TLS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsFiles {
    /// CA bundle client certificates are verified against.
    pub ca_file: PathBuf,
    /// Server certificate chain.
    pub cert_file: PathBuf,
    /// Server private key.
    pub key_file: PathBuf,
}

/// Webhook configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BouncerConfig {
    /// Listen address, `host:port` or `:port`.
    pub addr: String,
    /// Identity service base URL.
    pub identity_url: String,
    /// Project every scoped token is bound to.
    pub project_id: String,
    /// TTL of a positive decision.
    #[serde(with = "duration_format")]
    pub auth_ttl: Duration,
    /// TTL of a 401-confirmed negative decision.
    #[serde(with = "duration_format")]
    pub unauth_ttl: Duration,
    /// Per-call identity-service timeout.
    #[serde(with = "duration_format")]
    pub identity_timeout: Duration,
    /// Decision cache capacity.
    pub cache_size: usize,
    /// Cost of hashing cached passwords.
    pub bcrypt_cost: u32,
    /// Latency summary interval.
    #[serde(with = "duration_format")]
    pub log_stats_interval: Duration,
    /// CA certificate file.
    pub ca_file: Option<PathBuf>,
    /// Server certificate file.
    pub cert_file: Option<PathBuf>,
    /// Server key file.
    pub key_file: Option<PathBuf>,
    /// Role mapping JSON file.
    pub role_mapping_source: PathBuf,
    /// Slow-request alert sink.
    pub alert: AlertConfig,
}

impl Default for BouncerConfig {
    fn default() -> Self {
        Self {
            addr: ":8080".to_string(),
            identity_url: String::new(),
            project_id: String::new(),
            auth_ttl: DEFAULT_AUTH_TTL,
            unauth_ttl: DEFAULT_UNAUTH_TTL,
            identity_timeout: DEFAULT_IDENTITY_TIMEOUT,
            cache_size: DEFAULT_CACHE_SIZE,
            bcrypt_cost: DEFAULT_BCRYPT_COST,
            log_stats_interval: DEFAULT_LOG_STATS_INTERVAL,
            ca_file: None,
            cert_file: None,
            key_file: None,
            role_mapping_source: PathBuf::from(DEFAULT_ROLE_MAPPING_PATH),
            alert: AlertConfig::default(),
        }
    }
}

impl BouncerConfig {
    /// Create a new configuration builder.
    pub fn builder() -> BouncerConfigBuilder {
        BouncerConfigBuilder::default()
    }

    /// Reverts an out-of-range bcrypt cost or summary interval to its
    /// default, logging a warning for each.
    pub fn normalize(&mut self) {
        if !(MIN_BCRYPT_COST..=MAX_BCRYPT_COST).contains(&self.bcrypt_cost) {
            warn!(
                requested = self.bcrypt_cost,
                min = MIN_BCRYPT_COST,
                max = MAX_BCRYPT_COST,
                default = DEFAULT_BCRYPT_COST,
                "bcrypt-cost outside accepted interval; reverting to default"
            );
            self.bcrypt_cost = DEFAULT_BCRYPT_COST;
        }
        self.log_stats_interval = normalize_interval(self.log_stats_interval);
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.addr.trim().is_empty() {
            return Err(ConfigError::Missing("addr"));
        }
        if self.identity_url.is_empty() {
            return Err(ConfigError::Missing("identity-url"));
        }
        if !self.identity_url.starts_with("http://") && !self.identity_url.starts_with("https://")
        {
            return Err(ConfigError::InvalidIdentityUrl(self.identity_url.clone()));
        }
        if self.project_id.is_empty() {
            return Err(ConfigError::Missing("project-id"));
        }
        if self.cache_size == 0 {
            return Err(ConfigError::ZeroCacheSize);
        }
        for (name, duration) in [
            ("auth-ttl", self.auth_ttl),
            ("unauth-ttl", self.unauth_ttl),
            ("identity-timeout", self.identity_timeout),
        ] {
            if duration > MAX_DURATION {
                return Err(ConfigError::DurationTooLong(name));
            }
        }
        self.tls_files()?;
        Ok(())
    }

    /// The mutual-TLS triad, if configured.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::PartialTls` when only some files are set.
    pub fn tls_files(&self) -> Result<Option<TlsFiles>, ConfigError> {
        match (&self.ca_file, &self.cert_file, &self.key_file) {
            (None, None, None) => Ok(None),
            (Some(ca), Some(cert), Some(key)) => Ok(Some(TlsFiles {
                ca_file: ca.clone(),
                cert_file: cert.clone(),
                key_file: key.clone(),
            })),
            (ca, cert, key) => Err(ConfigError::PartialTls(
                [ca.is_some(), cert.is_some(), key.is_some()]
                    .iter()
                    .filter(|set| **set)
                    .count(),
            )),
        }
    }

    /// Socket address to bind; a bare `:port` listens on all interfaces.
    pub fn listen_addr(&self) -> String {
        if self.addr.starts_with(':') {
            format!("0.0.0.0{}", self.addr)
        } else {
            self.addr.clone()
        }
    }

    /// Writes the effective configuration on one log line.
    pub fn log_effective(&self) {
        info!(
            version = crate::VERSION,
            addr = %self.addr,
            identity_url = %self.identity_url,
            project_id = %self.project_id,
            auth_ttl_secs = self.auth_ttl.as_secs(),
            unauth_ttl_secs = self.unauth_ttl.as_secs(),
            identity_timeout_ms = self.identity_timeout.as_millis() as u64,
            cache_size = self.cache_size,
            bcrypt_cost = self.bcrypt_cost,
            log_stats_interval_secs = self.log_stats_interval.as_secs(),
            ca_file = ?self.ca_file,
            cert_file = ?self.cert_file,
            key_file = ?self.key_file,
            role_mapping_source = %self.role_mapping_source.display(),
            slow_request_alerts = self.alert.is_enabled(),
            "effective configuration"
        );
    }
}

/// Builder for `BouncerConfig`.
#[derive(Debug, Default)]
pub struct BouncerConfigBuilder {
    config: BouncerConfig,
}

impl BouncerConfigBuilder {
    /// Set the listen address.
    #[must_use]
    pub fn addr(mut self, addr: impl Into<String>) -> Self {
        self.config.addr = addr.into();
        self
    }

    /// Set the identity service URL.
    #[must_use]
    pub fn identity_url(mut self, url: impl Into<String>) -> Self {
        self.config.identity_url = url.into();
        self
    }

    /// Set the project id.
    #[must_use]
    pub fn project_id(mut self, project_id: impl Into<String>) -> Self {
        self.config.project_id = project_id.into();
        self
    }

    /// Set the positive decision TTL.
    #[must_use]
    pub fn auth_ttl(mut self, ttl: Duration) -> Self {
        self.config.auth_ttl = ttl;
        self
    }

    /// Set the negative decision TTL.
    #[must_use]
    pub fn unauth_ttl(mut self, ttl: Duration) -> Self {
        self.config.unauth_ttl = ttl;
        self
    }

    /// Set the identity-service timeout.
    #[must_use]
    pub fn identity_timeout(mut self, timeout: Duration) -> Self {
        self.config.identity_timeout = timeout;
        self
    }

    /// Set the cache capacity.
    #[must_use]
    pub fn cache_size(mut self, size: usize) -> Self {
        self.config.cache_size = size;
        self
    }

    /// Set the bcrypt cost.
    #[must_use]
    pub fn bcrypt_cost(mut self, cost: u32) -> Self {
        self.config.bcrypt_cost = cost;
        self
    }

    /// Set the latency summary interval.
    #[must_use]
    pub fn log_stats_interval(mut self, interval: Duration) -> Self {
        self.config.log_stats_interval = interval;
        self
    }

    /// Enable mTLS.
    #[must_use]
    pub fn mtls(
        mut self,
        ca: impl Into<PathBuf>,
        cert: impl Into<PathBuf>,
        key: impl Into<PathBuf>,
    ) -> Self {
        self.config.ca_file = Some(ca.into());
        self.config.cert_file = Some(cert.into());
        self.config.key_file = Some(key.into());
        self
    }

    /// Set the TLS files individually.
    #[must_use]
    pub fn tls_files(
        mut self,
        ca: Option<PathBuf>,
        cert: Option<PathBuf>,
        key: Option<PathBuf>,
    ) -> Self {
        self.config.ca_file = ca;
        self.config.cert_file = cert;
        self.config.key_file = key;
        self
    }

    /// Set the role mapping file.
    #[must_use]
    pub fn role_mapping_source(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.role_mapping_source = path.into();
        self
    }

    /// Set the alert sink.
    #[must_use]
    pub fn alert(mut self, alert: AlertConfig) -> Self {
        self.config.alert = alert;
        self
    }

    /// Normalize and validate the configuration.
    pub fn build(mut self) -> Result<BouncerConfig, ConfigError> {
        self.config.normalize();
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Parses `500ms`, `30s`, `5m`, `1h`, or a bare number of seconds.
///
/// # Errors
///
/// Returns a message naming the rejected input.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let invalid = || format!("invalid duration {s:?}");
    let number = |digits: &str| digits.trim().parse::<u64>().map_err(|_| invalid());
    let seconds = |digits: &str, unit: u64| -> Result<Duration, String> {
        number(digits)?
            .checked_mul(unit)
            .map(Duration::from_secs)
            .ok_or_else(|| format!("duration {s:?} is too large"))
    };

    if let Some(stripped) = s.strip_suffix("ms") {
        Ok(Duration::from_millis(number(stripped)?))
    } else if let Some(stripped) = s.strip_suffix('s') {
        seconds(stripped, 1)
    } else if let Some(stripped) = s.strip_suffix('m') {
        seconds(stripped, 60)
    } else if let Some(stripped) = s.strip_suffix('h') {
        seconds(stripped, 3600)
    } else {
        seconds(s, 1)
    }
}

/// Serde adapter writing durations as `<n>ms` / `<n>s`.
mod duration_format {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = if duration.subsec_millis() == 0 {
            format!("{}s", duration.as_secs())
        } else {
            format!("{}ms", duration.as_millis())
        };
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        super::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
