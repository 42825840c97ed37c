//! bouncerd - Kubernetes TokenReview webhook backed by Keystone.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use bouncer::alert::{
    AlertConfig, CLUSTER_ID_ENV, DU_FQDN_ENV, HOST_NAME_ENV, SLOW_REQUEST_WEBHOOK_ENV,
};
use bouncer::config::{parse_duration, BouncerConfig, DEFAULT_BCRYPT_COST, DEFAULT_CACHE_SIZE};
use bouncer::policy::DEFAULT_ROLE_MAPPING_PATH;
use bouncer::BouncerServer;
use bouncer_telemetry::{init_telemetry, spawn_reporter, LogConfig, LogFormat, MetricsConfig};

/// Kubernetes authentication webhook for Keystone tokens and credentials.
#[derive(Debug, Parser)]
#[command(name = "bouncerd", version = bouncer::VERSION)]
struct Cli {
    /// Listen address, e.g. ":8080" or "127.0.0.1:8443".
    addr: String,

    /// Keystone base URL, e.g. "https://keystone.example.com/keystone".
    identity_url: String,

    /// Project every token is scoped to.
    project_id: String,

    /// Lifetime of cached successful decisions.
    #[arg(long, value_parser = parse_duration, default_value = "5m")]
    auth_ttl: Duration,

    /// Lifetime of cached rejections.
    #[arg(long, value_parser = parse_duration, default_value = "1m")]
    unauth_ttl: Duration,

    /// Timeout for each identity-service call.
    #[arg(long, value_parser = parse_duration, default_value = "30s")]
    identity_timeout: Duration,

    /// Decision cache capacity.
    #[arg(long, default_value_t = DEFAULT_CACHE_SIZE)]
    cache_size: usize,

    /// bcrypt cost for cached password hashes (4-31).
    #[arg(long, default_value_t = DEFAULT_BCRYPT_COST)]
    bcrypt_cost: u32,

    /// Interval between latency summaries (1m-30m).
    #[arg(long, value_parser = parse_duration, default_value = "10m")]
    log_stats_interval: Duration,

    /// CA bundle used to verify client certificates.
    #[arg(long)]
    ca_file: Option<PathBuf>,

    /// Server certificate.
    #[arg(long)]
    cert_file: Option<PathBuf>,

    /// Server private key.
    #[arg(long)]
    key_file: Option<PathBuf>,

    /// JSON object mapping role names to group names.
    #[arg(long, default_value = DEFAULT_ROLE_MAPPING_PATH)]
    role_mapping_source: PathBuf,

    /// Log filter used when RUST_LOG is unset.
    #[arg(long, env = "BOUNCER_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Log output format: json or pretty.
    #[arg(long, env = "BOUNCER_LOG_FORMAT", default_value = "json")]
    log_format: LogFormat,

    /// Prometheus exporter listen address.
    #[arg(long, env = "BOUNCER_METRICS_ADDR")]
    metrics_addr: Option<String>,

    #[arg(long, env = SLOW_REQUEST_WEBHOOK_ENV, hide = true)]
    slow_request_webhook: Option<String>,

    #[arg(long, env = HOST_NAME_ENV, hide = true, default_value = "")]
    host_name: String,

    #[arg(long, env = DU_FQDN_ENV, hide = true, default_value = "")]
    du_fqdn: String,

    #[arg(long, env = CLUSTER_ID_ENV, hide = true, default_value = "")]
    cluster_id: String,
}

impl Cli {
    fn into_config(self) -> Result<BouncerConfig> {
        BouncerConfig::builder()
            .addr(self.addr)
            .identity_url(self.identity_url)
            .project_id(self.project_id)
            .auth_ttl(self.auth_ttl)
            .unauth_ttl(self.unauth_ttl)
            .identity_timeout(self.identity_timeout)
            .cache_size(self.cache_size)
            .bcrypt_cost(self.bcrypt_cost)
            .log_stats_interval(self.log_stats_interval)
            .tls_files(self.ca_file, self.cert_file, self.key_file)
            .role_mapping_source(self.role_mapping_source)
            .alert(AlertConfig {
                webhook_url: self.slow_request_webhook,
                host_name: self.host_name,
                du_fqdn: self.du_fqdn,
                cluster_id: self.cluster_id,
            })
            .build()
            .context("invalid configuration")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_telemetry(
        &LogConfig::new(cli.log_level.clone(), cli.log_format),
        &MetricsConfig {
            addr: cli.metrics_addr.clone(),
        },
    )
    .context("failed to initialize telemetry")?;

    let config = cli.into_config()?;
    config.log_effective();

    let server = BouncerServer::new(config).context("failed to create server")?;
    let _reporter = spawn_reporter(server.timer(), server.config().log_stats_interval);

    info!(version = bouncer::VERSION, "starting bouncerd");
    server.run().await.context("server error")?;
    Ok(())
}
