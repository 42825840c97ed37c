//! Out-of-band slow-request alerts.
//!
//! When a credentials review takes longer than [`SLOW_REQUEST_THRESHOLD`] and
//! a webhook URL is configured, a short `{"text": ...}` message is posted to
//! it. Posting is best effort: failures are logged and never reach the
//! review.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

/// Environment variable holding the webhook URL.
pub const SLOW_REQUEST_WEBHOOK_ENV: &str = "BOUNCER_SLOW_REQUEST_WEBHOOK";
/// Environment variable holding the host name for the message.
pub const HOST_NAME_ENV: &str = "HOST_NAME";
/// Environment variable holding the deployment unit FQDN for the message.
pub const DU_FQDN_ENV: &str = "DU_FQDN";
/// Environment variable holding the cluster id for the message.
pub const CLUSTER_ID_ENV: &str = "CLUSTER_ID";

/// Credentials reviews slower than this trigger an alert.
pub const SLOW_REQUEST_THRESHOLD: Duration = Duration::from_secs(30);

const ALERT_TIMEOUT: Duration = Duration::from_secs(10);

/// Alert sink settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertConfig {
    /// Webhook URL; `None` or empty disables alerts.
    pub webhook_url: Option<String>,
    /// Host name included in the message.
    pub host_name: String,
    /// Deployment unit FQDN included in the message.
    pub du_fqdn: String,
    /// Cluster id included in the message.
    pub cluster_id: String,
}

impl AlertConfig {
    /// True if a non-empty webhook URL is configured.
    pub fn is_enabled(&self) -> bool {
        self.webhook_url.as_deref().is_some_and(|url| !url.is_empty())
    }

    /// Message posted for a slow credentials review.
    pub fn slow_request_message(&self) -> String {
        format!(
            "host={} du={} cluster={}: authentication took too long",
            self.host_name, self.du_fqdn, self.cluster_id
        )
    }
}

/// Posts alerts to the configured webhook.
#[derive(Debug, Clone)]
pub struct AlertSink {
    config: AlertConfig,
    client: Client,
}

impl AlertSink {
    /// Create a sink for `config`.
    ///
    /// # Errors
    ///
    /// Returns the client builder error if the HTTP client cannot be created.
    pub fn new(config: AlertConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(ALERT_TIMEOUT).build()?;
        Ok(Self { config, client })
    }

    /// Sink settings.
    pub fn config(&self) -> &AlertConfig {
        &self.config
    }

    /// True if alerts will be posted.
    pub fn is_enabled(&self) -> bool {
        self.config.is_enabled()
    }

    /// Posts `message`; returns whether the webhook answered 200.
    pub async fn post(&self, message: &str) -> bool {
        let Some(url) = self.config.webhook_url.as_deref().filter(|url| !url.is_empty()) else {
            return false;
        };

        info!(event = "alert", message, "posting alert");
        match self
            .client
            .post(url)
            .json(&json!({ "text": message }))
            .send()
            .await
        {
            Ok(response) if response.status() == reqwest::StatusCode::OK => true,
            Ok(response) => {
                warn!(status = response.status().as_u16(), "unexpected alert webhook status");
                false
            }
            Err(e) => {
                warn!(error = %e, "failed to post alert");
                false
            }
        }
    }

    /// Reports a slow credentials review in the background.
    pub fn notify_slow_request(&self, elapsed: Duration) {
        if !self.is_enabled() {
            return;
        }
        warn!(
            event = "slow_request",
            elapsed_ms = elapsed.as_millis() as u64,
            "authentication took too long"
        );
        let sink = self.clone();
        tokio::spawn(async move {
            let message = sink.config.slow_request_message();
            sink.post(&message).await;
        });
    }
}
