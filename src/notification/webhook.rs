//! A delivery target that posts broadcasts to an HTTP webhook.

use crate::core::{Broadcaster, Delivery, LogEntry};
use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::{error, info, instrument};

fn default_timeout_ms() -> u64 {
    10_000
}

/// Options a [`WebhookBroadcaster`] reads from its registration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct WebhookOptions {
    pub webhook_url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

/// Posts `{ "text": ..., "level": ..., "entry": ... }` to `webhook_url`.
#[derive(Debug, Default, Clone)]
pub struct WebhookBroadcaster {
    client: reqwest::Client,
}

impl WebhookBroadcaster {
    /// A one-line, human-readable summary of the entry, for chat-style targets.
    pub fn summary(entry: &LogEntry) -> String {
        let correlation = entry
            .context
            .as_ref()
            .and_then(|ctx| ctx.correlation_id())
            .unwrap_or("-");
        let stage = entry
            .context
            .as_ref()
            .and_then(|ctx| ctx.stage())
            .unwrap_or("-");
        format!(
            "[{}] {} (stage: {}, correlation: {}) {}",
            entry.level, entry.placeholder, stage, correlation, entry.msg
        )
    }
}

#[async_trait]
impl Broadcaster for WebhookBroadcaster {
    fn name(&self) -> &str {
        "webhook"
    }

    #[instrument(skip_all, fields(level = %delivery.level))]
    async fn broadcast(&self, delivery: &Delivery) -> anyhow::Result<()> {
        let options: WebhookOptions = serde_json::from_value((*delivery.options).clone())
            .context("Invalid webhook options")?;

        let payload = json!({
            "text": Self::summary(&delivery.entry),
            "level": delivery.level.as_str(),
            "entry": &*delivery.entry,
        });

        let response = self
            .client
            .post(&options.webhook_url)
            .timeout(Duration::from_millis(options.timeout_ms))
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "HTTP request to webhook failed");
                e
            })?;

        let status = response.status();
        if status.is_success() {
            info!("Successfully sent broadcast to webhook.");
            Ok(())
        } else {
            let text = response.text().await.unwrap_or_default();
            error!(status = %status, body = %text, "Failed to send webhook notification");
            anyhow::bail!(
                "Failed to send webhook notification: status {}, body: {}",
                status,
                text
            );
        }
    }
}
