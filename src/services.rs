//! Encapsulation for setting up the broadcast pipeline.

use crate::{
    config::Config,
    logger::StructuredLogger,
    notification::{Transporter, TransporterOptions, WebhookBroadcaster, WebhookOptions},
};
use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};

/// Sets up a transporter with the webhook delivery target if one is configured.
///
/// Returns the listening transporter, or `Ok(None)` when broadcasting is
/// disabled. An invalid severity name is an error.
pub fn setup_broadcast_pipeline(
    config: &Config,
    logger: &StructuredLogger,
) -> Result<Option<Arc<Transporter>>> {
    let Some(webhook) = &config.transporter.webhook else {
        info!("No webhook configured; broadcasting is disabled.");
        return Ok(None);
    };

    if webhook.url.is_empty() {
        warn!("A webhook is configured without a URL; broadcasting is disabled.");
        return Ok(None);
    }

    let transporter = Transporter::new(TransporterOptions::new(config.transporter.level.clone()))?;
    let options = WebhookOptions {
        webhook_url: webhook.url.clone(),
        timeout_ms: webhook.timeout_ms,
    };
    transporter.register::<WebhookBroadcaster>(serde_json::to_value(options)?)?;
    transporter.listen(&logger.event_bus());
    info!(level = %config.transporter.level, "Webhook broadcast pipeline enabled.");
    Ok(Some(transporter))
}
