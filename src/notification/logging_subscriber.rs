//! A simple async consumer that logs broadcast events as diagnostics.
//!
//! Useful for debugging which log calls would have been broadcast.

use crate::core::BroadcastEvent;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

/// Spawns a task that listens on the bus tap and logs each event.
#[instrument(skip_all)]
pub fn spawn(mut event_rx: broadcast::Receiver<BroadcastEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("LoggingSubscriber started.");
        loop {
            match event_rx.recv().await {
                Ok(event) => {
                    info!(
                        level = %event.level,
                        placeholder = %event.entry.placeholder,
                        msg = %event.entry.msg,
                        "Received broadcast event"
                    );
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("LoggingSubscriber lagged behind and missed {} events.", n);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    info!("Broadcast channel closed. LoggingSubscriber shutting down.");
                    break;
                }
            }
        }
    })
}
