//! Broadcasting of log events to external notification channels.
//!
//! The logger publishes [`crate::core::BroadcastEvent`]s on an [`EventBus`].
//! A [`Transporter`] subscribes, applies its severity gate and fan-out cap,
//! and forwards each accepted event to a registered
//! [`crate::core::Broadcaster`] such as the [`WebhookBroadcaster`].
pub mod bus;
pub mod logging_subscriber;
pub mod transporter;
pub mod webhook;

pub use bus::{BroadcastSubscriber, EventBus, SubscriptionId};
pub use transporter::{
    LevelFilter, Transporter, TransporterError, TransporterOptions, TransporterState,
    MAX_BROADCASTS,
};
pub use webhook::{WebhookBroadcaster, WebhookOptions};
