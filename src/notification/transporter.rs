//! The transporter forwards broadcast events to an external delivery target.
//!
//! It listens on the logger's [`EventBus`], keeps only events of the
//! configured severity, and hands each one to a freshly constructed
//! [`Broadcaster`]. At most [`MAX_BROADCASTS`] deliveries are attempted per
//! transporter lifetime; everything past the cap is dropped, so a failure
//! loop cannot turn into a notification storm.

use crate::core::{BroadcastEvent, Broadcaster, Delivery, Level};
use crate::notification::bus::{BroadcastSubscriber, EventBus, SubscriptionId};
use arc_swap::ArcSwapOption;
use futures::future::join_all;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cell::Cell;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

/// Hard ceiling on delivery attempts per transporter.
pub const MAX_BROADCASTS: usize = 5;

thread_local! {
    // Set while this thread drives a delivery to completion inline.
    static INLINE_DELIVERY: Cell<bool> = const { Cell::new(false) };
}

struct InlineDeliveryGuard;

impl InlineDeliveryGuard {
    fn enter() -> Self {
        INLINE_DELIVERY.with(|flag| flag.set(true));
        InlineDeliveryGuard
    }
}

impl Drop for InlineDeliveryGuard {
    fn drop(&mut self) {
        INLINE_DELIVERY.with(|flag| flag.set(false));
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransporterError {
    #[error("the level {0:?} is not present in the levels enum")]
    InvalidLevel(String),

    #[error("delivery options must be a JSON object or null, got: {0}")]
    InvalidOptions(String),
}

/// Construction-time options.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct TransporterOptions {
    /// Severity name to forward, case-insensitive. Empty forwards everything.
    pub level: String,
}

impl TransporterOptions {
    pub fn new(level: impl Into<String>) -> Self {
        Self {
            level: level.into(),
        }
    }
}

/// Which events the transporter forwards.
///
/// `Exactly` is an exact match, not a threshold: a transporter configured
/// for `fatal` ignores `error` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelFilter {
    All,
    Exactly(Level),
}

impl LevelFilter {
    pub fn parse(level: &str) -> Result<Self, TransporterError> {
        if level.is_empty() {
            return Ok(LevelFilter::All);
        }
        level
            .parse::<Level>()
            .map(LevelFilter::Exactly)
            .map_err(|_| TransporterError::InvalidLevel(level.to_string()))
    }

    pub fn accepts(&self, level: Level) -> bool {
        match self {
            LevelFilter::All => true,
            LevelFilter::Exactly(wanted) => *wanted == level,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransporterState {
    /// No delivery target registered yet.
    Unconfigured,
    /// A target is registered but no event source is attached.
    Configured,
    /// Registered and subscribed to an event source.
    Listening,
}

type BroadcasterFactory = dyn Fn() -> anyhow::Result<Box<dyn Broadcaster>> + Send + Sync;

struct Registration {
    factory: Box<BroadcasterFactory>,
    options: Arc<Value>,
}

pub struct Transporter {
    filter: LevelFilter,
    registration: ArcSwapOption<Registration>,
    fired: AtomicUsize,
    subscription: Mutex<Option<SubscriptionId>>,
    in_flight: Mutex<Vec<JoinHandle<()>>>,
}

impl Transporter {
    /// Creates a transporter.
    ///
    /// # Returns
    /// * `Err(TransporterError::InvalidLevel)` if `options.level` is neither
    ///   empty nor a known severity name
    pub fn new(options: TransporterOptions) -> Result<Arc<Self>, TransporterError> {
        let filter = LevelFilter::parse(&options.level)?;
        debug!(?filter, "Transporter created");
        Ok(Arc::new(Self {
            filter,
            registration: ArcSwapOption::empty(),
            fired: AtomicUsize::new(0),
            subscription: Mutex::new(None),
            in_flight: Mutex::new(Vec::new()),
        }))
    }

    pub fn filter(&self) -> LevelFilter {
        self.filter
    }

    /// Registers `B` as the delivery target; a new `B::default()` is built
    /// for every delivery.
    pub fn register<B>(&self, options: Value) -> Result<(), TransporterError>
    where
        B: Broadcaster + Default + 'static,
    {
        self.register_factory(
            || Ok(Box::new(B::default()) as Box<dyn Broadcaster>),
            options,
        )
    }

    /// Registers a fallible constructor as the delivery target. Replaces any
    /// previous registration; the delivery counter is kept.
    pub fn register_factory<F>(&self, factory: F, options: Value) -> Result<(), TransporterError>
    where
        F: Fn() -> anyhow::Result<Box<dyn Broadcaster>> + Send + Sync + 'static,
    {
        if !(options.is_object() || options.is_null()) {
            return Err(TransporterError::InvalidOptions(options.to_string()));
        }
        self.registration.store(Some(Arc::new(Registration {
            factory: Box::new(factory),
            options: Arc::new(options),
        })));
        info!("Transporter delivery target registered.");
        Ok(())
    }

    /// Subscribes to `bus`. Calling it again returns the existing subscription.
    pub fn listen(self: &Arc<Self>, bus: &EventBus) -> SubscriptionId {
        let mut subscription = self
            .subscription
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(id) = *subscription {
            return id;
        }
        let id = bus.subscribe(self.clone());
        *subscription = Some(id);
        info!(filter = ?self.filter, "Transporter listening for broadcast events.");
        id
    }

    pub fn state(&self) -> TransporterState {
        let registered = self.registration.load().is_some();
        let listening = self
            .subscription
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_some();
        match (registered, listening) {
            (false, _) => TransporterState::Unconfigured,
            (true, false) => TransporterState::Configured,
            (true, true) => TransporterState::Listening,
        }
    }

    /// Number of events that passed the level gate so far.
    pub fn fired(&self) -> usize {
        self.fired.load(Ordering::SeqCst)
    }

    /// Waits for every delivery started so far to finish.
    pub async fn flush(&self) {
        let handles: Vec<JoinHandle<()>> = self
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .drain(..)
            .collect();
        if handles.is_empty() {
            return;
        }
        debug!(count = handles.len(), "Waiting for in-flight broadcasts");
        for result in join_all(handles).await {
            if let Err(e) = result {
                error!(error = %e, "Broadcast task failed to complete");
            }
        }
    }

    fn handle(&self, event: &BroadcastEvent) {
        if !self.filter.accepts(event.level) {
            return;
        }

        let previously_fired = self.fired.fetch_add(1, Ordering::SeqCst);
        if previously_fired >= MAX_BROADCASTS {
            if previously_fired == MAX_BROADCASTS {
                warn!(
                    cap = MAX_BROADCASTS,
                    "Broadcast cap reached; further broadcasts will be dropped."
                );
            }
            metrics::counter!("sindri_broadcasts_dropped_total").increment(1);
            return;
        }

        let Some(registration) = self.registration.load_full() else {
            error!("No delivery target is registered; skipping broadcast.");
            return;
        };

        let broadcaster = match (registration.factory)() {
            Ok(broadcaster) => broadcaster,
            Err(e) => {
                error!(error = %e, "The delivery target could not be constructed; skipping broadcast.");
                return;
            }
        };

        let delivery = Delivery {
            entry: event.entry.clone(),
            level: event.level,
            options: registration.options.clone(),
        };
        self.dispatch(broadcaster, delivery);
    }

    fn dispatch(&self, broadcaster: Box<dyn Broadcaster>, delivery: Delivery) {
        // An event raised by the delivery being driven inline on this thread,
        // e.g. through the panic hook. It still counts against the cap.
        if INLINE_DELIVERY.with(Cell::get) {
            warn!("Broadcast raised during an inline delivery; skipping it.");
            metrics::counter!("sindri_broadcasts_dropped_total").increment(1);
            return;
        }

        let task = deliver(broadcaster, delivery);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let handle = runtime.spawn(task);
                let mut in_flight = self
                    .in_flight
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                in_flight.retain(|h| !h.is_finished());
                in_flight.push(handle);
            }
            // Outside a runtime the delivery is driven to completion inline,
            // on a current-thread runtime so that I/O-based targets work.
            Err(_) => {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        error!(error = %e, "Could not start a runtime for inline delivery; skipping broadcast.");
                        metrics::counter!("sindri_broadcasts_failed_total").increment(1);
                        return;
                    }
                };
                let _inline = InlineDeliveryGuard::enter();
                runtime.block_on(task);
            }
        }
    }
}

impl BroadcastSubscriber for Transporter {
    fn on_broadcast(&self, event: &BroadcastEvent) {
        self.handle(event);
    }
}

#[instrument(skip_all, fields(broadcaster = broadcaster.name(), level = %delivery.level))]
async fn deliver(broadcaster: Box<dyn Broadcaster>, delivery: Delivery) {
    let outcome = AssertUnwindSafe(broadcaster.broadcast(&delivery))
        .catch_unwind()
        .await;
    match outcome {
        Ok(Ok(())) => {
            debug!("Broadcast delivered.");
            metrics::counter!("sindri_broadcasts_delivered_total").increment(1);
        }
        Ok(Err(e)) => {
            error!(error = %e, "Transporter error: broadcast failed.");
            metrics::counter!("sindri_broadcasts_failed_total").increment(1);
        }
        Err(_) => {
            error!("Transporter error: broadcast panicked.");
            metrics::counter!("sindri_broadcasts_failed_total").increment(1);
        }
    }
}
