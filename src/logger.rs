//! The structured logger: the façade request handlers log through.
//!
//! Every call merges the active [`InvocationContext`] into a [`LogEntry`],
//! writes the formatted line to the sink, and, unless the blacklist
//! suppresses it, publishes a [`BroadcastEvent`] on the logger's
//! [`EventBus`]. All of it happens synchronously inside the call.

use crate::config::Config;
use crate::core::{BroadcastEvent, InvocationContext, Level, LogEntry};
use crate::formatting::{LogFormatter, OutputFormat};
use crate::notification::bus::EventBus;
use crate::rules::Blacklist;
use crate::sink::{LogSink, StdoutSink};
use crate::tracker::{
    Envelope, InvocationMetadata, RequestContextTracker, TrackerError, DEFAULT_TRACE_ID_ENV,
};
use anyhow::Result;
use arc_swap::ArcSwapOption;
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

macro_rules! level_methods {
    ($($level:ident => $name:ident, $name_with:ident;)*) => {
        $(
            #[doc = concat!("Logs `message` at ", stringify!($level), " level.")]
            pub fn $name<M: Serialize>(&self, message: M) {
                self.log(Level::$level, "", message)
            }

            #[doc = concat!("Logs `message` at ", stringify!($level), " level, labelled with `placeholder`.")]
            pub fn $name_with<M: Serialize>(&self, message: M, placeholder: &str) {
                self.log(Level::$level, placeholder, message)
            }
        )*
    };
}

pub struct StructuredLogger {
    tracker: RequestContextTracker,
    context: ArcSwapOption<InvocationContext>,
    event: ArcSwapOption<Value>,
    invocation: ArcSwapOption<InvocationMetadata>,
    blacklist: ArcSwapOption<Blacklist>,
    last_entry: ArcSwapOption<LogEntry>,
    bus: Arc<EventBus>,
    sink: Arc<dyn LogSink>,
    formatter: Box<dyn LogFormatter>,
    decorate: bool,
}

impl Default for StructuredLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl StructuredLogger {
    /// A logger writing plain-text lines to stdout, reading the trace id
    /// from `_X_AMZN_TRACE_ID`.
    pub fn new() -> Self {
        Self {
            tracker: RequestContextTracker::from_env(DEFAULT_TRACE_ID_ENV),
            context: ArcSwapOption::empty(),
            event: ArcSwapOption::empty(),
            invocation: ArcSwapOption::empty(),
            blacklist: ArcSwapOption::empty(),
            last_entry: ArcSwapOption::empty(),
            bus: Arc::new(EventBus::new()),
            sink: Arc::new(StdoutSink),
            formatter: OutputFormat::PlainText.formatter(),
            decorate: false,
        }
    }

    /// Builds a logger from configuration, loading any blacklist files.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut rules = config.blacklist.rules.clone();
        rules.extend(Blacklist::load_from_files(&config.blacklist.rule_files)?);
        let blacklist = Blacklist::from(rules);

        let logger = Self::new()
            .with_tracker(RequestContextTracker::from_env(&config.trace_id_env))
            .with_format(config.format)
            .with_decoration(config.decorate_logs);
        if !blacklist.is_empty() {
            debug!(count = blacklist.rules().len(), "Broadcast blacklist loaded");
            logger.set_blacklist(blacklist);
        }
        Ok(logger)
    }

    pub fn with_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.formatter = format.formatter();
        self
    }

    pub fn with_formatter(mut self, formatter: Box<dyn LogFormatter>) -> Self {
        self.formatter = formatter;
        self
    }

    /// Prefixes every sink line with `[sindri=<LEVEL>] `.
    pub fn with_decoration(mut self, decorate: bool) -> Self {
        self.decorate = decorate;
        self
    }

    pub fn with_tracker(mut self, tracker: RequestContextTracker) -> Self {
        self.tracker = tracker;
        self
    }

    level_methods! {
        Fatal => fatal, fatal_with;
        Error => error, error_with;
        Warn => warn, warn_with;
        Info => info, info_with;
        Debug => debug, debug_with;
        Trace => trace, trace_with;
    }

    /// Logs one entry. Never fails: a message that cannot be serialized is
    /// logged as `{"serializationError": ...}`.
    pub fn log<M: Serialize>(&self, level: Level, placeholder: &str, message: M) {
        let msg = serde_json::to_value(&message)
            .unwrap_or_else(|e| json!({ "serializationError": e.to_string() }));

        let entry = Arc::new(LogEntry {
            context: self.context.load_full(),
            level,
            msg,
            placeholder: placeholder.to_string(),
        });

        let line = self.formatter.format(&entry, Utc::now());
        if self.decorate {
            self.sink
                .write_line(&format!("[sindri={}] {}", level.as_str(), line));
        } else {
            self.sink.write_line(&line);
        }
        metrics::counter!("sindri_log_entries_total", "level" => level.as_str()).increment(1);

        self.last_entry.store(Some(entry.clone()));

        let blacklist = self.blacklist.load();
        let allowed = (*blacklist)
            .as_ref()
            .map_or(true, |blacklist| blacklist.allows(&entry.msg));
        if allowed {
            self.bus.publish(&BroadcastEvent { entry, level });
        } else {
            debug!(level = %level, "Broadcast suppressed by blacklist");
            metrics::counter!("sindri_broadcasts_suppressed_total").increment(1);
        }
    }

    /// Builds a fresh context for a new invocation and makes it active.
    /// The previous context, if any, is replaced, never mutated.
    pub fn set_tracker<E>(
        &self,
        envelope: &E,
        metadata: &InvocationMetadata,
    ) -> Result<(), TrackerError>
    where
        E: Envelope + Serialize + ?Sized,
    {
        let context = self.tracker.build(Some(envelope), Some(metadata))?;
        self.event
            .store(serde_json::to_value(envelope).ok().map(Arc::new));
        self.invocation.store(Some(Arc::new(metadata.clone())));
        self.context.store(Some(Arc::new(context)));
        Ok(())
    }

    /// Drops the active context, e.g. once an invocation has finished.
    pub fn clear_tracker(&self) {
        self.context.store(None);
        self.event.store(None);
        self.invocation.store(None);
    }

    pub fn context(&self) -> Option<Arc<InvocationContext>> {
        self.context.load_full()
    }

    /// The envelope of the current invocation, as JSON.
    pub fn event(&self) -> Option<Arc<Value>> {
        self.event.load_full()
    }

    pub fn invocation(&self) -> Option<Arc<InvocationMetadata>> {
        self.invocation.load_full()
    }

    pub fn blacklist(&self) -> Option<Arc<Blacklist>> {
        self.blacklist.load_full()
    }

    pub fn set_blacklist(&self, blacklist: impl Into<Blacklist>) {
        self.blacklist.store(Some(Arc::new(blacklist.into())));
    }

    pub fn clear_blacklist(&self) {
        self.blacklist.store(None);
    }

    /// The most recent entry. Only the last one is kept.
    pub fn structured_log(&self) -> Option<Arc<LogEntry>> {
        self.last_entry.load_full()
    }

    /// The event source transporters subscribe to.
    pub fn event_bus(&self) -> Arc<EventBus> {
        self.bus.clone()
    }
}
