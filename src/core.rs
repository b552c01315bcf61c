//! Core domain types and service traits for Sindri
//!
//! This module defines the data that flows through the logging pipeline
//! (severity levels, invocation context snapshots, log entries, broadcast
//! events) and the trait contract external delivery targets implement.

use async_trait::async_trait;
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

/// Prefix shared by every correlation header and context key.
pub const CORRELATION_PREFIX: &str = "x-correlation-";
/// Context key holding the correlation id.
pub const CORRELATION_ID: &str = "x-correlation-id";
/// Context key holding the distributed trace id.
pub const CORRELATION_TRACE_ID: &str = "x-correlation-trace-id";
/// `apiRequestId` assigned to keep-warm invocations.
pub const WARMER_REQUEST_ID: &str = "LAMBDA_WARMER_INVOCATION";

/// Log severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl Level {
    pub const ALL: [Level; 6] = [
        Level::Fatal,
        Level::Error,
        Level::Warn,
        Level::Info,
        Level::Debug,
        Level::Trace,
    ];

    /// Upper-case display name, as written to the log sink.
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "TRACE",
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
            Level::Fatal => "FATAL",
        }
    }

    /// Numeric severity stored in structured entries.
    pub fn ordinal(&self) -> u8 {
        match self {
            Level::Trace => 10,
            Level::Debug => 20,
            Level::Info => 30,
            Level::Warn => 40,
            Level::Error => 50,
            Level::Fatal => 60,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("the level {0:?} is not one of fatal, error, warn, info, debug, trace")]
pub struct ParseLevelError(pub String);

impl FromStr for Level {
    type Err = ParseLevelError;

    /// Parses a severity name, ignoring case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Level::ALL
            .iter()
            .copied()
            .find(|level| level.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseLevelError(s.to_string()))
    }
}

impl Serialize for Level {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.ordinal())
    }
}

/// Correlation metadata for a single invocation.
///
/// Built by [`crate::tracker::RequestContextTracker`]; there are no setters,
/// so a snapshot never changes once it is shared with the logger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationContext {
    pub(crate) aws_request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) api_request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) stage: Option<String>,
    /// `x-correlation-*` entries, keys lower-cased.
    #[serde(flatten)]
    pub(crate) correlation: BTreeMap<String, String>,
}

impl InvocationContext {
    pub fn aws_request_id(&self) -> &str {
        &self.aws_request_id
    }

    pub fn api_request_id(&self) -> Option<&str> {
        self.api_request_id.as_deref()
    }

    pub fn stage(&self) -> Option<&str> {
        self.stage.as_deref()
    }

    /// The `x-correlation-id`. Always present on a built context.
    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation(CORRELATION_ID)
    }

    pub fn correlation_trace_id(&self) -> Option<&str> {
        self.correlation(CORRELATION_TRACE_ID)
    }

    /// Looks up any `x-correlation-*` entry, ignoring the case of `key`.
    pub fn correlation(&self, key: &str) -> Option<&str> {
        self.correlation
            .get(&key.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn correlations(&self) -> &BTreeMap<String, String> {
        &self.correlation
    }
}

/// A structured log entry: the active context merged with the call's data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    #[serde(flatten)]
    pub context: Option<Arc<InvocationContext>>,
    pub level: Level,
    pub msg: Value,
    pub placeholder: String,
}

impl LogEntry {
    /// The id shown in formatted output: the gateway request id, unless absent or empty.
    pub fn display_id(&self) -> Option<&str> {
        self.context
            .as_ref()
            .and_then(|ctx| ctx.api_request_id())
            .filter(|id| !id.is_empty())
    }
}

/// The unit handed from the logger to broadcast subscribers.
#[derive(Debug, Clone, PartialEq)]
pub struct BroadcastEvent {
    pub entry: Arc<LogEntry>,
    pub level: Level,
}

/// Everything a delivery target gets to see for a single broadcast.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub entry: Arc<LogEntry>,
    pub level: Level,
    /// The options given at registration time.
    pub options: Arc<Value>,
}

// =============================================================================
// Service Traits
// =============================================================================

/// An external notification target (email, SMS, ticketing, chat webhook...).
#[async_trait]
pub trait Broadcaster: Send + Sync {
    /// A short descriptive name, used in diagnostics.
    fn name(&self) -> &str;

    /// Forwards one broadcast to the external system.
    ///
    /// # Returns
    /// * `Ok(())` if the target accepted the notification
    /// * `Err` on any failure; the transporter reports it and moves on
    async fn broadcast(&self, delivery: &Delivery) -> anyhow::Result<()>;
}
