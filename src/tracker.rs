//! Request context extraction and correlation-id propagation.
//!
//! The tracker reads the gateway request context and `x-correlation-*`
//! headers from an inbound invocation envelope, combines them with the
//! platform-assigned invocation id and produces an immutable
//! [`InvocationContext`] snapshot.

use crate::core::{
    InvocationContext, CORRELATION_ID, CORRELATION_PREFIX, CORRELATION_TRACE_ID,
    WARMER_REQUEST_ID,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error};

/// Environment variable the platform uses for the distributed trace id.
pub const DEFAULT_TRACE_ID_ENV: &str = "_X_AMZN_TRACE_ID";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TrackerError {
    #[error("an invocation envelope must be provided")]
    MissingEnvelope,

    #[error("invocation metadata with a request id must be provided")]
    MissingMetadata,
}

/// The part of the gateway request context the tracker cares about.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GatewayContext<'a> {
    pub stage: Option<&'a str>,
    pub request_id: Option<&'a str>,
}

/// The minimal capability set an inbound event needs to be tracked.
pub trait Envelope {
    /// The nested request context, if the event carries one.
    fn request_context(&self) -> Option<GatewayContext<'_>>;

    /// All headers whose value is a string, in no particular order.
    fn headers(&self) -> Vec<(&str, &str)>;

    /// Whether this is a keep-warm ping rather than a real request.
    fn is_warmer(&self) -> bool;
}

impl Envelope for Value {
    fn request_context(&self) -> Option<GatewayContext<'_>> {
        let ctx = self.get("requestContext")?.as_object()?;
        Some(GatewayContext {
            stage: ctx.get("stage").and_then(Value::as_str),
            request_id: ctx.get("requestId").and_then(Value::as_str),
        })
    }

    fn headers(&self) -> Vec<(&str, &str)> {
        self.get("headers")
            .and_then(Value::as_object)
            .map(|headers| {
                headers
                    .iter()
                    .filter_map(|(name, value)| value.as_str().map(|v| (name.as_str(), v)))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn is_warmer(&self) -> bool {
        self.get("warmer").is_some()
    }
}

/// Request context of an HTTP-style gateway event.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    #[serde(default)]
    pub stage: Option<String>,
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub resource_path: Option<String>,
}

/// A typed HTTP-style invocation event.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpEnvelope {
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub http_method: Option<String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub request_context: Option<RequestContext>,
    /// Keep-warm marker, e.g. `{ "warmer": true, "concurrency": 3 }`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warmer: Option<Value>,
}

impl Envelope for HttpEnvelope {
    fn request_context(&self) -> Option<GatewayContext<'_>> {
        self.request_context.as_ref().map(|ctx| GatewayContext {
            stage: ctx.stage.as_deref(),
            request_id: ctx.request_id.as_deref(),
        })
    }

    fn headers(&self) -> Vec<(&str, &str)> {
        self.headers
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
            .collect()
    }

    fn is_warmer(&self) -> bool {
        self.warmer.is_some()
    }
}

/// Platform-provided metadata for the running invocation.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InvocationMetadata {
    pub aws_request_id: String,
    #[serde(default)]
    pub function_name: String,
    /// Wall-clock deadline after which the platform kills the invocation.
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
}

impl InvocationMetadata {
    pub fn new(aws_request_id: impl Into<String>) -> Self {
        Self {
            aws_request_id: aws_request_id.into(),
            ..Default::default()
        }
    }

    /// Time left before the deadline; zero once it has passed, `None` if
    /// the platform did not give one.
    pub fn remaining_time(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| (deadline - Utc::now()).to_std().unwrap_or(Duration::ZERO))
    }
}

/// Builds [`InvocationContext`] snapshots.
#[derive(Debug, Clone, Default)]
pub struct RequestContextTracker {
    trace_id: Option<String>,
}

impl RequestContextTracker {
    /// Creates a tracker that reads the trace id from `env_var`.
    pub fn from_env(env_var: &str) -> Self {
        let trace_id = std::env::var(env_var).ok().filter(|id| !id.is_empty());
        Self { trace_id }
    }

    /// Creates a tracker with an explicit trace id (or none).
    pub fn with_trace_id(trace_id: Option<String>) -> Self {
        Self { trace_id }
    }

    /// Builds the context for one invocation.
    ///
    /// # Returns
    /// * `Ok(InvocationContext)` for any envelope shape, including ones
    ///   without a request context
    /// * `Err(TrackerError)` if the envelope or the metadata is absent
    pub fn build<E: Envelope + ?Sized>(
        &self,
        envelope: Option<&E>,
        metadata: Option<&InvocationMetadata>,
    ) -> Result<InvocationContext, TrackerError> {
        let envelope = envelope.ok_or_else(|| {
            error!("Tracker error: {}", TrackerError::MissingEnvelope);
            TrackerError::MissingEnvelope
        })?;
        let metadata = metadata
            .filter(|meta| !meta.aws_request_id.is_empty())
            .ok_or_else(|| {
                error!("Tracker error: {}", TrackerError::MissingMetadata);
                TrackerError::MissingMetadata
            })?;

        let (mut api_request_id, stage) = match envelope.request_context() {
            Some(ctx) => (
                ctx.request_id.map(str::to_string),
                ctx.stage.map(str::to_string),
            ),
            None => {
                debug!("Envelope has no request context; leaving stage and apiRequestId unset");
                (None, None)
            }
        };

        let mut correlation = BTreeMap::new();
        for (name, value) in envelope.headers() {
            let key = name.to_ascii_lowercase();
            if key.starts_with(CORRELATION_PREFIX) {
                correlation.insert(key, value.to_string());
            }
        }

        if let Some(trace_id) = &self.trace_id {
            correlation.insert(CORRELATION_TRACE_ID.to_string(), trace_id.clone());
        }

        let has_correlation_id = correlation
            .get(CORRELATION_ID)
            .is_some_and(|id| !id.is_empty());
        if !has_correlation_id {
            correlation.insert(CORRELATION_ID.to_string(), metadata.aws_request_id.clone());
        }

        if envelope.is_warmer() {
            api_request_id = Some(WARMER_REQUEST_ID.to_string());
        }

        Ok(InvocationContext {
            aws_request_id: metadata.aws_request_id.clone(),
            api_request_id,
            stage,
            correlation,
        })
    }
}
