
use serde_json::{json, Value};
use sindri::sink::MemorySink;
use sindri::tracker::{InvocationMetadata, RequestContextTracker};
use sindri::StructuredLogger;
use std::sync::Arc;

/// A logger writing into memory, with a fixed trace id so tests never depend
/// on the process environment.
pub fn memory_logger() -> (StructuredLogger, MemorySink) {
    let sink = MemorySink::new();
    let logger = StructuredLogger::new()
        .with_tracker(RequestContextTracker::with_trace_id(Some(
            "Root=1-test-trace".to_string(),
        )))
        .with_sink(Arc::new(sink.clone()));
    (logger, sink)
}

/// A gateway event carrying a correlation id and a custom correlation header.
#[allow(dead_code)]
pub fn gateway_event() -> Value {
    json!({
        "path": "/orders",
        "headers": {
            "X-Correlation-Id": "corr-123",
            "x-correlation-tenant": "acme",
            "Content-Type": "application/json"
        },
        "requestContext": { "stage": "prod", "requestId": "api-456" }
    })
}

#[allow(dead_code)]
pub fn metadata() -> InvocationMetadata {
    InvocationMetadata::new("aws-789")
}
