/// Sindri - structured logging for serverless request handlers
///
/// This library writes one structured, correlation-aware line per log call
/// and optionally broadcasts selected entries to external delivery targets.
pub mod config;
pub mod core;
pub mod formatting;
pub mod hooks;
pub mod logger;
pub mod notification;
pub mod rules;
pub mod services;
pub mod sink;
pub mod telemetry;
pub mod tracker;

// Re-export core types for convenience
pub use core::*;
pub use logger::StructuredLogger;
pub use tracker::{Envelope, HttpEnvelope, InvocationMetadata, RequestContextTracker};
