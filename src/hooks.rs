//! Routing of process-level failures through the logger.
//!
//! Nothing here is installed implicitly. The host either calls
//! [`install_panic_hook`] once at startup, reports failures explicitly with
//! the `report_*` methods, or wraps spawned tasks in [`supervise`].

use crate::logger::StructuredLogger;
use serde_json::{json, Value};
use std::error::Error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub const UNCAUGHT_EXCEPTION: &str = "** Uncaught Exception **";
pub const UNHANDLED_REJECTION: &str = "** Unhandled Rejection **";
pub const UNHANDLED_REJECTION_WARNING: &str = "** Unhandled Rejection Warning **";

static PANIC_HOOK_INSTALLED: AtomicBool = AtomicBool::new(false);

/// Serializes an error and its whole `source()` chain.
pub fn serialize_error(err: &(dyn Error + 'static)) -> Value {
    let mut sources = Vec::new();
    let mut current = err.source();
    while let Some(source) = current {
        sources.push(Value::String(source.to_string()));
        current = source.source();
    }
    json!({
        "message": err.to_string(),
        "debug": format!("{:?}", err),
        "sources": sources,
    })
}

impl StructuredLogger {
    /// Reports a failure nothing else handled, at `FATAL`.
    pub fn report_uncaught(&self, err: &(dyn Error + 'static)) {
        self.fatal_with(json!({ "error": serialize_error(err) }), UNCAUGHT_EXCEPTION);
    }

    /// Reports a failed background task nobody awaited, at `ERROR`.
    pub fn report_unhandled_rejection(&self, err: &(dyn Error + 'static)) {
        self.error_with(json!({ "error": serialize_error(err) }), UNHANDLED_REJECTION);
    }

    /// Reports a recoverable background failure, at `WARN`.
    pub fn report_rejection_warning(&self, err: &(dyn Error + 'static)) {
        self.warn_with(
            json!({ "error": serialize_error(err) }),
            UNHANDLED_REJECTION_WARNING,
        );
    }
}

/// Installs a process-wide panic hook that logs panics through `logger` at
/// `FATAL`. Only the first call in a process installs anything; later calls
/// return `false` so several loggers never double-register.
pub fn install_panic_hook(logger: Arc<StructuredLogger>) -> bool {
    if PANIC_HOOK_INSTALLED.swap(true, Ordering::SeqCst) {
        warn!("A panic hook is already installed; ignoring the new registration.");
        return false;
    }

    std::panic::set_hook(Box::new(move |info| {
        let reason = info
            .payload()
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic payload".to_string());
        let location = info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()));
        logger.fatal_with(
            json!({ "error": { "message": reason }, "reason": location }),
            UNCAUGHT_EXCEPTION,
        );
    }));
    debug!("Panic hook installed.");
    true
}

/// Awaits a spawned task and reports a panic or an `Err` outcome as an
/// unhandled rejection. Returns the task's value when it succeeded.
pub async fn supervise<T, E>(
    logger: &StructuredLogger,
    handle: JoinHandle<Result<T, E>>,
) -> Option<T>
where
    E: Error + 'static,
{
    match handle.await {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            logger.report_unhandled_rejection(&e);
            None
        }
        Err(join_error) => {
            if join_error.is_cancelled() {
                logger.report_rejection_warning(&join_error);
            } else {
                logger.report_unhandled_rejection(&join_error);
            }
            None
        }
    }
}
