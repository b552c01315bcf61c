use serde_json::Value;
use sindri::core::Level;
use sindri::hooks::{install_panic_hook, supervise, UNCAUGHT_EXCEPTION, UNHANDLED_REJECTION};
use sindri::notification::{Transporter, TransporterOptions};
use std::sync::Arc;

#[path = "../helpers/mod.rs"]
mod helpers;
use helpers::{fake_broadcaster::PanickingBroadcaster, memory_logger};

// The panic hook is process-wide, so everything touching it lives in one test.
#[test]
fn test_panic_hook_logs_panics_once_installed() {
    let (logger, sink) = memory_logger();
    let logger = Arc::new(logger);

    assert!(install_panic_hook(logger.clone()));
    let (other, _) = memory_logger();
    assert!(!install_panic_hook(Arc::new(other)));

    let result = std::panic::catch_unwind(|| {
        panic!("ledger corrupted");
    });
    assert!(result.is_err());

    let entry = logger.structured_log().unwrap();
    assert_eq!(entry.level, Level::Fatal);
    assert_eq!(entry.placeholder, UNCAUGHT_EXCEPTION);
    assert_eq!(entry.msg["error"]["message"], "ledger corrupted");
    assert!(sink.last().unwrap().contains("FATAL"));

    // Outside a runtime a panicking target is delivered inline; the hook logs
    // its panic at FATAL again, and that second broadcast must be skipped
    // rather than re-entering the inline delivery.
    let transporter = Transporter::new(TransporterOptions::new("fatal")).unwrap();
    transporter
        .register::<PanickingBroadcaster>(Value::Null)
        .unwrap();
    transporter.listen(&logger.event_bus());

    logger.fatal("boom");

    assert_eq!(transporter.fired(), 2);
    let lines = sink.lines();
    assert_eq!(lines.len(), 3);
    assert!(lines[1].contains("boom"));
    assert!(lines[2].contains("target exploded"));
    assert_eq!(
        logger.structured_log().unwrap().placeholder,
        UNCAUGHT_EXCEPTION
    );
}

#[tokio::test]
async fn test_supervised_task_failure_is_logged() {
    let (logger, sink) = memory_logger();
    let handle = tokio::spawn(async {
        "not a number".parse::<u32>()
    });

    assert!(supervise(&logger, handle).await.is_none());

    let entry = logger.structured_log().unwrap();
    assert_eq!(entry.level, Level::Error);
    assert_eq!(entry.placeholder, UNHANDLED_REJECTION);
    assert_eq!(sink.lines().len(), 1);
}
