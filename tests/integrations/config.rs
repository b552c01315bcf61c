use serde_json::json;
use serial_test::serial;
use sindri::config::Config;
use sindri::formatting::OutputFormat;
use sindri::rules::BroadcastRule;
use sindri::sink::MemorySink;
use sindri::tracker::InvocationMetadata;
use sindri::StructuredLogger;
use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;

fn write_file(contents: &str, suffix: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
#[serial]
fn test_defaults_without_file() {
    let config = Config::load(None).unwrap();
    assert_eq!(config, Config::default());
    assert_eq!(config.transporter.level, "error");
    assert!(config.transporter.webhook.is_none());
}

#[test]
#[serial]
fn test_load_from_toml_file() {
    let file = write_file(
        r#"
log_level = "debug"
format = "Json"
decorate_logs = true
trace_id_env = "TRACE_HEADER"

[blacklist]
rules = [{ key = "statusCode", value = 404 }]

[transporter]
level = "fatal"

[transporter.webhook]
url = "http://localhost:9999/hook"
"#,
        ".toml",
    );

    let config = Config::load(Some(file.path())).unwrap();

    assert_eq!(config.log_level, "debug");
    assert_eq!(config.format, OutputFormat::Json);
    assert!(config.decorate_logs);
    assert_eq!(config.trace_id_env, "TRACE_HEADER");
    assert_eq!(
        config.blacklist.rules,
        vec![BroadcastRule::new("statusCode", 404)]
    );
    assert_eq!(config.transporter.level, "fatal");
    let webhook = config.transporter.webhook.unwrap();
    assert_eq!(webhook.url, "http://localhost:9999/hook");
    assert_eq!(webhook.timeout_ms, 10_000);
}

#[test]
#[serial]
fn test_env_overrides_file() {
    let file = write_file("[transporter]\nlevel = \"error\"\n", ".toml");
    std::env::set_var("SINDRI_TRANSPORTER__LEVEL", "warn");
    std::env::set_var("SINDRI_DECORATE_LOGS", "true");

    let result = Config::load(Some(file.path()));

    std::env::remove_var("SINDRI_TRANSPORTER__LEVEL");
    std::env::remove_var("SINDRI_DECORATE_LOGS");

    let config = result.unwrap();
    assert_eq!(config.transporter.level, "warn");
    assert!(config.decorate_logs);
}

#[test]
#[serial]
fn test_logger_from_config_merges_rule_files() {
    let rules_file = write_file(
        "- key: source\n  value: healthcheck\n- key: retry\n  value: true\n",
        ".yaml",
    );
    let mut config = Config::default();
    config.blacklist.rules = vec![BroadcastRule::new("statusCode", 404)];
    config.blacklist.rule_files = vec![rules_file.path().to_path_buf()];
    config.decorate_logs = true;

    let sink = MemorySink::new();
    let logger = StructuredLogger::from_config(&config)
        .unwrap()
        .with_sink(Arc::new(sink.clone()));

    let blacklist = logger.blacklist().unwrap();
    let rules = blacklist.rules();
    assert_eq!(rules.len(), 3);
    assert_eq!(rules[1], BroadcastRule::new("source", "healthcheck"));
    assert_eq!(rules[2], BroadcastRule::new("retry", true));
    assert!(!blacklist.allows(&json!({ "retry": true })));

    logger.warn(json!({ "source": "healthcheck" }));
    assert!(sink.last().unwrap().starts_with("[sindri=WARN] "));
}

#[test]
#[serial]
fn test_missing_rule_file_is_an_error() {
    let mut config = Config::default();
    config.blacklist.rule_files = vec!["/nonexistent/sindri-rules.yaml".into()];

    let err = StructuredLogger::from_config(&config).err().unwrap();
    assert!(err.to_string().contains("Failed to read blacklist file"));
}

#[test]
#[serial]
fn test_trace_id_is_read_from_configured_env_var() {
    std::env::set_var("IT_TRACE_HEADER", "Root=1-abc-def");
    let mut config = Config::default();
    config.trace_id_env = "IT_TRACE_HEADER".to_string();
    let logger = StructuredLogger::from_config(&config);
    std::env::remove_var("IT_TRACE_HEADER");

    let logger = logger.unwrap().with_sink(Arc::new(MemorySink::new()));
    logger
        .set_tracker(
            &json!({ "headers": { "x-correlation-trace-id": "from-header" } }),
            &InvocationMetadata::new("aws-1"),
        )
        .unwrap();

    let context = logger.context().unwrap();
    assert_eq!(context.correlation_trace_id(), Some("Root=1-abc-def"));
    assert_eq!(context.correlation_id(), Some("aws-1"));
}

#[test]
#[serial]
fn test_default_trace_id_env_var_is_used() {
    std::env::set_var("_X_AMZN_TRACE_ID", "Root=1-default");
    let logger = StructuredLogger::from_config(&Config::default());
    std::env::remove_var("_X_AMZN_TRACE_ID");

    let logger = logger.unwrap();
    logger
        .set_tracker(&json!({}), &InvocationMetadata::new("aws-2"))
        .unwrap();
    assert_eq!(
        logger.context().unwrap().correlation_trace_id(),
        Some("Root=1-default")
    );
}

#[test]
#[serial]
fn test_empty_trace_id_env_var_is_ignored() {
    std::env::set_var("IT_TRACE_HEADER", "");
    let mut config = Config::default();
    config.trace_id_env = "IT_TRACE_HEADER".to_string();
    let logger = StructuredLogger::from_config(&config);
    std::env::remove_var("IT_TRACE_HEADER");

    let logger = logger.unwrap();
    logger
        .set_tracker(
            &json!({ "headers": { "x-correlation-trace-id": "from-header" } }),
            &InvocationMetadata::new("aws-3"),
        )
        .unwrap();
    assert_eq!(
        logger.context().unwrap().correlation_trace_id(),
        Some("from-header")
    );
}
