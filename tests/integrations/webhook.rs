use serde_json::json;
use sindri::config::{Config, WebhookConfig};
use sindri::services::setup_broadcast_pipeline;
use sindri::tracker::InvocationMetadata;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[path = "../helpers/mod.rs"]
mod helpers;
use helpers::memory_logger;

fn config_for(url: String) -> Config {
    let mut config = Config::default();
    config.transporter.level = "error".to_string();
    config.transporter.webhook = Some(WebhookConfig {
        url,
        timeout_ms: 2_000,
    });
    config
}

#[tokio::test]
async fn test_error_entries_are_posted_to_webhook() {
    // Arrange
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/alerts"))
        .and(body_partial_json(json!({
            "level": "ERROR",
            "entry": {
                "awsRequestId": "aws-1",
                "level": 50,
                "placeholder": "billing",
                "msg": { "invoice": "INV-9" }
            }
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let (logger, _sink) = memory_logger();
    let config = config_for(format!("{}/alerts", server.uri()));
    let transporter = setup_broadcast_pipeline(&config, &logger)
        .unwrap()
        .expect("webhook is configured");

    // Act
    logger
        .set_tracker(&json!({ "headers": {} }), &InvocationMetadata::new("aws-1"))
        .unwrap();
    logger.info("ignored");
    logger.error_with(json!({ "invoice": "INV-9" }), "billing");
    transporter.flush().await;

    // Assert: `expect(1)` is verified when the server drops.
}

#[tokio::test]
async fn test_webhook_failures_are_contained() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;

    let (logger, sink) = memory_logger();
    let transporter = setup_broadcast_pipeline(&config_for(server.uri()), &logger)
        .unwrap()
        .unwrap();

    logger.error("first");
    logger.error("second");
    transporter.flush().await;

    assert_eq!(sink.lines().len(), 2);
}

#[test]
fn test_pipeline_is_disabled_without_webhook() {
    let (logger, _sink) = memory_logger();
    let transporter = setup_broadcast_pipeline(&Config::default(), &logger).unwrap();
    assert!(transporter.is_none());
    assert_eq!(logger.event_bus().subscriber_count(), 0);
}

#[test]
fn test_pipeline_is_disabled_with_empty_url() {
    let (logger, _sink) = memory_logger();
    let transporter = setup_broadcast_pipeline(&config_for(String::new()), &logger).unwrap();
    assert!(transporter.is_none());
}

#[test]
fn test_invalid_level_is_rejected() {
    let (logger, _sink) = memory_logger();
    let mut config = config_for("http://localhost:1/hook".to_string());
    config.transporter.level = "loud".to_string();
    assert!(setup_broadcast_pipeline(&config, &logger).is_err());
}

#[test]
fn test_webhook_delivers_from_a_synchronous_host() {
    // The mock server lives on its own runtime; the logging below does not.
    let server_runtime = tokio::runtime::Runtime::new().unwrap();
    let server = server_runtime.block_on(async {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sync"))
            .and(body_partial_json(json!({ "level": "ERROR" })))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        server
    });

    let (logger, _sink) = memory_logger();
    let config = config_for(format!("{}/sync", server.uri()));
    let transporter = setup_broadcast_pipeline(&config, &logger)
        .unwrap()
        .unwrap();

    logger.error(json!({ "invoice": "INV-10" }));

    let requests = server_runtime
        .block_on(server.received_requests())
        .unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(transporter.fired(), 1);
}
