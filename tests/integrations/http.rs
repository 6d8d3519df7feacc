//! End-to-end tests of the HTTP relay with mock channels.

use anyhow::Result;
use notifr::{app::App, channels::ChannelRegistry, config::Config, targets::TargetsConfig, Message};
use std::sync::Arc;
use tokio::sync::watch;

#[path = "../helpers/mod.rs"]
mod helpers;

use helpers::app::TestApp;
use helpers::mock_channel::{RecordingChannel, SentMessage};

const TARGETS: &str = "test:smtp:email@example.com";
const BODY: &str = r#"{"subject":"Test Subject","text":"Test Message"}"#;

#[tokio::test]
async fn test_request_errors_are_rejected_with_400() -> Result<()> {
    let smtp = RecordingChannel::new("smtp");
    let app = TestApp::spawn(TARGETS, vec![smtp.clone()]).await?;

    let cases = [
        ("", BODY, "Parameter 'target' is missed"),
        ("target=", BODY, "Parameter 'target' is missed"),
        ("target=test", "", "No body"),
        ("target=test", "Invalid body", "Invalid body"),
        (
            "target=test",
            r#"{"subject":"Test Subject","text":""}"#,
            "Missing required fields: text",
        ),
        (
            "target=test",
            r#"{"subject":"Test Subject"}"#,
            "Missing required fields: text",
        ),
        ("target=badtarget", BODY, "Unknown target \"badtarget\""),
    ];

    for (query, body, want) in cases {
        let (status, text) = app.notify(query, body).await?;
        assert_eq!(status, 400, "query {query:?} body {body:?}");
        assert_eq!(text, want, "query {query:?} body {body:?}");
    }
    assert!(smtp.sent().is_empty(), "no delivery may start for a rejected request");

    app.shutdown().await
}

#[tokio::test]
async fn test_unknown_target_mentions_the_name() -> Result<()> {
    let app = TestApp::spawn(TARGETS, vec![RecordingChannel::new("smtp")]).await?;

    let (status, text) = app.notify("target=unknown", r#"{"text":"hi"}"#).await?;

    assert_eq!(status, 400);
    assert!(text.contains("unknown"));
    app.shutdown().await
}

#[tokio::test]
async fn test_valid_message_is_delivered_once() -> Result<()> {
    let smtp = RecordingChannel::new("smtp");
    let app = TestApp::spawn(
        "test:smtp:email1@example.com,test:smtp:email2@example.com",
        vec![smtp.clone()],
    )
    .await?;

    let (status, _) = app.notify("target=test", r#"{"text":"Test Message"}"#).await?;

    assert_eq!(status, 200);
    assert_eq!(
        smtp.sent(),
        vec![SentMessage {
            recipients: vec![
                "email1@example.com".to_string(),
                "email2@example.com".to_string()
            ],
            message: Message::new("Test Message"),
        }]
    );
    app.shutdown().await
}

#[tokio::test]
async fn test_channel_failure_is_not_surfaced() -> Result<()> {
    let smtp = RecordingChannel::failing("smtp");
    let app = TestApp::spawn(TARGETS, vec![smtp.clone()]).await?;

    let (status, text) = app.notify("target=test", BODY).await?;

    assert_eq!(status, 200);
    assert!(text.is_empty());
    let sent = smtp.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(
        sent[0].message,
        Message::new("Test Message").with_subject("Test Subject")
    );
    app.shutdown().await
}

#[tokio::test]
async fn test_fan_out_reaches_every_channel() -> Result<()> {
    let smtp = RecordingChannel::failing("smtp");
    let sms = RecordingChannel::new("sms");
    let other = RecordingChannel::new("push");
    let app = TestApp::spawn(
        "ops:smtp:oncall@example.com,ops:sms:+15550100,billing:push:device-1",
        vec![smtp.clone(), sms.clone(), other.clone()],
    )
    .await?;

    let (status, _) = app.notify("target=ops", r#"{"text":"disk full"}"#).await?;

    // The response is only sent once every delivery has finished.
    assert_eq!(status, 200);
    assert_eq!(smtp.sent().len(), 1);
    assert_eq!(sms.sent().len(), 1);
    assert_eq!(sms.sent()[0].recipients, vec!["+15550100".to_string()]);
    assert!(other.sent().is_empty());
    app.shutdown().await
}

#[tokio::test]
async fn test_stat_reports_version() -> Result<()> {
    let app = TestApp::spawn(TARGETS, vec![RecordingChannel::new("smtp")]).await?;

    let stat: serde_json::Value = app
        .client
        .get(format!("{}/stat", app.base_url))
        .send()
        .await?
        .json()
        .await?;

    assert_eq!(stat["version"], env!("CARGO_PKG_VERSION"));
    app.shutdown().await
}

#[tokio::test]
async fn test_invalid_routing_prevents_startup() -> Result<()> {
    let registry = ChannelRegistry::builder()
        .register(RecordingChannel::new("smtp") as Arc<dyn notifr::Channel>)
        .build();

    for (targets, want) in [
        ("", "empty targets"),
        ("test:nosmtp:email@example.com", "unsupported delivery type"),
        ("test:smtp:noemail", "invalid email"),
    ] {
        let config = Config {
            listen: "127.0.0.1:0".to_string(),
            targets: TargetsConfig::decode(targets)?,
            ..Config::default()
        };
        let (_tx, rx) = watch::channel(false);
        let result = App::builder(config)
            .channels_override(registry.clone())
            .build(rx)
            .await;
        let err = match result {
            Ok(_) => panic!("{targets:?} should not start"),
            Err(err) => format!("{err:#}"),
        };
        assert!(err.contains(want), "{targets:?}: {err}");
    }
    Ok(())
}

#[tokio::test]
async fn test_missing_smtp_host_prevents_startup() -> Result<()> {
    let config = Config {
        listen: "127.0.0.1:0".to_string(),
        targets: TargetsConfig::decode(TARGETS)?,
        ..Config::default()
    };
    let (_tx, rx) = watch::channel(false);

    let result = App::builder(config).build(rx).await;

    assert!(result.is_err());
    Ok(())
}
