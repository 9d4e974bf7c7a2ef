//! End-to-end tests for the notification pipeline.
//!
//! The Redis test requires a running server.
//! Run with: TRIPWIRE_TEST_REDIS_URL=redis://localhost:6379 cargo test -- --ignored

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tripwire::config::RedisConfig;
use tripwire::db::{CounterStore, RedisStore};
use tripwire::prelude::*;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config file");
    file.write_all(contents.as_bytes()).expect("write config");
    file
}

#[tokio::test]
async fn webhook_receives_throttled_notifications() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/errors"))
        .and(body_partial_json(json!({ "exception": "RuntimeError", "message": "boom" })))
        .respond_with(ResponseTemplate::new(204))
        .expect(7)
        .mount(&server)
        .await;

    let file = write_config(&format!(
        r#"
baseline_notifier = false

[grouping]
enabled = true
period = "5m"

[notifiers.webhook]
url = "{}/errors"
timeout = "5s"
"#,
        server.uri()
    ));

    let config = Config::load(Some(file.path())).expect("config loads");
    let notifier = ExceptionNotifier::from_config(&config)
        .await
        .expect("notifier builds");
    assert_eq!(notifier.notifier_names(), vec!["webhook"]);

    let exception = ExceptionRecord::new("RuntimeError", "boom").with_backtrace(["/a:1"]);
    let mut delivered = 0;
    for _ in 0..1000 {
        if notifier
            .notify(&exception, NotifyOptions::new())
            .await
            .expect("tolerant mode never fails")
        {
            delivered += 1;
        }
    }

    assert_eq!(delivered, 7);
}

#[tokio::test]
async fn failing_webhook_surfaces_only_in_testing_mode() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let mut config = Config::default();
    config.baseline_notifier = false;
    config
        .notifiers
        .insert("webhook".to_string(), json!({ "url": server.uri() }));

    let exception = ExceptionRecord::new("RuntimeError", "boom");

    let tolerant = ExceptionNotifier::from_config(&config).await.unwrap();
    assert!(tolerant.notify(&exception, NotifyOptions::new()).await.unwrap());

    config.testing_mode = true;
    let strict = ExceptionNotifier::from_config(&config).await.unwrap();
    let err = strict
        .notify(&exception, NotifyOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Notifier { ref name, .. } if name == "webhook"));
}

#[tokio::test]
async fn default_ignore_list_blocks_routing_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut config = Config::default();
    config
        .notifiers
        .insert("webhook".to_string(), json!({ "url": server.uri() }));
    let notifier = ExceptionNotifier::from_config(&config).await.unwrap();

    let routing = ExceptionRecord::new("ActionController::RoutingError", "No route matches")
        .with_type_hierarchy(["RoutingError"]);
    assert!(!notifier.notify(&routing, NotifyOptions::new()).await.unwrap());
}

#[tokio::test]
async fn custom_notifier_alongside_configured_ones() {
    let notifier = ExceptionNotifier::new(ErrorMode::Strict).with_grouping(GroupingEngine::new(
        Arc::new(MemoryStore::new()),
        Duration::from_secs(60),
    ));

    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = seen.clone();
    notifier
        .register_notifier(
            "audit",
            FnNotifier::new(move |exception: &ExceptionRecord, options: &NotifyOptions| {
                sink.lock()
                    .push((exception.message.clone(), options.accumulated_errors_count));
                Ok(())
            }),
        )
        .unwrap();

    let first = ExceptionRecord::new("RuntimeError", "user 1 missing").with_backtrace(["/app/users.rs:10"]);
    let second = ExceptionRecord::new("RuntimeError", "user 2 missing").with_backtrace(["/app/users.rs:10"]);

    let options = NotifyOptions::new().with_notifiers("audit");
    assert!(notifier.notify(&first, options.clone()).await.unwrap());
    assert!(!notifier.notify(&second, options.clone()).await.unwrap());
    assert!(notifier.notify(&second, options).await.unwrap());

    assert_eq!(
        *seen.lock(),
        vec![
            ("user 1 missing".to_string(), Some(1)),
            ("user 2 missing".to_string(), Some(3)),
        ]
    );
}

#[tokio::test]
#[ignore = "requires running Redis"]
async fn redis_store_round_trip() {
    let url = std::env::var("TRIPWIRE_TEST_REDIS_URL")
        .unwrap_or_else(|_| "redis://localhost:6379".to_string());
    let store = RedisStore::new(&RedisConfig {
        url,
        key_prefix: format!("tripwire-test-{}", uuid::Uuid::new_v4()),
    })
    .await
    .expect("pool builds");

    store.health_check().await.expect("redis reachable");

    assert_eq!(store.read("exception:1").await.unwrap(), None);
    store
        .write("exception:1", 4, Duration::from_secs(30))
        .await
        .unwrap();
    assert_eq!(store.read("exception:1").await.unwrap(), Some(4));
}
