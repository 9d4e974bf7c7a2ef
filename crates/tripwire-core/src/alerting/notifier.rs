//! Notification backends

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::BoxError;
use crate::models::{ExceptionRecord, NotifyOptions};

/// Notification errors
#[derive(Debug, thiserror::Error)]
pub enum NotifierError {
    /// Request failed or returned a non-success status
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Notifier configuration rejected
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Any other failure
    #[error(transparent)]
    Other(#[from] BoxError),
}

impl NotifierError {
    /// Wrap an arbitrary message
    pub fn other(msg: impl Into<String>) -> Self {
        let msg: String = msg.into();
        Self::Other(msg.into())
    }
}

/// A notification channel
///
/// Each call receives its own copy of the options. Implementations may
/// perform arbitrary I/O; the dispatcher neither retries nor times out.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a notification for `exception`
    async fn send(&self, exception: &ExceptionRecord, options: NotifyOptions)
        -> Result<(), NotifierError>;
}

/// Adapts a synchronous closure into a [`Notifier`]
pub struct FnNotifier<F>(F);

impl<F> FnNotifier<F>
where
    F: Fn(&ExceptionRecord, &NotifyOptions) -> Result<(), NotifierError> + Send + Sync,
{
    /// Wrap `f`
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F> Notifier for FnNotifier<F>
where
    F: Fn(&ExceptionRecord, &NotifyOptions) -> Result<(), NotifierError> + Send + Sync,
{
    async fn send(
        &self,
        exception: &ExceptionRecord,
        options: NotifyOptions,
    ) -> Result<(), NotifierError> {
        (self.0)(exception, &options)
    }
}

impl<F> fmt::Debug for FnNotifier<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnNotifier")
    }
}

/// Severity a [`LogNotifier`] reports at
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    /// `info!`
    Info,
    /// `warn!`
    Warn,
    /// `error!`
    #[default]
    Error,
}

/// The baseline channel: one structured log event per notification
#[derive(Debug, Default, Clone)]
pub struct LogNotifier {
    level: LogLevel,
}

impl LogNotifier {
    /// Create a log notifier reporting at `error`
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a log notifier reporting at `level`
    pub fn with_level(level: LogLevel) -> Self {
        Self { level }
    }

    /// Build from configuration: `{ "level": "info" | "warn" | "error" }`
    pub fn from_config(config: &serde_json::Value) -> Result<Self, NotifierError> {
        let level = match config.get("level").and_then(serde_json::Value::as_str) {
            None | Some("error") => LogLevel::Error,
            Some("warn") => LogLevel::Warn,
            Some("info") => LogLevel::Info,
            Some(other) => {
                return Err(NotifierError::ConfigError(format!(
                    "unknown log level '{other}'"
                )))
            }
        };
        Ok(Self { level })
    }

    /// Reporting level
    pub fn level(&self) -> LogLevel {
        self.level
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(
        &self,
        exception: &ExceptionRecord,
        options: NotifyOptions,
    ) -> Result<(), NotifierError> {
        let count = options.accumulated_errors_count.unwrap_or(1);
        let frame = exception.first_frame();

        match self.level {
            LogLevel::Error => error!(
                exception = %exception.type_name,
                message = %exception.message,
                frame,
                accumulated_errors_count = count,
                occurred_at = %exception.occurred_at,
                "Exception notification"
            ),
            LogLevel::Warn => warn!(
                exception = %exception.type_name,
                message = %exception.message,
                frame,
                accumulated_errors_count = count,
                occurred_at = %exception.occurred_at,
                "Exception notification"
            ),
            LogLevel::Info => info!(
                exception = %exception.type_name,
                message = %exception.message,
                frame,
                accumulated_errors_count = count,
                occurred_at = %exception.occurred_at,
                "Exception notification"
            ),
        }

        Ok(())
    }
}

/// Posts a JSON description of each exception to a URL
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: String,
    headers: BTreeMap<String, String>,
}

impl WebhookNotifier {
    /// Default request timeout
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Create a webhook notifier for `url`
    pub fn new(url: impl Into<String>) -> Result<Self, NotifierError> {
        Self::with_timeout(url, Self::DEFAULT_TIMEOUT)
    }

    /// Create a webhook notifier with a custom request timeout
    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> Result<Self, NotifierError> {
        let url = url.into();
        reqwest::Url::parse(&url)
            .map_err(|e| NotifierError::ConfigError(format!("invalid webhook url '{url}': {e}")))?;

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifierError::ConfigError(e.to_string()))?;

        Ok(Self {
            client,
            url,
            headers: BTreeMap::new(),
        })
    }

    /// Add a header sent with every request
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Build from configuration:
    /// `{ "url": "...", "headers": { "X-Token": "..." }, "timeout": "10s" }`
    pub fn from_config(config: &serde_json::Value) -> Result<Self, NotifierError> {
        let url = config
            .get("url")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| NotifierError::ConfigError("webhook notifier requires 'url'".to_string()))?;

        let timeout = match config.get("timeout").and_then(serde_json::Value::as_str) {
            Some(raw) => humantime::parse_duration(raw)
                .map_err(|e| NotifierError::ConfigError(format!("invalid timeout '{raw}': {e}")))?,
            None => Self::DEFAULT_TIMEOUT,
        };

        let mut notifier = Self::with_timeout(url, timeout)?;

        if let Some(headers) = config.get("headers").and_then(serde_json::Value::as_object) {
            for (key, value) in headers {
                if let Some(value) = value.as_str() {
                    notifier = notifier.with_header(key.as_str(), value);
                }
            }
        }

        Ok(notifier)
    }

    /// Target URL
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(
        &self,
        exception: &ExceptionRecord,
        options: NotifyOptions,
    ) -> Result<(), NotifierError> {
        let payload = WebhookPayload {
            notice_id: Uuid::new_v4().to_string(),
            exception: &exception.type_name,
            message: &exception.message,
            backtrace: exception.backtrace.as_deref().unwrap_or_default(),
            accumulated_errors_count: options.accumulated_errors_count.unwrap_or(1),
            occurred_at: exception.occurred_at,
            data: &options.data,
        };

        let mut request = self.client.post(&self.url).json(&payload);
        for (key, value) in &self.headers {
            request = request.header(key, value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| NotifierError::HttpError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(NotifierError::HttpError(format!(
                "Webhook returned {}: {}",
                status, body
            )));
        }

        info!(exception = %exception.type_name, url = %self.url, "Webhook notification sent");
        Ok(())
    }
}

// Generic webhook payload
#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    notice_id: String,
    exception: &'a str,
    message: &'a str,
    backtrace: &'a [String],
    accumulated_errors_count: u64,
    occurred_at: DateTime<Utc>,
    data: &'a serde_json::Map<String, serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn boom() -> ExceptionRecord {
        ExceptionRecord::new("RuntimeError", "boom").with_backtrace(["/a:1"])
    }

    #[tokio::test]
    async fn test_fn_notifier_passes_options() {
        let notifier = FnNotifier::new(|exception, options| {
            assert_eq!(exception.type_name, "RuntimeError");
            assert_eq!(options.accumulated_errors_count, Some(3));
            Ok(())
        });

        let options = NotifyOptions {
            accumulated_errors_count: Some(3),
            ..NotifyOptions::default()
        };
        notifier.send(&boom(), options).await.unwrap();
    }

    #[tokio::test]
    async fn test_log_notifier_succeeds() {
        let notifier = LogNotifier::from_config(&json!({ "level": "warn" })).unwrap();
        assert_eq!(notifier.level(), LogLevel::Warn);
        notifier.send(&boom(), NotifyOptions::new()).await.unwrap();
    }

    #[test]
    fn test_log_notifier_rejects_unknown_level() {
        let err = LogNotifier::from_config(&json!({ "level": "loud" })).unwrap_err();
        assert!(matches!(err, NotifierError::ConfigError(_)));
    }

    #[test]
    fn test_webhook_config_requires_url() {
        let err = WebhookNotifier::from_config(&json!({})).unwrap_err();
        assert!(matches!(err, NotifierError::ConfigError(_)));

        let err = WebhookNotifier::from_config(&json!({ "url": "not a url" })).unwrap_err();
        assert!(matches!(err, NotifierError::ConfigError(_)));
    }

    #[tokio::test]
    async fn test_webhook_posts_exception() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hooks/errors"))
            .and(header("x-token", "secret"))
            .and(body_partial_json(json!({
                "exception": "RuntimeError",
                "message": "boom",
                "backtrace": ["/a:1"],
                "accumulated_errors_count": 6,
                "data": { "path": "/orders" }
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = WebhookNotifier::from_config(&json!({
            "url": format!("{}/hooks/errors", server.uri()),
            "headers": { "x-token": "secret" },
            "timeout": "5s"
        }))
        .unwrap();

        let mut options = NotifyOptions::new().with_data("path", "/orders");
        options.accumulated_errors_count = Some(6);

        notifier.send(&boom(), options).await.unwrap();
    }

    #[tokio::test]
    async fn test_webhook_reports_http_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .mount(&server)
            .await;

        let notifier = WebhookNotifier::new(server.uri()).unwrap();
        let err = notifier.send(&boom(), NotifyOptions::new()).await.unwrap_err();

        match err {
            NotifierError::HttpError(msg) => assert!(msg.contains("503")),
            other => panic!("unexpected error: {other}"),
        }
    }
}
