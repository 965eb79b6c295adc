//! Fire-and-forget failure alerting
//!
//! The notification subsystem is write-only from the pipeline's point of
//! view: `alert` spawns a detached task and returns immediately. Delivery
//! failures are logged and swallowed; nothing ever propagates back into
//! the pipeline's result.

use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Out-of-band alert dispatch. Never raises, never blocks the caller.
pub trait AlertSink: Send + Sync {
    fn alert(&self, module: &str, error: &str, detail: &str);
}

/// Alert sink that posts a JSON payload to a configured webhook.
///
/// With no webhook configured it degrades to a log line, so the pipeline
/// behaves identically in development.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: Option<String>,
}

#[derive(Debug, Serialize)]
struct AlertPayload {
    module: String,
    error: String,
    detail: String,
}

impl WebhookNotifier {
    pub fn new(url: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self { client, url }
    }
}

impl AlertSink for WebhookNotifier {
    fn alert(&self, module: &str, error: &str, detail: &str) {
        warn!(module, error, "dispatching failure alert");

        let Some(url) = self.url.clone() else {
            debug!(module, "no alert webhook configured, alert logged only");
            return;
        };

        let client = self.client.clone();
        let payload = AlertPayload {
            module: module.to_string(),
            error: error.to_string(),
            detail: detail.to_string(),
        };

        tokio::spawn(async move {
            match client.post(&url).json(&payload).send().await {
                Ok(response) if response.status().is_success() => {
                    debug!(module = %payload.module, "alert delivered");
                }
                Ok(response) => {
                    warn!(status = %response.status(), "alert webhook rejected payload");
                }
                Err(e) => {
                    warn!(error = %e, "alert webhook unreachable");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_alert_without_webhook_never_panics() {
        let notifier = WebhookNotifier::new(None);
        notifier.alert("Embedding", "timeout", "query: vpn failure");
    }

    #[tokio::test]
    async fn test_alert_with_unreachable_webhook_returns_immediately() {
        let notifier = WebhookNotifier::new(Some("http://127.0.0.1:1/alerts".to_string()));
        let start = std::time::Instant::now();
        notifier.alert("Index", "connection refused", "");
        // Dispatch is spawn-and-return, not awaited.
        assert!(start.elapsed() < Duration::from_millis(100));
    }
}
