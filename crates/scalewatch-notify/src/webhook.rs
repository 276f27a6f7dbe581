//! HTTP webhook sink.

use http::Method;
use scalewatch_core::{BoxFuture, JsonClient, NotificationEvent};
use serde::Serialize;
use tracing::debug;

use crate::sink::{NotificationSink, NotifyError};

/// POSTs `{"topic": .., "event": {..}}` to a webhook endpoint. The
/// response body is ignored.
pub struct WebhookSink {
    client: JsonClient,
    path: String,
}

#[derive(Serialize)]
struct Envelope<'a> {
    topic: &'a str,
    event: &'a NotificationEvent,
}

impl WebhookSink {
    pub fn new(client: JsonClient, path: impl Into<String>) -> Self {
        Self {
            client,
            path: path.into(),
        }
    }
}

impl NotificationSink for WebhookSink {
    fn name(&self) -> &'static str {
        "webhook"
    }

    fn publish<'a>(
        &'a self,
        topic: &'a str,
        event: &'a NotificationEvent,
    ) -> BoxFuture<'a, Result<(), NotifyError>> {
        Box::pin(async move {
            self.client
                .send_json(Method::POST, &self.path, &Envelope { topic, event })
                .await
                .map_err(|e| NotifyError::publish(topic, format!("{}: {e}", self.client.address())))?;
            debug!(%topic, service = %event.service_id, "webhook delivered");
            Ok(())
        })
    }
}
