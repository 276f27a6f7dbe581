//! The sink seam plus the log and in-memory sinks.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use scalewatch_core::{BoxFuture, CycleError, NotificationEvent};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("publish to {topic} failed: {reason}")]
    Publish { topic: String, reason: String },
}

impl NotifyError {
    pub fn publish(topic: &str, reason: impl std::fmt::Display) -> Self {
        Self::Publish {
            topic: topic.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<NotifyError> for CycleError {
    fn from(e: NotifyError) -> Self {
        CycleError::NotificationFailed(e.to_string())
    }
}

/// Publishes decision events to a topic.
pub trait NotificationSink: Send + Sync {
    fn name(&self) -> &'static str;

    fn publish<'a>(
        &'a self,
        topic: &'a str,
        event: &'a NotificationEvent,
    ) -> BoxFuture<'a, Result<(), NotifyError>>;
}

/// Writes each event as a structured `info` log line.
#[derive(Debug, Default)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn name(&self) -> &'static str {
        "log"
    }

    fn publish<'a>(
        &'a self,
        topic: &'a str,
        event: &'a NotificationEvent,
    ) -> BoxFuture<'a, Result<(), NotifyError>> {
        Box::pin(async move {
            let payload = serde_json::to_string(event).map_err(|e| NotifyError::publish(topic, e))?;
            info!(
                %topic,
                service = %event.service_id,
                anomalous = event.verdict.is_anomalous,
                from = event.decision.previous_count,
                to = event.decision.new_count,
                %payload,
                "scaling decision"
            );
            Ok(())
        })
    }
}

/// Keeps published events in memory; can be switched to fail.
#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<(String, NotificationEvent)>>,
    failing: AtomicBool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose every publish fails.
    pub fn failing() -> Self {
        let sink = Self::default();
        sink.set_failing(true);
        sink
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }

    /// Published `(topic, event)` pairs, oldest first.
    pub fn events(&self) -> Vec<(String, NotificationEvent)> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl NotificationSink for MemorySink {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn publish<'a>(
        &'a self,
        topic: &'a str,
        event: &'a NotificationEvent,
    ) -> BoxFuture<'a, Result<(), NotifyError>> {
        Box::pin(async move {
            if self.failing.load(Ordering::Relaxed) {
                return Err(NotifyError::publish(topic, "sink unavailable"));
            }
            self.events
                .lock()
                .map_err(|e| NotifyError::publish(topic, e))?
                .push((topic.to_string(), event.clone()));
            Ok(())
        })
    }
}
