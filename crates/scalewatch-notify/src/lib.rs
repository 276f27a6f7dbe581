//! scalewatch-notify — publishing cycle decisions.
//!
//! Every applied (or deliberately skipped) scaling decision is published as
//! a [`NotificationEvent`](scalewatch_core::NotificationEvent) on a topic.
//! Publishing is best effort: failures are reported back to the loop, which
//! records them without undoing the decision. Nothing is retried.

pub mod sink;
pub mod webhook;

pub use sink::{LogSink, MemorySink, NotificationSink, NotifyError};
pub use webhook::WebhookSink;
