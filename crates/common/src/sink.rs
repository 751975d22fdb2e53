use async_trait::async_trait;

use crate::Signal;

/// Receives emitted signals for delivery (user notification, logging, ...).
///
/// Delivery is fire-and-forget: implementations handle and log their own
/// failures and never report them back to the evaluator.
#[async_trait]
pub trait SignalSink: Send + Sync {
    async fn deliver(&self, signal: Signal);
}
