use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

use common::{Signal, SignalSink};

/// Writes every signal as a structured log record.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl SignalSink for LogSink {
    async fn deliver(&self, signal: Signal) {
        info!(
            symbol = %signal.symbol,
            interval = %signal.rule.interval,
            crossed = %signal.crossed,
            observed = %signal.observed,
            threshold = %signal.threshold,
            counterpart = %signal.counterpart,
            close = %signal.close_price,
            average = %signal.average,
            "Support volume detected"
        );
    }
}

/// Delivers each signal to several sinks, in order.
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn SignalSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn SignalSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

#[async_trait]
impl SignalSink for FanoutSink {
    async fn deliver(&self, signal: Signal) {
        for sink in &self.sinks {
            sink.deliver(signal.clone()).await;
        }
    }
}

/// Drain the signal queue into `sink` until every sender is dropped.
///
/// Runs apart from the dispatcher so that slow delivery never delays
/// evaluation of later bars.
pub fn spawn_delivery(
    mut signal_rx: mpsc::UnboundedReceiver<Signal>,
    sink: Arc<dyn SignalSink>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(signal) = signal_rx.recv().await {
            sink.deliver(signal).await;
        }
        info!("Signal queue closed, delivery stopped");
    })
}
