use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{info, warn};

use common::{Bar, EngineCommand, EngineState, Subscription};

use crate::binance::KlineStream;

/// Cloneable handle passed to other crates (Telegram, dispatcher).
#[derive(Clone)]
pub struct EngineHandle {
    command_tx: mpsc::Sender<EngineCommand>,
    state: Arc<RwLock<EngineState>>,
    bar_tx: broadcast::Sender<Bar>,
}

impl EngineHandle {
    pub async fn send(&self, cmd: EngineCommand) {
        let _ = self.command_tx.send(cmd).await;
    }

    pub async fn state(&self) -> EngineState {
        *self.state.read().await
    }

    /// Shared state cell, read by the dispatcher before every bar.
    pub fn shared_state(&self) -> Arc<RwLock<EngineState>> {
        self.state.clone()
    }

    /// Subscribe to the closed-bar broadcast.
    pub fn subscribe_bars(&self) -> broadcast::Receiver<Bar> {
        self.bar_tx.subscribe()
    }
}

/// Manages the kline stream lifecycle and command processing.
pub struct Engine {
    subscriptions: Vec<Subscription>,
    state: Arc<RwLock<EngineState>>,
    bar_tx: broadcast::Sender<Bar>,
    command_rx: mpsc::Receiver<EngineCommand>,
}

impl Engine {
    pub fn new(subscriptions: Vec<Subscription>) -> (Self, EngineHandle) {
        let (command_tx, command_rx) = mpsc::channel(32);
        let (bar_tx, _) = broadcast::channel(1024);
        let state = Arc::new(RwLock::new(EngineState::Stopped));

        let handle = EngineHandle {
            command_tx,
            state: state.clone(),
            bar_tx: bar_tx.clone(),
        };

        let engine = Engine {
            subscriptions,
            state,
            bar_tx,
            command_rx,
        };

        (engine, handle)
    }

    /// Run the engine. This task drives stream spawning and command processing
    /// and ends once every handle is dropped. Call from `tokio::spawn`.
    pub async fn run(mut self) {
        info!("Engine initialized in Stopped state. Waiting for Start command.");

        let mut stream_handles: Vec<tokio::task::JoinHandle<()>> = Vec::new();

        while let Some(cmd) = self.command_rx.recv().await {
            match cmd {
                EngineCommand::Start => {
                    let current = *self.state.read().await;
                    if current != EngineState::Stopped {
                        info!(state = %current, "Engine already started");
                        continue;
                    }

                    info!(subscriptions = self.subscriptions.len(), "Starting kline streams");
                    *self.state.write().await = EngineState::Running;

                    // One WebSocket stream per subscription
                    for sub in &self.subscriptions {
                        let stream = KlineStream::new(sub.clone(), self.bar_tx.clone());
                        stream_handles.push(tokio::spawn(stream.run()));
                    }
                }

                EngineCommand::Stop => {
                    info!("Engine stopping, aborting stream tasks");
                    *self.state.write().await = EngineState::Stopped;
                    for h in stream_handles.drain(..) {
                        h.abort();
                    }
                }

                EngineCommand::Pause => {
                    let current = *self.state.read().await;
                    if current == EngineState::Running {
                        info!("Engine paused, streams continue, evaluation suppressed");
                        *self.state.write().await = EngineState::Paused;
                    }
                }

                EngineCommand::Resume => {
                    let current = *self.state.read().await;
                    if current == EngineState::Paused {
                        info!("Engine resumed");
                        *self.state.write().await = EngineState::Running;
                    } else {
                        warn!(state = %current, "Resume received but engine is not paused");
                    }
                }
            }
        }

        warn!("Engine command channel closed, shutting down");
        for h in stream_handles.drain(..) {
            h.abort();
        }
    }
}
