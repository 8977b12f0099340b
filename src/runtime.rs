//! Runtime for driving the console
//!
//! Owns the `ConsoleState`, applies events through the pure transition
//! function, executes effects (backend calls, polling loops) and publishes
//! the resulting view.

mod executor;
mod polling;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use executor::ConsoleRuntime;
pub use traits::*;

use crate::state_machine::{ConsoleState, Event, Notice};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Polling cadence of the two refresh loops
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollIntervals {
    pub directory: Duration,
    pub log: Duration,
}

impl Default for PollIntervals {
    fn default() -> Self {
        Self {
            directory: Duration::from_secs(10),
            log: Duration::from_secs(5),
        }
    }
}

/// Events sent to views alongside state changes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleEvent {
    /// Operator request refused without contacting the backend
    Rejected { message: String },
    Notice(Notice),
}

/// Handle to interact with a running console runtime
#[derive(Clone)]
pub struct ConsoleHandle {
    event_tx: mpsc::Sender<Event>,
    view_rx: watch::Receiver<ConsoleState>,
    broadcast_tx: broadcast::Sender<ConsoleEvent>,
    shutdown: CancellationToken,
}

impl ConsoleHandle {
    /// Send an operator event to the runtime
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.event_tx
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {e}"))
    }

    /// Type `text` into the input box and send it
    pub async fn send_text(&self, text: impl Into<String>) -> Result<(), String> {
        self.send(Event::InputChanged { text: text.into() }).await?;
        self.send(Event::SendRequested).await
    }

    /// Watch the published view
    pub fn view(&self) -> watch::Receiver<ConsoleState> {
        self.view_rx.clone()
    }

    /// Subscribe to rejections and notices
    pub fn subscribe(&self) -> broadcast::Receiver<ConsoleEvent> {
        self.broadcast_tx.subscribe()
    }

    /// Unmount: stop every polling loop and the event loop
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

/// Start a runtime on the current tokio runtime
pub fn spawn<B: ChatBackend + 'static>(
    backend: Arc<B>,
    intervals: PollIntervals,
) -> (ConsoleHandle, JoinHandle<()>) {
    let (event_tx, event_rx) = mpsc::channel(64);
    let (view_tx, view_rx) = watch::channel(ConsoleState::default());
    let (broadcast_tx, _) = broadcast::channel(64);
    let shutdown = CancellationToken::new();

    let runtime = ConsoleRuntime::new(
        backend,
        intervals,
        event_rx,
        event_tx.clone(),
        view_tx,
        broadcast_tx.clone(),
        shutdown.clone(),
    );
    let task = tokio::spawn(runtime.run());

    let handle = ConsoleHandle {
        event_tx,
        view_rx,
        broadcast_tx,
        shutdown,
    };
    (handle, task)
}
