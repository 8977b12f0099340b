//! Periodic refresh loops
//!
//! Each loop awaits its own fetch before the next tick, so a loop never
//! overlaps itself. Cancelling a loop's token stops the timer; a fetch that
//! was already in flight is not aborted, its result is dropped.

use super::traits::ChatBackend;
use crate::state_machine::Event;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Hands out request sequence numbers, shared by every fetch and reply task
/// of one runtime. A response stamped lower was issued earlier.
#[derive(Debug, Clone, Default)]
pub(super) struct Sequencer(Arc<AtomicU64>);

impl Sequencer {
    pub(super) fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }
}

pub(super) async fn fetch_directory<B: ChatBackend + ?Sized>(backend: &B, seq: u64) -> Event {
    match backend.list_conversations().await {
        Ok(conversations) => Event::DirectoryLoaded { seq, conversations },
        Err(e) => {
            tracing::warn!(seq, kind = ?e.kind, error = %e, "Directory refresh failed");
            Event::DirectoryFailed {
                seq,
                message: e.to_string(),
            }
        }
    }
}

pub(super) async fn fetch_log<B: ChatBackend + ?Sized>(
    backend: &B,
    phone: String,
    epoch: u64,
    seq: u64,
) -> Event {
    match backend.list_messages(&phone).await {
        Ok(messages) => Event::LogLoaded {
            phone,
            epoch,
            seq,
            messages,
        },
        Err(e) => {
            tracing::warn!(phone = %phone, epoch, seq, kind = ?e.kind, error = %e, "Message log refresh failed");
            Event::LogFailed {
                phone,
                epoch,
                seq,
                message: e.to_string(),
            }
        }
    }
}

pub(super) fn spawn_directory_loop<B: ChatBackend + 'static>(
    backend: Arc<B>,
    every: Duration,
    sequencer: Sequencer,
    event_tx: mpsc::Sender<Event>,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        tracing::debug!(every = ?every, "Directory polling started");
        run_loop(every, &cancel, &event_tx, || {
            fetch_directory(&*backend, sequencer.next())
        })
        .await;
        tracing::debug!("Directory polling stopped");
    });
}

pub(super) fn spawn_log_loop<B: ChatBackend + 'static>(
    backend: Arc<B>,
    phone: String,
    epoch: u64,
    every: Duration,
    sequencer: Sequencer,
    event_tx: mpsc::Sender<Event>,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        tracing::debug!(phone = %phone, epoch, every = ?every, "Log polling started");
        run_loop(every, &cancel, &event_tx, || {
            fetch_log(&*backend, phone.clone(), epoch, sequencer.next())
        })
        .await;
        tracing::debug!(phone = %phone, epoch, "Log polling stopped");
    });
}

async fn run_loop<F, Fut>(
    every: Duration,
    cancel: &CancellationToken,
    event_tx: &mpsc::Sender<Event>,
    mut fetch: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = Event>,
{
    // First tick completes immediately: a new loop fetches right away
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let event = fetch().await;

        if cancel.is_cancelled() {
            tracing::debug!(event = event.name(), "Dropping result of stopped poll loop");
            break;
        }
        if event_tx.send(event).await.is_err() {
            break;
        }
    }
}
