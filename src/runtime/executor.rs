//! Console runtime executor

use super::polling::{fetch_directory, fetch_log, spawn_directory_loop, spawn_log_loop, Sequencer};
use super::traits::ChatBackend;
use super::{ConsoleEvent, PollIntervals};
use crate::state_machine::{transition, ConsoleState, Effect, Event};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;

/// Generic console runtime that can work with any backend implementation
pub struct ConsoleRuntime<B>
where
    B: ChatBackend + 'static,
{
    state: ConsoleState,
    backend: Arc<B>,
    intervals: PollIntervals,
    event_rx: mpsc::Receiver<Event>,
    event_tx: mpsc::Sender<Event>,
    view_tx: watch::Sender<ConsoleState>,
    broadcast_tx: broadcast::Sender<ConsoleEvent>,
    /// Cancelled on unmount; parent of every polling token
    shutdown: CancellationToken,
    /// Token of the log polling loop for the current selection
    log_poll: Option<CancellationToken>,
    sequencer: Sequencer,
}

impl<B> ConsoleRuntime<B>
where
    B: ChatBackend + 'static,
{
    pub fn new(
        backend: Arc<B>,
        intervals: PollIntervals,
        event_rx: mpsc::Receiver<Event>,
        event_tx: mpsc::Sender<Event>,
        view_tx: watch::Sender<ConsoleState>,
        broadcast_tx: broadcast::Sender<ConsoleEvent>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            state: ConsoleState::default(),
            backend,
            intervals,
            event_rx,
            event_tx,
            view_tx,
            broadcast_tx,
            shutdown,
            log_poll: None,
            sequencer: Sequencer::default(),
        }
    }

    pub async fn run(mut self) {
        tracing::info!(
            directory_every = ?self.intervals.directory,
            log_every = ?self.intervals.log,
            "Starting console runtime"
        );

        spawn_directory_loop(
            self.backend.clone(),
            self.intervals.directory,
            self.sequencer.clone(),
            self.event_tx.clone(),
            self.shutdown.child_token(),
        );

        // Process events in a loop until unmounted
        loop {
            tokio::select! {
                biased;
                () = self.shutdown.cancelled() => break,
                Some(event) = self.event_rx.recv() => self.process_event(event),
            }
        }

        self.stop_log_polling();
        tracing::info!("Console runtime stopped");
    }

    fn process_event(&mut self, event: Event) {
        let name = event.name();
        if let Some((phone, epoch)) = event.selection() {
            if !self.state.is_current(phone, epoch) {
                tracing::debug!(event = name, phone, epoch, "Discarding result for a previous selection");
            }
        }
        if let Event::DirectoryLoaded { seq, .. } | Event::DirectoryFailed { seq, .. } = &event {
            if *seq <= self.state.directory_seq {
                tracing::debug!(event = name, seq, "Discarding directory response older than the view");
            }
        }
        let result = match transition(&self.state, event) {
            Ok(r) => r,
            Err(e) => {
                // Rejections are operator-facing (e.g. "confirm to proceed")
                tracing::debug!(event = name, error = %e, "Request rejected");
                let _ = self.broadcast_tx.send(ConsoleEvent::Rejected {
                    message: e.to_string(),
                });
                return;
            }
        };

        self.state = result.new_state;
        self.publish();

        for effect in result.effects {
            self.execute_effect(effect);
        }
    }

    /// Push the state to views; events that change nothing wake no one
    fn publish(&self) {
        let state = &self.state;
        self.view_tx.send_if_modified(|view| {
            if *view == *state {
                false
            } else {
                view.clone_from(state);
                true
            }
        });
    }

    fn stop_log_polling(&mut self) {
        if let Some(token) = self.log_poll.take() {
            token.cancel();
        }
    }

    /// Execute an effect. Backend calls run on their own tasks and report
    /// back through the event channel.
    fn execute_effect(&mut self, effect: Effect) {
        match effect {
            Effect::FetchDirectory => {
                let backend = self.backend.clone();
                let event_tx = self.event_tx.clone();
                let seq = self.sequencer.next();
                tokio::spawn(async move {
                    let event = fetch_directory(&*backend, seq).await;
                    let _ = event_tx.send(event).await;
                });
            }

            Effect::FetchLog { phone, epoch } => {
                let backend = self.backend.clone();
                let event_tx = self.event_tx.clone();
                let seq = self.sequencer.next();
                tokio::spawn(async move {
                    let event = fetch_log(&*backend, phone, epoch, seq).await;
                    let _ = event_tx.send(event).await;
                });
            }

            Effect::StartLogPolling { phone, epoch } => {
                self.stop_log_polling();
                let token = self.shutdown.child_token();
                self.log_poll = Some(token.clone());
                tracing::info!(phone = %phone, epoch, "Opening conversation");
                spawn_log_loop(
                    self.backend.clone(),
                    phone,
                    epoch,
                    self.intervals.log,
                    self.sequencer.clone(),
                    self.event_tx.clone(),
                    token,
                );
            }

            Effect::StopLogPolling => self.stop_log_polling(),

            Effect::StartSession {
                phone,
                epoch,
                greeting,
            } => {
                let backend = self.backend.clone();
                let event_tx = self.event_tx.clone();
                let sequencer = self.sequencer.clone();
                tokio::spawn(async move {
                    tracing::info!(phone = %phone, "Starting chat support");
                    let result = backend.start_chat_support(&phone, greeting.as_deref()).await;
                    let event = match result {
                        Ok(()) => Event::StartSucceeded {
                            phone,
                            epoch,
                            seq: sequencer.next(),
                        },
                        Err(e) => Event::StartFailed {
                            phone,
                            epoch,
                            message: e.to_string(),
                        },
                    };
                    let _ = event_tx.send(event).await;
                });
            }

            Effect::DispatchMessage { phone, epoch, text } => {
                let backend = self.backend.clone();
                let event_tx = self.event_tx.clone();
                let sequencer = self.sequencer.clone();
                tokio::spawn(async move {
                    let result = backend.send_chat_support_message(&phone, &text).await;
                    let event = match result {
                        Ok(()) => Event::SendSucceeded {
                            phone,
                            epoch,
                            seq: sequencer.next(),
                        },
                        Err(e) => Event::SendFailed {
                            phone,
                            epoch,
                            error_kind: e.kind,
                            message: e.message,
                        },
                    };
                    let _ = event_tx.send(event).await;
                });
            }

            Effect::EndSession {
                phone,
                epoch,
                farewell,
            } => {
                let backend = self.backend.clone();
                let event_tx = self.event_tx.clone();
                let sequencer = self.sequencer.clone();
                tokio::spawn(async move {
                    tracing::info!(phone = %phone, "Ending chat support");
                    let result = backend.end_chat_support(&phone, farewell.as_deref()).await;
                    let event = match result {
                        Ok(()) => Event::EndSucceeded {
                            phone,
                            epoch,
                            seq: sequencer.next(),
                        },
                        Err(e) => Event::EndFailed {
                            phone,
                            epoch,
                            message: e.to_string(),
                        },
                    };
                    let _ = event_tx.send(event).await;
                });
            }

            Effect::Notify(notice) => {
                tracing::info!(notice = ?notice, "Notifying views");
                let _ = self.broadcast_tx.send(ConsoleEvent::Notice(notice));
            }
        }
    }
}
