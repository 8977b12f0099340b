//! Pure state transition function
//!
//! Given the same state and event, `transition` always produces the same
//! new state and effects, with no I/O.

use super::effect::Notice;
use super::state::{derive_session_state, FetchFailure, Selection, SessionChange, SessionState, ViewMode};
use super::{ConsoleState, Effect, Event};
use crate::backend::{BackendErrorKind, Conversation, Message};
use thiserror::Error;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: ConsoleState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: ConsoleState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }
}

/// Operator requests refused locally. A refused request never changes
/// state and never reaches the backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("No conversation is open")]
    NoSelection,
    #[error("Chat support is not active for this conversation; start a session first")]
    SessionNotActive,
    #[error("Chat support is already active for this conversation")]
    SessionAlreadyActive,
    #[error("Ending chat support notifies the user and cannot be undone; confirm to proceed")]
    ConfirmationRequired,
    #[error("A message is still being sent")]
    SendInFlight,
    #[error("A chat support session change is already in progress")]
    SessionChangeInProgress,
    #[error("Invalid phone number: {0:?}")]
    InvalidPhone(String),
}

/// Pure transition function
pub fn transition(state: &ConsoleState, event: Event) -> Result<TransitionResult, TransitionError> {
    match event {
        // ============================================================
        // Directory
        // ============================================================
        Event::DirectoryLoaded { seq, conversations } => {
            if seq <= state.directory_seq {
                return Ok(TransitionResult::new(state.clone()));
            }
            Ok(directory_loaded(state, seq, conversations))
        }

        Event::DirectoryFailed { seq, message } => {
            if seq <= state.directory_seq {
                return Ok(TransitionResult::new(state.clone()));
            }
            let mut next = state.clone();
            next.directory_seq = seq;
            next.banners.directory = Some(FetchFailure::bump(state.banners.directory.as_ref(), message));
            Ok(TransitionResult::new(next))
        }

        // ============================================================
        // Message log
        // ============================================================
        Event::LogLoaded {
            phone,
            epoch,
            seq,
            messages,
        } => Ok(log_loaded(state, &phone, epoch, seq, messages)),

        Event::LogFailed {
            phone,
            epoch,
            seq,
            message,
        } => {
            if !state.is_current(&phone, epoch) || seq <= state.log_seq {
                return Ok(TransitionResult::new(state.clone()));
            }
            let mut next = state.clone();
            next.log_seq = seq;
            next.banners.log = Some(FetchFailure::bump(state.banners.log.as_ref(), message));
            Ok(TransitionResult::new(next))
        }

        // ============================================================
        // Selection and navigation
        // ============================================================
        Event::Select { phone } => {
            let phone = phone.trim().to_string();
            if phone.is_empty() {
                return Err(TransitionError::InvalidPhone(phone));
            }
            let mut next = state.clone();
            next.view = ViewMode::Detail;
            if state.selected_phone() == Some(phone.as_str()) {
                return Ok(TransitionResult::new(next));
            }
            let effects = select(&mut next, phone);
            Ok(TransitionResult::new(next).with_effects(effects))
        }

        Event::Back => {
            let mut next = state.clone();
            next.view = ViewMode::List;
            Ok(TransitionResult::new(next))
        }

        // ============================================================
        // Operator input
        // ============================================================
        Event::InputChanged { text } => {
            if state.is_sending() {
                return Err(TransitionError::SendInFlight);
            }
            let mut next = state.clone();
            next.input = text;
            Ok(TransitionResult::new(next))
        }

        // ============================================================
        // Session transitions
        // ============================================================
        Event::StartRequested { greeting } => {
            let selection = state.selection.clone().ok_or(TransitionError::NoSelection)?;
            if state.session_change.is_some() {
                return Err(TransitionError::SessionChangeInProgress);
            }
            if state.session.is_active() {
                return Err(TransitionError::SessionAlreadyActive);
            }
            let mut next = state.clone();
            next.session_change = Some(SessionChange::Starting);
            next.banners.session = None;
            Ok(TransitionResult::new(next).with_effect(Effect::StartSession {
                phone: selection.phone,
                epoch: selection.epoch,
                greeting: non_blank(greeting),
            }))
        }

        Event::SendRequested => {
            let selection = state.selection.clone().ok_or(TransitionError::NoSelection)?;
            if !state.session.is_active() {
                return Err(TransitionError::SessionNotActive);
            }
            if state.is_sending() {
                return Err(TransitionError::SendInFlight);
            }
            if state.session_change.is_some() {
                return Err(TransitionError::SessionChangeInProgress);
            }
            let text = state.input.trim();
            if text.is_empty() {
                return Ok(TransitionResult::new(state.clone()));
            }
            let text = text.to_string();
            let mut next = state.clone();
            next.outbound = Some(std::mem::take(&mut next.input));
            next.banners.send = None;
            Ok(TransitionResult::new(next).with_effect(Effect::DispatchMessage {
                phone: selection.phone,
                epoch: selection.epoch,
                text,
            }))
        }

        Event::EndRequested { confirmed, farewell } => {
            let selection = state.selection.clone().ok_or(TransitionError::NoSelection)?;
            if state.session_change.is_some() {
                return Err(TransitionError::SessionChangeInProgress);
            }
            if !state.session.is_active() {
                return Err(TransitionError::SessionNotActive);
            }
            if state.is_sending() {
                return Err(TransitionError::SendInFlight);
            }
            if !confirmed {
                return Err(TransitionError::ConfirmationRequired);
            }
            let mut next = state.clone();
            next.session_change = Some(SessionChange::Ending);
            next.banners.session = None;
            Ok(TransitionResult::new(next).with_effect(Effect::EndSession {
                phone: selection.phone,
                epoch: selection.epoch,
                farewell: non_blank(farewell),
            }))
        }

        // ============================================================
        // Backend replies
        // ============================================================
        Event::StartSucceeded { phone, epoch, seq } => {
            if !state.is_current(&phone, epoch) {
                return Ok(TransitionResult::new(state.clone()).with_effect(Effect::FetchDirectory));
            }
            let mut next = state.clone();
            next.session = SessionState::Active;
            next.session_change = None;
            raise_floors(&mut next, seq);
            Ok(TransitionResult::new(next)
                .with_effect(Effect::FetchLog { phone, epoch })
                .with_effect(Effect::FetchDirectory))
        }

        Event::StartFailed {
            phone,
            epoch,
            message,
        } => {
            if !state.is_current(&phone, epoch) {
                return Ok(TransitionResult::new(state.clone()));
            }
            let mut next = state.clone();
            next.session_change = None;
            next.banners.session = Some(format!("Could not start chat support: {message}"));
            Ok(TransitionResult::new(next))
        }

        Event::SendSucceeded { phone, epoch, seq } => {
            if !state.is_current(&phone, epoch) {
                return Ok(TransitionResult::new(state.clone()));
            }
            let mut next = state.clone();
            next.outbound = None;
            // Logs fetched before the send was recorded would hide it
            next.log_seq = next.log_seq.max(seq);
            Ok(TransitionResult::new(next).with_effect(Effect::FetchLog { phone, epoch }))
        }

        Event::SendFailed {
            phone,
            epoch,
            error_kind,
            message,
        } => Ok(send_failed(state, phone, epoch, error_kind, &message)),

        Event::EndSucceeded { phone, epoch, seq } => {
            if !state.is_current(&phone, epoch) {
                return Ok(TransitionResult::new(state.clone()).with_effect(Effect::FetchDirectory));
            }
            let mut next = state.clone();
            next.session = SessionState::Inactive;
            next.session_change = None;
            next.input.clear();
            raise_floors(&mut next, seq);
            Ok(TransitionResult::new(next)
                .with_effect(Effect::FetchLog { phone, epoch })
                .with_effect(Effect::FetchDirectory))
        }

        Event::EndFailed {
            phone,
            epoch,
            message,
        } => {
            if !state.is_current(&phone, epoch) {
                return Ok(TransitionResult::new(state.clone()));
            }
            let mut next = state.clone();
            next.session_change = None;
            next.banners.session = Some(format!("Could not end chat support: {message}"));
            Ok(TransitionResult::new(next))
        }
    }
}

// Helper functions

/// Replace the directory snapshot and reconcile the open conversation's
/// session state against it.
fn directory_loaded(state: &ConsoleState, seq: u64, conversations: Vec<Conversation>) -> TransitionResult {
    let mut next = state.clone();
    next.directory_seq = seq;
    next.conversations = conversations;
    next.directory_loaded = true;
    next.banners.directory = None;

    let Some(selection) = state.selection.as_ref() else {
        // First working view: open the most recent conversation
        let Some(first) = next.conversations.first() else {
            return TransitionResult::new(next);
        };
        let phone = first.phone_number.clone();
        let effects = select(&mut next, phone);
        return TransitionResult::new(next).with_effects(effects);
    };

    let Some(reported) = next.find_conversation(&selection.phone).map(derive_session_state) else {
        return TransitionResult::new(next);
    };
    if reported == state.session {
        return TransitionResult::new(next);
    }

    next.session = reported;
    // A pending start/end will be answered by its own reply; only a change
    // nobody here asked for is news to the operator.
    let expected = match state.session_change {
        Some(SessionChange::Starting) => Some(SessionState::Active),
        Some(SessionChange::Ending) => Some(SessionState::Inactive),
        None => None,
    };
    if expected == Some(reported) {
        return TransitionResult::new(next);
    }
    let phone = selection.phone.clone();
    TransitionResult::new(next).with_effect(Effect::Notify(Notice::SessionChangedElsewhere {
        phone,
        session: reported,
    }))
}

fn log_loaded(
    state: &ConsoleState,
    phone: &str,
    epoch: u64,
    seq: u64,
    messages: Vec<Message>,
) -> TransitionResult {
    if !state.is_current(phone, epoch) || seq <= state.log_seq {
        return TransitionResult::new(state.clone());
    }
    let mut next = state.clone();
    next.log_seq = seq;
    next.messages = messages;
    next.banners.log = None;
    TransitionResult::new(next)
}

fn send_failed(
    state: &ConsoleState,
    phone: String,
    epoch: u64,
    error_kind: BackendErrorKind,
    message: &str,
) -> TransitionResult {
    if !state.is_current(&phone, epoch) {
        return TransitionResult::new(state.clone());
    }
    let mut next = state.clone();
    if let Some(text) = next.outbound.take() {
        next.input = text;
    }

    if error_kind == BackendErrorKind::SessionNotActive {
        next.session = SessionState::Inactive;
        next.banners.send =
            Some("Chat support is no longer active; start a new session to reply".to_string());
        return TransitionResult::new(next)
            .with_effect(Effect::Notify(Notice::SessionExpired { phone }))
            .with_effect(Effect::FetchDirectory);
    }

    next.banners.send = Some(format!("Message not sent: {message}"));
    TransitionResult::new(next)
}

/// A session change the backend acknowledged at `seq`: snapshots fetched
/// before it predate the change and must not override it.
fn raise_floors(next: &mut ConsoleState, seq: u64) {
    next.directory_seq = next.directory_seq.max(seq);
    next.log_seq = next.log_seq.max(seq);
}

/// Switch the open conversation. Returns the polling effects for the switch.
fn select(next: &mut ConsoleState, phone: String) -> Vec<Effect> {
    let mut effects = Vec::with_capacity(2);
    if next.selection.is_some() {
        effects.push(Effect::StopLogPolling);
    }

    let epoch = next.last_epoch + 1;
    next.last_epoch = epoch;
    next.session = next
        .find_conversation(&phone)
        .map_or(SessionState::Inactive, derive_session_state);
    next.selection = Some(Selection {
        phone: phone.clone(),
        epoch,
    });
    next.messages.clear();
    next.session_change = None;
    next.input.clear();
    next.outbound = None;
    next.banners.log = None;
    next.banners.session = None;
    next.banners.send = None;

    effects.push(Effect::StartLogPolling { phone, epoch });
    effects
}

fn non_blank(text: Option<String>) -> Option<String> {
    text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())
}
