//! Events that drive the console

use crate::backend::{BackendErrorKind, Conversation, Message};

/// Events that trigger state transitions
#[derive(Debug, Clone)]
pub enum Event {
    // Directory fetches; `seq` is the request sequence number taken when
    // the fetch was issued
    DirectoryLoaded {
        seq: u64,
        conversations: Vec<Conversation>,
    },
    DirectoryFailed {
        seq: u64,
        message: String,
    },

    // Log fetches; tagged with the selection they were issued for
    LogLoaded {
        phone: String,
        epoch: u64,
        seq: u64,
        messages: Vec<Message>,
    },
    LogFailed {
        phone: String,
        epoch: u64,
        seq: u64,
        message: String,
    },

    // Operator actions
    Select {
        phone: String,
    },
    Back,
    InputChanged {
        text: String,
    },
    StartRequested {
        greeting: Option<String>,
    },
    SendRequested,
    EndRequested {
        /// Operator acknowledged that ending notifies the user
        confirmed: bool,
        farewell: Option<String>,
    },

    // Backend replies to session requests. Successful replies carry a
    // sequence number taken once the backend acknowledged the change.
    StartSucceeded {
        phone: String,
        epoch: u64,
        seq: u64,
    },
    StartFailed {
        phone: String,
        epoch: u64,
        message: String,
    },
    SendSucceeded {
        phone: String,
        epoch: u64,
        seq: u64,
    },
    SendFailed {
        phone: String,
        epoch: u64,
        error_kind: BackendErrorKind,
        message: String,
    },
    EndSucceeded {
        phone: String,
        epoch: u64,
        seq: u64,
    },
    EndFailed {
        phone: String,
        epoch: u64,
        message: String,
    },
}

impl Event {
    /// Selection a result was issued for; `None` for untagged events
    pub fn selection(&self) -> Option<(&str, u64)> {
        match self {
            Event::LogLoaded { phone, epoch, .. }
            | Event::LogFailed { phone, epoch, .. }
            | Event::StartSucceeded { phone, epoch, .. }
            | Event::StartFailed { phone, epoch, .. }
            | Event::SendSucceeded { phone, epoch, .. }
            | Event::SendFailed { phone, epoch, .. }
            | Event::EndSucceeded { phone, epoch, .. }
            | Event::EndFailed { phone, epoch, .. } => Some((phone.as_str(), *epoch)),
            _ => None,
        }
    }

    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Event::DirectoryLoaded { .. } => "directory_loaded",
            Event::DirectoryFailed { .. } => "directory_failed",
            Event::LogLoaded { .. } => "log_loaded",
            Event::LogFailed { .. } => "log_failed",
            Event::Select { .. } => "select",
            Event::Back => "back",
            Event::InputChanged { .. } => "input_changed",
            Event::StartRequested { .. } => "start_requested",
            Event::SendRequested => "send_requested",
            Event::EndRequested { .. } => "end_requested",
            Event::StartSucceeded { .. } => "start_succeeded",
            Event::StartFailed { .. } => "start_failed",
            Event::SendSucceeded { .. } => "send_succeeded",
            Event::SendFailed { .. } => "send_failed",
            Event::EndSucceeded { .. } => "end_succeeded",
            Event::EndFailed { .. } => "end_failed",
        }
    }
}
