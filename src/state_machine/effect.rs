//! Effects produced by state transitions

use super::state::SessionState;

/// Effects to be executed after a state transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// One-shot directory refresh, outside the regular cadence
    FetchDirectory,

    /// One-shot log refresh for the given selection
    FetchLog { phone: String, epoch: u64 },

    /// Replace the log polling loop with one for this selection
    StartLogPolling { phone: String, epoch: u64 },

    /// Tear down the log polling loop
    StopLogPolling,

    /// Ask the backend to hand the conversation to the operator
    StartSession {
        phone: String,
        epoch: u64,
        greeting: Option<String>,
    },

    /// Deliver an operator message
    DispatchMessage {
        phone: String,
        epoch: u64,
        text: String,
    },

    /// Hand the conversation back to the bot
    EndSession {
        phone: String,
        epoch: u64,
        farewell: Option<String>,
    },

    /// Tell connected views about something that is not a state change
    Notify(Notice),
}

/// Out-of-band information for the operator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// The directory reports a different session state than we believed,
    /// e.g. another operator started or ended the session
    SessionChangedElsewhere {
        phone: String,
        session: SessionState,
    },
    /// A send was refused because the backend has no active session
    SessionExpired { phone: String },
}

impl Notice {
    pub fn message(&self) -> String {
        match self {
            Notice::SessionChangedElsewhere { phone, session } => {
                format!("Chat support for {phone} is now {} (changed elsewhere)", session.label())
            }
            Notice::SessionExpired { phone } => {
                format!("Chat support for {phone} is no longer active; start a new session")
            }
        }
    }
}
