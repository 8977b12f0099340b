//! Console state types

use crate::backend::{Conversation, Message};
use serde::{Deserialize, Serialize};

// ============================================================================
// Chat-Support Session
// ============================================================================

/// Whether a human operator has taken the conversation over from the bot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Inactive,
    Active,
}

impl SessionState {
    pub fn is_active(self) -> bool {
        matches!(self, SessionState::Active)
    }

    pub fn label(self) -> &'static str {
        match self {
            SessionState::Inactive => "inactive",
            SessionState::Active => "active",
        }
    }
}

/// Session state as reported by the backend for one conversation
pub fn derive_session_state(conversation: &Conversation) -> SessionState {
    if conversation.is_chat_support {
        SessionState::Active
    } else {
        SessionState::Inactive
    }
}

/// A start or end request awaiting the backend's answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionChange {
    Starting,
    Ending,
}

// ============================================================================
// Selection
// ============================================================================

/// The open conversation. `epoch` is bumped on every selection change so
/// results issued for an earlier selection can be recognised and dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub phone: String,
    pub epoch: u64,
}

/// Small-viewport navigation flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewMode {
    #[default]
    List,
    Detail,
}

// ============================================================================
// Error banners
// ============================================================================

/// A polling failure, kept until the next successful fetch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchFailure {
    pub message: String,
    /// Failed fetches in a row
    pub consecutive: u32,
}

impl FetchFailure {
    pub(crate) fn bump(previous: Option<&FetchFailure>, message: String) -> Self {
        Self {
            message,
            consecutive: previous.map_or(1, |f| f.consecutive.saturating_add(1)),
        }
    }
}

/// User-visible errors, one slot per screen area
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Banners {
    /// Next to the conversation list
    pub directory: Option<FetchFailure>,
    /// Above the message log
    pub log: Option<FetchFailure>,
    /// In the conversation header (start/end failures)
    pub session: Option<String>,
    /// Next to the input box
    pub send: Option<String>,
}

// ============================================================================
// Console State
// ============================================================================

/// Everything the operator sees. Owned by the runtime's event loop and only
/// changed through `transition`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConsoleState {
    /// Last successful directory snapshot, in backend order
    pub conversations: Vec<Conversation>,
    pub directory_loaded: bool,
    pub selection: Option<Selection>,
    /// Highest epoch handed out so far
    pub last_epoch: u64,
    /// Newest directory response applied, or the last local session change
    /// if later. Responses to fetches issued at or before it are dropped.
    pub directory_seq: u64,
    /// Same floor for the message log
    pub log_seq: u64,
    /// Log of the selected conversation, exactly as last fetched
    pub messages: Vec<Message>,
    pub session: SessionState,
    pub session_change: Option<SessionChange>,
    /// Operator's draft
    pub input: String,
    /// Text of the send currently in flight; the input is locked meanwhile
    pub outbound: Option<String>,
    pub view: ViewMode,
    pub banners: Banners,
}

impl ConsoleState {
    pub fn selected_phone(&self) -> Option<&str> {
        self.selection.as_ref().map(|s| s.phone.as_str())
    }

    pub fn selected_conversation(&self) -> Option<&Conversation> {
        let phone = self.selected_phone()?;
        self.find_conversation(phone)
    }

    pub fn find_conversation(&self, phone: &str) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.phone_number == phone)
    }

    /// Whether a result tagged with `phone`/`epoch` still belongs to the
    /// open conversation
    pub fn is_current(&self, phone: &str, epoch: u64) -> bool {
        self.selection
            .as_ref()
            .is_some_and(|s| s.epoch == epoch && s.phone == phone)
    }

    pub fn is_sending(&self) -> bool {
        self.outbound.is_some()
    }
}
