//! Chatbot backend access
//!
//! Wire types, error classification and the HTTP binding of the
//! conversation/chat-support contract.

mod error;
mod http;
mod types;

pub use error::{BackendError, BackendErrorKind};
pub use http::{AdminToken, HttpBackend};
pub use types::{ContactType, Conversation, Message, SenderRole};
