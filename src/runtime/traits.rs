//! Trait abstractions for runtime I/O
//!
//! The runtime only talks to the backend through `ChatBackend`, so the
//! executor can be driven by mock implementations in tests.

use crate::backend::{BackendError, Conversation, Message};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;

/// Request/response contract with the message store and bot engine
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// All known conversations, most recently active first
    async fn list_conversations(&self) -> Result<Vec<Conversation>, BackendError>;

    /// Full message log of one conversation
    async fn list_messages(&self, phone: &str) -> Result<Vec<Message>, BackendError>;

    /// Take the conversation over from the bot
    async fn start_chat_support(
        &self,
        phone: &str,
        greeting: Option<&str>,
    ) -> Result<(), BackendError>;

    /// Deliver an operator-authored message; recorded before this returns
    async fn send_chat_support_message(&self, phone: &str, text: &str)
        -> Result<(), BackendError>;

    /// Hand the conversation back to the bot
    async fn end_chat_support(&self, phone: &str, farewell: Option<&str>)
        -> Result<(), BackendError>;
}

// ============================================================================
// Arc implementation for trait objects
// ============================================================================

#[async_trait]
impl<T: ChatBackend + ?Sized> ChatBackend for Arc<T> {
    async fn list_conversations(&self) -> Result<Vec<Conversation>, BackendError> {
        (**self).list_conversations().await
    }

    async fn list_messages(&self, phone: &str) -> Result<Vec<Message>, BackendError> {
        (**self).list_messages(phone).await
    }

    async fn start_chat_support(
        &self,
        phone: &str,
        greeting: Option<&str>,
    ) -> Result<(), BackendError> {
        (**self).start_chat_support(phone, greeting).await
    }

    async fn send_chat_support_message(
        &self,
        phone: &str,
        text: &str,
    ) -> Result<(), BackendError> {
        (**self).send_chat_support_message(phone, text).await
    }

    async fn end_chat_support(
        &self,
        phone: &str,
        farewell: Option<&str>,
    ) -> Result<(), BackendError> {
        (**self).end_chat_support(phone, farewell).await
    }
}

// ============================================================================
// Logging wrapper
// ============================================================================

/// Logs duration and outcome of every backend call
pub struct LoggingBackend {
    inner: Arc<dyn ChatBackend>,
}

impl LoggingBackend {
    pub fn new(inner: Arc<dyn ChatBackend>) -> Self {
        Self { inner }
    }
}

fn log_outcome<T>(
    op: &'static str,
    phone: Option<&str>,
    started: Instant,
    result: &Result<T, BackendError>,
) {
    let elapsed = started.elapsed();
    let phone = phone.unwrap_or("-");
    match result {
        Ok(_) => tracing::debug!(op, phone, elapsed = ?elapsed, "Backend call succeeded"),
        Err(e) if e.kind.is_transient() => tracing::warn!(
            op,
            phone,
            elapsed = ?elapsed,
            kind = ?e.kind,
            error = %e,
            "Backend call failed"
        ),
        Err(e) => tracing::error!(
            op,
            phone,
            elapsed = ?elapsed,
            kind = ?e.kind,
            error = %e,
            "Backend call refused"
        ),
    }
}

#[async_trait]
impl ChatBackend for LoggingBackend {
    async fn list_conversations(&self) -> Result<Vec<Conversation>, BackendError> {
        let started = Instant::now();
        let result = self.inner.list_conversations().await;
        log_outcome("list_conversations", None, started, &result);
        result
    }

    async fn list_messages(&self, phone: &str) -> Result<Vec<Message>, BackendError> {
        let started = Instant::now();
        let result = self.inner.list_messages(phone).await;
        log_outcome("list_messages", Some(phone), started, &result);
        result
    }

    async fn start_chat_support(
        &self,
        phone: &str,
        greeting: Option<&str>,
    ) -> Result<(), BackendError> {
        let started = Instant::now();
        let result = self.inner.start_chat_support(phone, greeting).await;
        log_outcome("start_chat_support", Some(phone), started, &result);
        result
    }

    async fn send_chat_support_message(
        &self,
        phone: &str,
        text: &str,
    ) -> Result<(), BackendError> {
        let started = Instant::now();
        let result = self.inner.send_chat_support_message(phone, text).await;
        log_outcome("send_chat_support_message", Some(phone), started, &result);
        result
    }

    async fn end_chat_support(
        &self,
        phone: &str,
        farewell: Option<&str>,
    ) -> Result<(), BackendError> {
        let started = Instant::now();
        let result = self.inner.end_chat_support(phone, farewell).await;
        log_outcome("end_chat_support", Some(phone), started, &result);
        result
    }
}
