//! Mock implementations for testing
//!
//! These mocks enable integration testing of the runtime without real I/O.

use super::traits::ChatBackend;
use crate::backend::{BackendError, ContactType, Conversation, Message, SenderRole};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

// ============================================================================
// Fixtures
// ============================================================================

pub fn conversation(phone: &str, is_chat_support: bool) -> Conversation {
    Conversation {
        phone_number: phone.to_string(),
        name: None,
        last_message: String::new(),
        last_message_time: None,
        message_count: 0,
        is_active: true,
        is_chat_support,
        contact_type: ContactType::Student,
    }
}

pub fn message(id: &str, phone: &str, sender: SenderRole, text: &str) -> Message {
    Message {
        id: id.to_string(),
        phone_number: phone.to_string(),
        text: text.to_string(),
        timestamp: None,
        sender,
        message_type: "text".to_string(),
    }
}

// ============================================================================
// Mock Backend
// ============================================================================

/// Backend operation, for call recording and failure injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    ListConversations,
    ListMessages,
    Start,
    Send,
    End,
}

/// A recorded backend call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ListConversations,
    ListMessages { phone: String },
    Start { phone: String, greeting: Option<String> },
    Send { phone: String, text: String },
    End { phone: String, farewell: Option<String> },
}

/// In-memory backend that behaves like the real one: starting and ending
/// flip the directory flag, sends are appended to the log as operator
/// messages before the call returns.
pub struct MockBackend {
    conversations: Mutex<Vec<Conversation>>,
    messages: Mutex<HashMap<String, Vec<Message>>>,
    failures: Mutex<HashMap<Op, VecDeque<BackendError>>>,
    log_delays: Mutex<HashMap<String, Duration>>,
    directory_delay: Mutex<Option<Duration>>,
    calls: Mutex<Vec<Call>>,
    next_id: Mutex<u64>,
}

impl MockBackend {
    pub fn new(conversations: Vec<Conversation>) -> Self {
        Self {
            conversations: Mutex::new(conversations),
            messages: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
            log_delays: Mutex::new(HashMap::new()),
            directory_delay: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
            next_id: Mutex::new(1000),
        }
    }

    pub fn with_messages(self, phone: &str, messages: Vec<Message>) -> Self {
        self.messages
            .lock()
            .unwrap()
            .insert(phone.to_string(), messages);
        self
    }

    /// Delay every log fetch for `phone`
    pub fn with_log_delay(self, phone: &str, delay: Duration) -> Self {
        self.log_delays
            .lock()
            .unwrap()
            .insert(phone.to_string(), delay);
        self
    }

    /// From now on, directory responses arrive `delay` after their snapshot
    /// was taken
    pub fn set_directory_delay(&self, delay: Duration) {
        *self.directory_delay.lock().unwrap() = Some(delay);
    }

    /// Make the next call of `op` fail with `error`
    pub fn queue_failure(&self, op: Op, error: BackendError) {
        self.failures
            .lock()
            .unwrap()
            .entry(op)
            .or_default()
            .push_back(error);
    }

    /// Change a conversation's flag behind the console's back
    pub fn set_chat_support(&self, phone: &str, is_chat_support: bool) {
        for conv in self.conversations.lock().unwrap().iter_mut() {
            if conv.phone_number == phone {
                conv.is_chat_support = is_chat_support;
            }
        }
    }

    pub fn recorded_calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, matches: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| matches(c)).count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn take_failure(&self, op: Op) -> Result<(), BackendError> {
        match self
            .failures
            .lock()
            .unwrap()
            .get_mut(&op)
            .and_then(VecDeque::pop_front)
        {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn append(&self, phone: &str, sender: SenderRole, text: &str) {
        let id = {
            let mut next = self.next_id.lock().unwrap();
            *next += 1;
            next.to_string()
        };
        self.messages
            .lock()
            .unwrap()
            .entry(phone.to_string())
            .or_default()
            .push(message(&id, phone, sender, text));
    }
}

#[async_trait]
impl ChatBackend for MockBackend {
    async fn list_conversations(&self) -> Result<Vec<Conversation>, BackendError> {
        self.record(Call::ListConversations);
        let snapshot = self.conversations.lock().unwrap().clone();
        let delay = *self.directory_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.take_failure(Op::ListConversations)?;
        Ok(snapshot)
    }

    async fn list_messages(&self, phone: &str) -> Result<Vec<Message>, BackendError> {
        self.record(Call::ListMessages {
            phone: phone.to_string(),
        });
        let delay = self.log_delays.lock().unwrap().get(phone).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.take_failure(Op::ListMessages)?;
        Ok(self
            .messages
            .lock()
            .unwrap()
            .get(phone)
            .cloned()
            .unwrap_or_default())
    }

    async fn start_chat_support(
        &self,
        phone: &str,
        greeting: Option<&str>,
    ) -> Result<(), BackendError> {
        self.record(Call::Start {
            phone: phone.to_string(),
            greeting: greeting.map(String::from),
        });
        self.take_failure(Op::Start)?;
        self.set_chat_support(phone, true);
        if let Some(greeting) = greeting {
            self.append(phone, SenderRole::Operator, greeting);
        }
        Ok(())
    }

    async fn send_chat_support_message(
        &self,
        phone: &str,
        text: &str,
    ) -> Result<(), BackendError> {
        self.record(Call::Send {
            phone: phone.to_string(),
            text: text.to_string(),
        });
        self.take_failure(Op::Send)?;
        self.append(phone, SenderRole::Operator, text);
        Ok(())
    }

    async fn end_chat_support(
        &self,
        phone: &str,
        farewell: Option<&str>,
    ) -> Result<(), BackendError> {
        self.record(Call::End {
            phone: phone.to_string(),
            farewell: farewell.map(String::from),
        });
        self.take_failure(Op::End)?;
        if let Some(farewell) = farewell {
            self.append(phone, SenderRole::Operator, farewell);
        }
        self.set_chat_support(phone, false);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendErrorKind;
    use crate::runtime::{spawn, ConsoleEvent, ConsoleHandle, PollIntervals};
    use crate::state_machine::{ConsoleState, Event, Notice, SessionState};
    use std::sync::Arc;
    use tokio::sync::broadcast;

    const WAIT: Duration = Duration::from_secs(3);

    /// Directory polls every 50ms; the log loop only ticks once on open,
    /// so any further log fetch is a one-shot refetch.
    fn slow_log() -> PollIntervals {
        PollIntervals {
            directory: Duration::from_millis(50),
            log: Duration::from_secs(60),
        }
    }

    fn fast() -> PollIntervals {
        PollIntervals {
            directory: Duration::from_millis(40),
            log: Duration::from_millis(20),
        }
    }

    async fn wait_for_view(
        handle: &ConsoleHandle,
        predicate: impl FnMut(&ConsoleState) -> bool,
    ) -> ConsoleState {
        let mut view = handle.view();
        let state = tokio::time::timeout(WAIT, view.wait_for(predicate))
            .await
            .expect("timed out waiting for view")
            .expect("runtime stopped");
        state.clone()
    }

    async fn wait_for_calls(mock: &MockBackend, matches: impl Fn(&Call) -> bool, at_least: usize) {
        tokio::time::timeout(WAIT, async {
            while mock.count(&matches) < at_least {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("timed out waiting for backend calls");
    }

    async fn next_console_event(rx: &mut broadcast::Receiver<ConsoleEvent>) -> ConsoleEvent {
        tokio::time::timeout(WAIT, rx.recv())
            .await
            .expect("timed out waiting for console event")
            .expect("broadcast closed")
    }

    fn is_log_fetch(phone: &'static str) -> impl Fn(&Call) -> bool {
        move |call| matches!(call, Call::ListMessages { phone: p } if p == phone)
    }

    async fn active_console(mock: Arc<MockBackend>) -> ConsoleHandle {
        let (handle, _task) = spawn(mock, slow_log());
        wait_for_view(&handle, |s| s.session == SessionState::Active).await;
        handle
    }

    #[tokio::test]
    async fn test_mock_backend_records_and_fails() {
        let mock = MockBackend::new(vec![conversation("+1555", false)]);
        mock.queue_failure(Op::Send, BackendError::network("down"));

        let err = mock.send_chat_support_message("+1555", "hi").await.unwrap_err();
        assert_eq!(err.kind, BackendErrorKind::Network);
        mock.send_chat_support_message("+1555", "hi").await.unwrap();

        let log = mock.list_messages("+1555").await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].sender, SenderRole::Operator);
        assert_eq!(mock.count(|c| matches!(c, Call::Send { .. })), 2);
    }

    /// Mount: directory loads, first entry opens, its log is fetched
    #[tokio::test]
    async fn test_mount_opens_first_conversation() {
        let mock = Arc::new(
            MockBackend::new(vec![conversation("+1555", false), conversation("+1777", true)])
                .with_messages("+1555", vec![message("1", "+1555", SenderRole::User, "hola")]),
        );
        let (handle, _task) = spawn(mock.clone(), slow_log());

        let state = wait_for_view(&handle, |s| !s.messages.is_empty()).await;
        assert_eq!(state.selected_phone(), Some("+1555"));
        assert_eq!(state.session, SessionState::Inactive);
        assert_eq!(state.messages[0].text, "hola");
        assert_eq!(state.conversations.len(), 2);

        handle.shutdown();
    }

    /// Scenario A: start succeeds, log is refetched without waiting for a tick
    #[tokio::test]
    async fn test_start_refetches_log_immediately() {
        let mock = Arc::new(MockBackend::new(vec![conversation("+1555", false)]));
        let (handle, _task) = spawn(mock.clone(), slow_log());
        wait_for_view(&handle, |s| s.selected_phone() == Some("+1555")).await;
        wait_for_calls(&mock, is_log_fetch("+1555"), 1).await;

        handle
            .send(Event::StartRequested {
                greeting: Some("Hi, an operator is here".to_string()),
            })
            .await
            .unwrap();

        let state = wait_for_view(&handle, |s| {
            s.session == SessionState::Active && !s.messages.is_empty()
        })
        .await;
        assert_eq!(state.messages[0].sender, SenderRole::Operator);
        assert_eq!(state.messages[0].text, "Hi, an operator is here");

        let calls = mock.recorded_calls();
        let start_at = calls
            .iter()
            .position(|c| matches!(c, Call::Start { .. }))
            .unwrap();
        assert!(calls[start_at..].iter().any(is_log_fetch("+1555")));
        assert!(calls[start_at..]
            .iter()
            .any(|c| matches!(c, Call::ListConversations)));

        handle.shutdown();
    }

    /// Scenario B: a successful send shows up in the log after reconciliation
    #[tokio::test]
    async fn test_send_appears_in_log() {
        let mock = Arc::new(MockBackend::new(vec![conversation("+1555", true)]));
        let handle = active_console(mock.clone()).await;

        handle.send_text("Hello").await.unwrap();

        let state = wait_for_view(&handle, |s| {
            s.messages
                .iter()
                .any(|m| m.sender == SenderRole::Operator && m.text == "Hello")
        })
        .await;
        assert!(state.input.is_empty());
        assert!(state.outbound.is_none() || state.outbound.as_deref() == Some("Hello"));
        assert_eq!(
            mock.count(|c| matches!(c, Call::Send { text, .. } if text == "Hello")),
            1
        );

        handle.shutdown();
    }

    /// Scenario C: a failed send leaves the text in the input box
    #[tokio::test]
    async fn test_failed_send_preserves_input() {
        let mock = Arc::new(MockBackend::new(vec![conversation("+1555", true)]));
        mock.queue_failure(Op::Send, BackendError::network("connection reset"));
        let handle = active_console(mock.clone()).await;

        handle.send_text("Hello").await.unwrap();

        let state = wait_for_view(&handle, |s| s.banners.send.is_some()).await;
        assert_eq!(state.input, "Hello");
        assert!(state.outbound.is_none());
        assert_eq!(state.session, SessionState::Active);
        assert!(state.banners.send.unwrap().contains("connection reset"));

        handle.shutdown();
    }

    /// Scenario D: a delayed log response for the previous selection is dropped
    #[tokio::test]
    async fn test_switching_conversation_drops_stale_log() {
        let mock = Arc::new(
            MockBackend::new(vec![conversation("+1555", false), conversation("+1777", false)])
                .with_messages("+1555", vec![message("1", "+1555", SenderRole::User, "from 1555")])
                .with_messages("+1777", vec![message("7", "+1777", SenderRole::User, "from 1777")])
                .with_log_delay("+1555", Duration::from_millis(150)),
        );
        let (handle, _task) = spawn(mock.clone(), fast());

        wait_for_calls(&mock, is_log_fetch("+1555"), 1).await;
        handle
            .send(Event::Select {
                phone: "+1777".to_string(),
            })
            .await
            .unwrap();

        let state = wait_for_view(&handle, |s| !s.messages.is_empty()).await;
        assert_eq!(state.selected_phone(), Some("+1777"));
        assert_eq!(state.messages[0].text, "from 1777");

        // Outlive the delayed +1555 response
        tokio::time::sleep(Duration::from_millis(300)).await;
        let state = handle.view().borrow().clone();
        assert_eq!(state.selected_phone(), Some("+1777"));
        assert!(state.messages.iter().all(|m| m.phone_number == "+1777"));

        // The +1555 loop is gone: at most the one fetch that was in flight
        let fetched = mock.count(is_log_fetch("+1555"));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(mock.count(is_log_fetch("+1555")), fetched);

        handle.shutdown();
    }

    /// Out-of-band session change is picked up on the next directory poll
    #[tokio::test]
    async fn test_directory_refresh_overrides_session() {
        let mock = Arc::new(MockBackend::new(vec![conversation("+1555", true)]));
        let handle = active_console(mock.clone()).await;
        let mut events = handle.subscribe();

        mock.set_chat_support("+1555", false);

        let state = wait_for_view(&handle, |s| s.session == SessionState::Inactive).await;
        assert_eq!(state.selected_phone(), Some("+1555"));
        assert_eq!(
            next_console_event(&mut events).await,
            ConsoleEvent::Notice(Notice::SessionChangedElsewhere {
                phone: "+1555".to_string(),
                session: SessionState::Inactive
            })
        );

        handle.shutdown();
    }

    /// A directory snapshot taken before our own start lands after it: the
    /// session stays active and nobody is told it changed elsewhere
    #[tokio::test]
    async fn test_directory_snapshot_from_before_start_is_dropped() {
        let mock = Arc::new(MockBackend::new(vec![conversation("+1555", false)]));
        let (handle, _task) = spawn(mock.clone(), slow_log());
        wait_for_view(&handle, |s| s.selected_phone() == Some("+1555")).await;
        let mut events = handle.subscribe();

        mock.set_directory_delay(Duration::from_millis(300));
        let polled = mock.count(|c| matches!(c, Call::ListConversations));
        wait_for_calls(&mock, |c| matches!(c, Call::ListConversations), polled + 1).await;

        // The slow poll holds an inactive snapshot while the start goes through
        handle
            .send(Event::StartRequested { greeting: None })
            .await
            .unwrap();
        wait_for_view(&handle, |s| s.session == SessionState::Active).await;

        tokio::time::sleep(Duration::from_millis(800)).await;
        let state = handle.view().borrow().clone();
        assert_eq!(state.session, SessionState::Active);
        assert!(state.conversations[0].is_chat_support);

        while let Ok(event) = events.try_recv() {
            assert!(
                !matches!(
                    event,
                    ConsoleEvent::Notice(Notice::SessionChangedElsewhere { .. })
                ),
                "unexpected notice: {event:?}"
            );
        }

        handle.shutdown();
    }

    /// Sending without a session is refused locally
    #[tokio::test]
    async fn test_send_while_inactive_makes_no_call() {
        let mock = Arc::new(MockBackend::new(vec![conversation("+1555", false)]));
        let (handle, _task) = spawn(mock.clone(), slow_log());
        wait_for_view(&handle, |s| s.selected_phone() == Some("+1555")).await;
        let mut events = handle.subscribe();

        handle.send_text("Hello").await.unwrap();

        assert!(matches!(
            next_console_event(&mut events).await,
            ConsoleEvent::Rejected { .. }
        ));
        assert_eq!(mock.count(|c| matches!(c, Call::Send { .. })), 0);
        assert_eq!(handle.view().borrow().input, "Hello");

        handle.shutdown();
    }

    /// Ending needs confirmation; a confirmed end clears the draft
    #[tokio::test]
    async fn test_end_requires_confirmation() {
        let mock = Arc::new(MockBackend::new(vec![conversation("+1555", true)]));
        let handle = active_console(mock.clone()).await;
        let mut events = handle.subscribe();

        handle
            .send(Event::InputChanged {
                text: "unsent draft".to_string(),
            })
            .await
            .unwrap();
        handle
            .send(Event::EndRequested {
                confirmed: false,
                farewell: None,
            })
            .await
            .unwrap();
        assert!(matches!(
            next_console_event(&mut events).await,
            ConsoleEvent::Rejected { .. }
        ));
        assert_eq!(mock.count(|c| matches!(c, Call::End { .. })), 0);

        handle
            .send(Event::EndRequested {
                confirmed: true,
                farewell: Some("Thanks, the bot will take it from here".to_string()),
            })
            .await
            .unwrap();

        let state = wait_for_view(&handle, |s| {
            s.session == SessionState::Inactive && s.session_change.is_none()
        })
        .await;
        assert!(state.input.is_empty());
        assert_eq!(mock.count(|c| matches!(c, Call::End { .. })), 1);

        handle.shutdown();
    }

    /// A failing start keeps the session inactive and says why
    #[tokio::test]
    async fn test_failed_start_surfaces_error() {
        let mock = Arc::new(MockBackend::new(vec![conversation("+1555", false)]));
        mock.queue_failure(Op::Start, BackendError::rejected("bot engine unavailable"));
        let (handle, _task) = spawn(mock.clone(), slow_log());
        wait_for_view(&handle, |s| s.selected_phone() == Some("+1555")).await;

        handle
            .send(Event::StartRequested { greeting: None })
            .await
            .unwrap();

        let state = wait_for_view(&handle, |s| s.banners.session.is_some()).await;
        assert_eq!(state.session, SessionState::Inactive);
        assert!(state.session_change.is_none());
        assert_eq!(mock.count(|c| matches!(c, Call::Start { .. })), 1);

        handle.shutdown();
    }

    /// Directory failures keep the last list and count up
    #[tokio::test]
    async fn test_directory_failures_keep_list() {
        let mock = Arc::new(MockBackend::new(vec![conversation("+1555", false)]));
        let (handle, _task) = spawn(mock.clone(), slow_log());
        wait_for_view(&handle, |s| s.directory_loaded).await;

        mock.queue_failure(Op::ListConversations, BackendError::timed_out("timed out"));
        mock.queue_failure(Op::ListConversations, BackendError::timed_out("timed out"));

        let state = wait_for_view(&handle, |s| {
            s.banners
                .directory
                .as_ref()
                .is_some_and(|f| f.consecutive == 2)
        })
        .await;
        assert_eq!(state.conversations.len(), 1);

        let state = wait_for_view(&handle, |s| s.banners.directory.is_none()).await;
        assert_eq!(state.conversations.len(), 1);

        handle.shutdown();
    }

    /// Unmount stops all polling
    #[tokio::test]
    async fn test_shutdown_stops_polling() {
        let mock = Arc::new(MockBackend::new(vec![conversation("+1555", false)]));
        let (handle, task) = spawn(mock.clone(), fast());
        wait_for_calls(&mock, is_log_fetch("+1555"), 2).await;

        handle.shutdown();
        tokio::time::timeout(WAIT, task).await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let calls = mock.recorded_calls().len();
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(mock.recorded_calls().len(), calls);
    }
}
