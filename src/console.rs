//! Line-oriented operator console
//!
//! Parses operator commands into runtime events and renders the published
//! view as plain text.

use crate::state_machine::{ConsoleState, Event, SessionState};
use crate::state_machine::state::{SessionChange, ViewMode};
use std::fmt::Write;

/// One line of operator input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    List,
    Open(String),
    Back,
    Start(Option<String>),
    Say(String),
    End { confirmed: bool, farewell: Option<String> },
    Quit,
}

impl Command {
    /// Parse a line; blank lines yield nothing. Anything that is not a
    /// command is sent as a message.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };
        let rest_opt = || (!rest.is_empty()).then(|| rest.to_string());

        let command = match word {
            "list" if rest.is_empty() => Command::List,
            "back" if rest.is_empty() => Command::Back,
            "quit" | "exit" if rest.is_empty() => Command::Quit,
            "open" if !rest.is_empty() => Command::Open(rest.to_string()),
            "start" => Command::Start(rest_opt()),
            // Nothing to send; keep whatever draft is there
            "say" if rest.is_empty() => return None,
            "say" => Command::Say(rest.to_string()),
            "end" => match rest.split_once(char::is_whitespace) {
                Some(("confirm", farewell)) => Command::End {
                    confirmed: true,
                    farewell: Some(farewell.trim().to_string()),
                },
                None if rest == "confirm" => Command::End {
                    confirmed: true,
                    farewell: None,
                },
                _ => Command::End {
                    confirmed: false,
                    farewell: rest_opt(),
                },
            },
            _ => Command::Say(line.to_string()),
        };
        Some(command)
    }

    /// Events for this command, in order. `Quit` has none.
    pub fn into_events(self) -> Vec<Event> {
        match self {
            Command::List | Command::Back => vec![Event::Back],
            Command::Open(phone) => vec![Event::Select { phone }],
            Command::Start(greeting) => vec![Event::StartRequested { greeting }],
            Command::Say(text) => vec![Event::InputChanged { text }, Event::SendRequested],
            Command::End {
                confirmed,
                farewell,
            } => vec![Event::EndRequested {
                confirmed,
                farewell,
            }],
            Command::Quit => vec![],
        }
    }
}

pub const HELP: &str = "commands: list | open <phone> | back | start [greeting] | \
say <text> | end | end confirm [farewell] | quit";

/// Render the view for a terminal
pub fn render(state: &ConsoleState) -> String {
    let mut out = String::new();
    match state.view {
        ViewMode::List => render_directory(state, &mut out),
        ViewMode::Detail => render_conversation(state, &mut out),
    }
    out
}

fn render_directory(state: &ConsoleState, out: &mut String) {
    let _ = writeln!(out, "== Conversations ==");
    if let Some(failure) = &state.banners.directory {
        let _ = writeln!(
            out,
            "! Could not refresh conversations ({} in a row): {}",
            failure.consecutive, failure.message
        );
    }
    if !state.directory_loaded {
        let _ = writeln!(out, "  loading...");
        return;
    }
    if state.conversations.is_empty() {
        let _ = writeln!(out, "  no conversations yet");
        return;
    }
    let selected = state.selected_phone();
    for conv in &state.conversations {
        let marker = if selected == Some(conv.phone_number.as_str()) { '>' } else { ' ' };
        let support = if conv.is_chat_support { " [operator]" } else { "" };
        let _ = writeln!(
            out,
            "{marker} {} ({}){support} {}",
            conv.display_name(),
            conv.phone_number,
            preview(&conv.last_message)
        );
    }
}

fn render_conversation(state: &ConsoleState, out: &mut String) {
    let Some(selection) = &state.selection else {
        let _ = writeln!(out, "No conversation is open");
        return;
    };
    let name = state
        .selected_conversation()
        .map_or(selection.phone.as_str(), |c| c.display_name());
    let session = match (state.session_change, state.session) {
        (Some(SessionChange::Starting), _) => "starting...",
        (Some(SessionChange::Ending), _) => "ending...",
        (None, SessionState::Active) => "chat support active",
        (None, SessionState::Inactive) => "bot is answering",
    };
    let _ = writeln!(out, "== {name} ({}) : {session} ==", selection.phone);

    if let Some(banner) = &state.banners.session {
        let _ = writeln!(out, "! {banner}");
    }
    if let Some(failure) = &state.banners.log {
        let _ = writeln!(
            out,
            "! Could not refresh messages ({} in a row): {}",
            failure.consecutive, failure.message
        );
    }

    for msg in &state.messages {
        let time = msg
            .timestamp
            .map(|t| t.format("%H:%M").to_string())
            .unwrap_or_default();
        let kind = if msg.is_structured() {
            format!(" [{}]", msg.message_type)
        } else {
            String::new()
        };
        let _ = writeln!(out, "{time:>5} {:>8}{kind}: {}", msg.sender.label(), msg.text);
    }

    if let Some(text) = &state.outbound {
        let _ = writeln!(out, "  sending: {text}");
    }
    if let Some(banner) = &state.banners.send {
        let _ = writeln!(out, "! {banner}");
    }
    if !state.input.is_empty() {
        let _ = writeln!(out, "  draft: {}", state.input);
    }
}

fn preview(text: &str) -> String {
    const MAX: usize = 40;
    let line = text.lines().next().unwrap_or_default();
    if line.chars().count() > MAX {
        let cut: String = line.chars().take(MAX).collect();
        format!("{cut}...")
    } else {
        line.to_string()
    }
}
