//! Chat-support console
//!
//! Lets a human operator watch chatbot conversations, take one over from
//! the bot, reply as the operator and hand it back.

mod backend;
mod config;
mod console;
mod runtime;
mod state_machine;

use backend::{AdminToken, HttpBackend};
use config::ConsoleConfig;
use console::Command;
use runtime::{ConsoleEvent, ConsoleHandle, LoggingBackend};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr; stdout belongs to the console
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chat_support_console=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let config = ConsoleConfig::from_env()?;
    tracing::info!(
        api_url = %config.api_url,
        authenticated = config.admin_token.is_some(),
        "Connecting to chatbot backend"
    );

    let http = HttpBackend::new(
        &config.api_url,
        config.admin_token.clone().map(AdminToken::new),
        config.request_timeout,
    )?;
    let backend = Arc::new(LoggingBackend::new(Arc::new(http)));
    let (handle, task) = runtime::spawn(backend, config.poll_intervals());

    tokio::spawn(render_views(handle.clone()));
    tokio::spawn(print_console_events(handle.clone()));

    println!("{}", console::HELP);
    read_commands(&handle).await?;

    handle.shutdown();
    task.await?;
    tracing::info!("Console closed");
    Ok(())
}

async fn read_commands(handle: &ConsoleHandle) -> Result<(), Box<dyn std::error::Error>> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let Some(command) = Command::parse(&line) else {
            continue;
        };
        if command == Command::Quit {
            break;
        }
        for event in command.into_events() {
            handle.send(event).await?;
        }
    }
    Ok(())
}

/// Redraw whenever the rendered view changes; polls that only advance
/// sequence numbers render the same text
async fn render_views(handle: ConsoleHandle) {
    let mut view = handle.view();
    let mut shown = String::new();
    while view.changed().await.is_ok() {
        let text = console::render(&view.borrow_and_update());
        if text != shown {
            println!("\n{text}");
            shown = text;
        }
    }
}

async fn print_console_events(handle: ConsoleHandle) {
    let mut events = handle.subscribe();
    loop {
        match events.recv().await {
            Ok(ConsoleEvent::Rejected { message }) => println!("! {message}"),
            Ok(ConsoleEvent::Notice(notice)) => println!("* {}", notice.message()),
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Console fell behind on notices");
            }
            Err(RecvError::Closed) => break,
        }
    }
}
