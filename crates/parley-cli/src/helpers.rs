//! Shared CLI helpers: path expansion, turn printing, banner, error reports.

use std::io::Write;
use std::path::PathBuf;

use colored::Colorize;

use parley_agent::{Conversation, ConversationError};
use parley_core::CancellationToken;
use parley_store::StoreError;

/// Expand `~` at the start of a path to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs_next::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs_next::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

/// Send one user turn, printing the reply as it arrives.
///
/// Returns the chat id on success so the REPL can keep appending to it.
pub async fn send_turn(
    conversation: &Conversation,
    chat_id: Option<&str>,
    text: &str,
) -> Result<String, ConversationError> {
    let cancel = CancellationToken::new();
    let ctrl_c = crate::cancel_on_ctrl_c(cancel.clone());

    println!();
    print_label(conversation.assistant().is_mock());
    let mut stdout = std::io::stdout();
    let result = conversation
        .send(chat_id, text, cancel, |delta| {
            print!("{delta}");
            let _ = stdout.flush();
        })
        .await;
    ctrl_c.abort();
    println!();

    let outcome = result?;
    if outcome.created_chat {
        println!("{}", format!("(chat {})", outcome.chat_id).dimmed());
    }
    println!();
    Ok(outcome.chat_id)
}

fn print_label(mock: bool) {
    if mock {
        println!("{} {}", "Parley".cyan().bold(), "(mock)".dimmed());
    } else {
        println!("{}", "Parley".cyan().bold());
    }
}

/// Print a failed turn. Quota errors become an upgrade prompt.
pub fn report_error(error: &ConversationError) {
    match error {
        ConversationError::Store(StoreError::LimitExceeded { current, limit }) => {
            eprintln!("{}", upgrade_prompt(*current, *limit).yellow());
        }
        ConversationError::Cancelled { .. } => {
            eprintln!("{}", "(generation stopped)".dimmed());
        }
        other => eprintln!("\n❌ Error: {other}\n"),
    }
}

/// Text shown when the free plan's chat limit is reached.
pub fn upgrade_prompt(current: u32, limit: u32) -> String {
    format!(
        "You've used {current} of {limit} chats on the free plan.\n\
         Run `parley upgrade` to unlock unlimited chats."
    )
}

/// Print the banner shown at REPL start.
pub fn print_banner(provider: &str, model: &str, mock: bool) {
    let version = env!("CARGO_PKG_VERSION");
    println!();
    println!("{}  v{}", "Parley".cyan().bold(), version.dimmed());
    let mode = if mock { " (mock mode)" } else { "" };
    println!("{}", format!("{provider} · {model}{mode}").dimmed());
    println!(
        "{}",
        "Type a message, \"/new\" for a fresh chat, or \"exit\" to quit. Ctrl-C stops a reply."
            .dimmed()
    );
    println!();
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
