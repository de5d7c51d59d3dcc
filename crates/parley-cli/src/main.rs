//! Parley CLI: entry point.
//!
//! # Commands
//!
//! - `parley chat [-m MESSAGE] [-c CHAT]`: send one message or open the REPL
//! - `parley status`: configuration, provider and backend status
//! - `parley models [--provider P]`: model catalog and live listing
//! - `parley chats ...`: list, show, search, rename, delete chats
//! - `parley upgrade`: switch the subscription to plus
//! - `parley login --email E`: sign in to the hosted backend

mod chats_cmd;
mod helpers;
mod login;
mod models;
mod repl;
mod status;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use parley_agent::{Assistant, Conversation};
use parley_core::config::{load_config, Config};
use parley_core::CancellationToken;
use parley_store::ChatStore;

// ─────────────────────────────────────────────
// CLI definition
// ─────────────────────────────────────────────

/// Parley: chat with Azure OpenAI, OpenAI or Gemini from the terminal
#[derive(Parser)]
#[command(name = "parley", version, about, long_about = None)]
struct Cli {
    /// Config file to use instead of ~/.parley/config.json
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the assistant (single-shot or interactive REPL)
    Chat {
        /// Single message (non-interactive). Omit for REPL mode.
        #[arg(short, long)]
        message: Option<String>,

        /// Continue an existing chat instead of starting a new one
        #[arg(short, long)]
        chat: Option<String>,

        /// Model to use; switches provider when another one lists it
        #[arg(long)]
        model: Option<String>,

        /// Wait for the full reply instead of streaming it
        #[arg(long, default_value_t = false)]
        no_stream: bool,

        /// Enable debug logging
        #[arg(long, default_value_t = false)]
        logs: bool,
    },

    /// Show configuration, provider and backend status
    Status,

    /// List models for a provider
    Models {
        /// Provider name (azure, openai, gemini). Defaults to the configured one.
        #[arg(short, long)]
        provider: Option<String>,
    },

    /// Manage saved chats
    Chats {
        #[command(subcommand)]
        action: chats_cmd::ChatsCommands,
    },

    /// Upgrade the subscription to the plus plan
    Upgrade,

    /// Sign in to the hosted backend and remember the session
    Login {
        #[arg(short, long)]
        email: String,

        /// Password; prompted for when omitted
        #[arg(long)]
        password: Option<String>,
    },
}

// ─────────────────────────────────────────────
// Entrypoint
// ─────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.as_deref().map(helpers::expand_tilde);
    let config_path = config_path.as_deref();

    match cli.command {
        Commands::Chat {
            message,
            chat,
            model,
            no_stream,
            logs,
        } => {
            init_logging(logs);
            let config = load_config(config_path);
            run_chat(&config, message, chat, model, !no_stream).await
        }
        Commands::Status => {
            init_logging(false);
            status::run(config_path).await
        }
        Commands::Models { provider } => {
            init_logging(false);
            models::run(&load_config(config_path), provider.as_deref()).await
        }
        Commands::Chats { action } => {
            init_logging(false);
            chats_cmd::dispatch(&load_config(config_path), action).await
        }
        Commands::Upgrade => {
            init_logging(false);
            chats_cmd::upgrade(&load_config(config_path)).await
        }
        Commands::Login { email, password } => {
            init_logging(false);
            login::run(config_path, &email, password).await
        }
    }
}

// ─────────────────────────────────────────────
// Chat command
// ─────────────────────────────────────────────

async fn run_chat(
    config: &Config,
    message: Option<String>,
    chat_id: Option<String>,
    model: Option<String>,
    streaming: bool,
) -> Result<()> {
    let conversation = build_conversation(config, model.as_deref(), streaming);

    match message {
        Some(msg) => {
            // Single-shot mode
            info!(chat = ?chat_id, "processing single message");
            if let Err(e) = helpers::send_turn(&conversation, chat_id.as_deref(), &msg).await {
                if e.is_limit_exceeded() {
                    helpers::report_error(&e);
                }
                return Err(e).context("chat failed");
            }
        }
        None => {
            repl::run(conversation, chat_id).await?;
        }
    }

    Ok(())
}

/// Build a `Conversation` from the loaded configuration.
pub fn build_conversation(config: &Config, model: Option<&str>, streaming: bool) -> Conversation {
    let mut assistant = Assistant::from_config(config);
    if let Some(model) = model {
        assistant.set_model(config, model);
    }
    let store = ChatStore::from_config(&config.backend);

    Conversation::new(Arc::new(store), Arc::new(assistant)).with_streaming(streaming)
}

/// Cancel `token` when Ctrl-C arrives. Abort the returned handle once the
/// generation is over.
pub fn cancel_on_ctrl_c(token: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    })
}

/// Initialize tracing/logging.
fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("parley=debug,info")
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
