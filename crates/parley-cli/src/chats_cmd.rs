//! `parley chats` and `parley upgrade`: manage saved chats and the plan.

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;

use parley_core::config::Config;
use parley_core::types::{Author, Chat};
use parley_store::ChatStore;

#[derive(Subcommand)]
pub enum ChatsCommands {
    /// List chats, most recent first
    List,

    /// Show a chat with its messages
    Show {
        /// Chat ID
        id: String,
    },

    /// Find chats whose title contains the query
    Search {
        query: String,
    },

    /// Rename a chat
    Rename {
        /// Chat ID
        id: String,
        /// New title
        title: String,
    },

    /// Delete a chat and its messages
    Delete {
        /// Chat ID
        id: String,
    },
}

pub async fn dispatch(config: &Config, action: ChatsCommands) -> Result<()> {
    let store = ChatStore::from_config(&config.backend);
    if store.active_backend().await == "mirror" {
        eprintln!(
            "{}",
            "(no backend reachable: showing the in-memory store, which is empty between runs)"
                .dimmed()
        );
    }

    match action {
        ChatsCommands::List => print_chats(&store.list_chats().await?),
        ChatsCommands::Search { query } => print_chats(&store.search_chats(&query).await?),
        ChatsCommands::Show { id } => print_chat(&store.get_chat(&id).await?),
        ChatsCommands::Rename { id, title } => {
            let chat = store.rename_chat(&id, &title).await?;
            println!("✓ Renamed {} to \"{}\"", chat.id, chat.title);
        }
        ChatsCommands::Delete { id } => {
            store.delete_chat(&id).await?;
            println!("✓ Deleted {id}");
        }
    }
    Ok(())
}

/// Switch the subscription to plus.
pub async fn upgrade(config: &Config) -> Result<()> {
    let store = ChatStore::from_config(&config.backend);
    let sub = store.upgrade().await?;
    println!(
        "{} You're on the {} plan: unlimited chats.",
        "✓".green(),
        sub.plan.as_str().bold()
    );
    Ok(())
}

fn print_chats(chats: &[Chat]) {
    if chats.is_empty() {
        println!("No chats.");
        return;
    }

    println!(
        "{:<38} {:<50} {}",
        "ID".bold(),
        "Title".bold(),
        "Updated".bold()
    );
    for chat in chats {
        println!(
            "{:<38} {:<50} {}",
            chat.id,
            chat.title,
            chat.updated_at.format("%Y-%m-%d %H:%M").to_string().dimmed()
        );
    }
}

fn print_chat(chat: &Chat) {
    println!();
    println!("{}", chat.title.cyan().bold());
    println!(
        "{}",
        format!("{} · created {}", chat.id, chat.created_at.format("%Y-%m-%d %H:%M")).dimmed()
    );
    for message in &chat.messages {
        let who = match message.role {
            Author::User => "You".green().bold(),
            Author::Assistant => "Parley".cyan().bold(),
        };
        println!();
        println!("{who}");
        println!("{}", message.content);
    }
    println!();
}
