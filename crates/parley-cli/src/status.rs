//! `parley status`: show configuration, provider and backend status.
//!
//! - Config path and selected provider (configured or mock mode)
//! - Credential status for every provider, keys masked
//! - Backend mode, active store and subscription
//! - A live health check against the selected provider

use std::path::{Path, PathBuf};

use anyhow::Result;
use colored::Colorize;

use parley_agent::Assistant;
use parley_core::config::{get_config_path, load_config, Config};
use parley_core::types::ProviderKind;
use parley_core::utils::mask_secret;
use parley_providers::registry::PROVIDERS;
use parley_providers::{resolve_for, ResolvedProvider};
use parley_store::ChatStore;

/// Run the status command.
pub async fn run(config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path);
    let config_path = config_path.map(PathBuf::from).unwrap_or_else(get_config_path);

    println!();
    println!("{}", "Parley Status".cyan().bold());
    println!();

    println!(
        "  {:<18} {} {}",
        "Config:".bold(),
        config_path.display(),
        if config_path.exists() {
            "✓".green().to_string()
        } else {
            "(not found)".red().to_string()
        }
    );

    let assistant = Assistant::from_config(&config);
    let status = assistant.status();
    let mode = if status.mock {
        "mock mode".yellow().to_string()
    } else {
        "configured".green().to_string()
    };
    println!(
        "  {:<18} {} ({})",
        "Provider:".bold(),
        status.display_name,
        mode
    );
    println!("  {:<18} {}", "Model:".bold(), status.model);
    println!(
        "  {:<18} {} | max_tokens: {}",
        "Parameters:".bold(),
        format!("temp: {}", config.ai.temperature).dimmed(),
        format!("{}", config.ai.max_tokens).dimmed(),
    );

    // Providers
    println!();
    println!("  {}", "Providers:".bold());
    for spec in PROVIDERS {
        println!(
            "    {:<20} {}",
            spec.display_name,
            provider_line(&config, spec.kind)
        );
    }

    // Backend
    println!();
    let store = ChatStore::from_config(&config.backend);
    let url = if config.backend.url.is_empty() {
        "(none)".dimmed().to_string()
    } else {
        config.backend.url.clone()
    };
    println!("  {:<18} {}", "Backend:".bold(), url);
    println!(
        "  {:<18} {} (using {})",
        "Store mode:".bold(),
        store.mode(),
        store.active_backend().await
    );
    match store.subscription().await {
        Ok(sub) => println!(
            "  {:<18} {} ({}/{} chats)",
            "Subscription:".bold(),
            sub.plan.as_str(),
            sub.current_count,
            sub.chat_limit
        ),
        Err(e) => println!("  {:<18} {}", "Subscription:".bold(), e.to_string().red()),
    }

    // Health
    println!();
    let health = if assistant.health_check().await {
        "✓ reachable".green().to_string()
    } else {
        "✗ unreachable".red().to_string()
    };
    println!("  {:<18} {}", "Health:".bold(), health);
    println!();

    Ok(())
}

/// Key status text for one provider.
fn provider_line(config: &Config, kind: ProviderKind) -> String {
    match resolve_for(config, kind) {
        ResolvedProvider::Configured(_) => {
            format!("{} ({})", "✓".green(), mask_secret(api_key(config, kind)))
        }
        ResolvedProvider::Unconfigured { missing, .. } => {
            format!("{}", format!("· missing {}", missing.join(", ")).dimmed())
        }
    }
}

fn api_key(config: &Config, kind: ProviderKind) -> &str {
    match kind {
        ProviderKind::Azure => &config.providers.azure.api_key,
        ProviderKind::OpenAi => &config.providers.openai.api_key,
        ProviderKind::Gemini => &config.providers.gemini.api_key,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_line_masks_key() {
        let mut config = Config::default();
        config.providers.openai.api_key = "sk-abcdefgh1234".into();
        let line = provider_line(&config, ProviderKind::OpenAi);
        assert!(line.contains("****1234"));
        assert!(!line.contains("sk-abcdefgh"));
    }

    #[test]
    fn provider_line_lists_missing_fields() {
        let config = Config::default();
        let line = provider_line(&config, ProviderKind::Azure);
        assert!(line.contains("endpoint"));
        assert!(line.contains("apiKey"));
    }
}
