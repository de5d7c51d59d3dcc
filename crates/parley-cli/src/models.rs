//! `parley models`: catalog models plus whatever the provider reports live.

use anyhow::Result;
use colored::Colorize;

use parley_core::config::Config;
use parley_core::types::ProviderKind;
use parley_providers::create_provider_for;
use parley_providers::registry::spec_for;

pub async fn run(config: &Config, provider: Option<&str>) -> Result<()> {
    let kind = match provider {
        Some(name) => name.parse::<ProviderKind>()?,
        None => config.provider_kind(),
    };
    let spec = spec_for(kind);

    println!();
    println!("{}", format!("{} models", spec.display_name).cyan().bold());
    println!();
    for model in spec.models {
        let marker = if model.id == spec.default_model { "*" } else { " " };
        println!(
            "  {marker} {:<24} {:<22} {}",
            model.id,
            model.name,
            format!("{}k ctx", model.context_window / 1000).dimmed()
        );
    }

    let provider = create_provider_for(config, kind);
    if provider.is_mock() {
        println!();
        println!("{}", "(not configured: live listing skipped)".dimmed());
        println!();
        return Ok(());
    }

    println!();
    println!("  {}", "Available now:".bold());
    match provider.list_models().await {
        Ok(models) if models.is_empty() => println!("    {}", "(none reported)".dimmed()),
        Ok(models) => {
            for model in models {
                println!("    {}", model.id);
            }
        }
        Err(e) => println!("    {}", format!("listing failed: {e}").red()),
    }
    println!();

    Ok(())
}
