//! Providers command - Show backend status.

use std::path::Path;

use anyhow::Result;
use clap::Args;

#[derive(Args)]
pub struct ProvidersArgs {
    /// Print JSON instead of a table
    #[arg(long)]
    json: bool,
}

pub fn execute(args: ProvidersArgs, config_path: Option<&Path>) -> Result<()> {
    let config = super::load_config(config_path)?;
    let statuses = config.backends.statuses(config.active_backend);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&statuses)?);
        return Ok(());
    }

    println!(
        "{:<2} {:<11} {:<8} {:<28} URL",
        "", "PROVIDER", "API KEY", "DEFAULT MODEL"
    );
    for status in &statuses {
        println!(
            "{:<2} {:<11} {:<8} {:<28} {}",
            if status.is_active { "*" } else { "" },
            status.name,
            if status.has_api_key { "yes" } else { "no" },
            status.default_model,
            status.api_url
        );
    }

    if config.is_fallback_mode() {
        println!();
        println!(
            "{} has no API key; evaluations will use fallback responses.",
            config.active_backend.display_name()
        );
    }
    Ok(())
}
