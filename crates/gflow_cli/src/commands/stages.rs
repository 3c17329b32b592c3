//! Stages command - List the stage catalog.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use gflow_core::StageCatalog;

#[derive(Args)]
pub struct StagesArgs {
    /// Print full descriptors as JSON
    #[arg(long)]
    json: bool,
}

pub fn execute(args: StagesArgs, config_path: Option<&Path>) -> Result<()> {
    let config = super::load_config(config_path)?;
    let catalog = match &config.stages_file {
        Some(path) => StageCatalog::load(path)
            .with_context(|| format!("Failed to load stage catalog {}", path.display()))?,
        None => StageCatalog::builtin(),
    };

    if args.json {
        let stages: Vec<_> = catalog.iter().collect();
        println!("{}", serde_json::to_string_pretty(&stages)?);
        return Ok(());
    }

    for (index, stage) in catalog.iter().enumerate() {
        println!(
            "{:>2}. {:<24} {} (max {} chars)",
            index + 1,
            stage.id,
            stage.title,
            stage.max_document_chars
        );
    }
    Ok(())
}
