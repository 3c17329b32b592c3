//! CLI command definitions.
//!
//! This module defines the command structure for the Gradeflow CLI.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gflow_core::AppConfig;

pub mod evaluate;
pub mod providers;
pub mod serve;
pub mod stages;

/// Gradeflow - staged, streaming thesis evaluation
#[derive(Parser)]
#[command(name = "gflow")]
#[command(version, about = "Gradeflow - staged, streaming thesis evaluation")]
#[command(long_about = r#"
Gradeflow runs a document through an ordered list of evaluation stages,
streaming each stage's model output as it arrives.

COMMANDS:
  serve       → Run the HTTP surface (POST /ai/evaluate and friends)
  evaluate    → Evaluate a local .txt/.md file and print the stream
  providers   → Show backend credentials and default models
  stages      → List the stage catalog

CONFIGURATION:
  Settings come from builtin defaults, then an optional TOML file (--config),
  then environment variables (OPENAI_API_KEY, ACTIVE_AI_PROVIDER, PORT, ...).

EXIT CODES:
  0 - Success
  1 - General error
  2 - Invalid arguments
  3 - Configuration error
  4 - Upstream failure
"#)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// TOML configuration file
    #[arg(short, long, global = true, env = "GFLOW_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP server
    Serve(serve::ServeArgs),

    /// Evaluate a local document and print the event stream
    Evaluate(evaluate::EvaluateArgs),

    /// Show provider status
    Providers(providers::ProvidersArgs),

    /// List evaluation stages
    Stages(stages::StagesArgs),
}

pub(crate) fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    AppConfig::load(path).context("Failed to load configuration")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_evaluate() {
        let cli = Cli::try_parse_from([
            "gflow", "evaluate", "--file", "thesis.md", "--stage", "analysis", "--stage",
            "results_product", "--provider", "deepseek", "--raw",
        ])
        .unwrap();

        match cli.command {
            Commands::Evaluate(args) => {
                assert_eq!(args.stages, vec!["analysis", "results_product"]);
                assert_eq!(args.provider.as_deref(), Some("deepseek"));
                assert!(args.raw);
            }
            _ => panic!("expected evaluate"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["gflow", "stages", "--verbose", "--log-json"]).unwrap();
        assert!(cli.verbose);
        assert!(cli.log_json);
    }
}
