//! Gradeflow CLI - Main entry point.
//!
//! Exit codes:
//! - 0: Success
//! - 1: General error
//! - 2: Invalid arguments
//! - 3: Configuration error
//! - 4: Upstream failure

use std::process::ExitCode;

use clap::Parser;
use gflow_core::CoreError;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;

use commands::evaluate::EvaluationFailed;
use commands::{Cli, Commands};

/// CI-friendly exit codes
pub struct ExitCodes;

impl ExitCodes {
    pub const SUCCESS: u8 = 0;
    pub const GENERAL_ERROR: u8 = 1;
    pub const INVALID_ARGS: u8 = 2;
    pub const CONFIG_ERROR: u8 = 3;
    pub const UPSTREAM_ERROR: u8 = 4;
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(&cli);

    let result = match cli.command {
        Commands::Serve(args) => commands::serve::execute(args, cli.config.as_deref()).await,
        Commands::Evaluate(args) => commands::evaluate::execute(args, cli.config.as_deref()).await,
        Commands::Providers(args) => commands::providers::execute(args, cli.config.as_deref()),
        Commands::Stages(args) => commands::stages::execute(args, cli.config.as_deref()),
    };

    match result {
        Ok(()) => ExitCode::from(ExitCodes::SUCCESS),
        Err(e) => {
            let exit_code = categorize_error(&e);
            eprintln!("Error: {:#}", e);
            ExitCode::from(exit_code)
        }
    }
}

/// Logs go to stderr so `evaluate` output stays clean on stdout.
fn init_logging(cli: &Cli) {
    let default_filter = if cli.verbose {
        "gflow=debug,info"
    } else if cli.quiet {
        "warn"
    } else {
        "gflow=info,warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let json = cli.log_json.then(|| fmt::layer().json().with_writer(std::io::stderr));
    let text = (!cli.log_json).then(|| {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
    });

    if tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(text)
        .try_init()
        .is_err()
    {
        // Logging already initialized, continue
    }
}

/// Categorize error to determine exit code
fn categorize_error(e: &anyhow::Error) -> u8 {
    if e.downcast_ref::<EvaluationFailed>().is_some() {
        return ExitCodes::UPSTREAM_ERROR;
    }
    match e.downcast_ref::<CoreError>() {
        Some(CoreError::UnknownBackend(_)) => return ExitCodes::INVALID_ARGS,
        Some(CoreError::Extraction(_)) => return ExitCodes::GENERAL_ERROR,
        Some(_) => return ExitCodes::CONFIG_ERROR,
        None => {}
    }

    let msg = e.to_string().to_lowercase();
    if msg.contains("configuration") || msg.contains("stage catalog") {
        ExitCodes::CONFIG_ERROR
    } else if msg.contains("argument") || msg.contains("not found") {
        ExitCodes::INVALID_ARGS
    } else {
        ExitCodes::GENERAL_ERROR
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categorize_error() {
        let upstream = anyhow::Error::new(EvaluationFailed("OPENAI API error 500".into()));
        assert_eq!(categorize_error(&upstream), ExitCodes::UPSTREAM_ERROR);

        let unknown = anyhow::Error::new(CoreError::UnknownBackend("claude".into()));
        assert_eq!(categorize_error(&unknown), ExitCodes::INVALID_ARGS);

        let config = anyhow::Error::new(CoreError::Config("PORT has an invalid value".into()));
        assert_eq!(categorize_error(&config), ExitCodes::CONFIG_ERROR);

        let wrapped = anyhow::Error::new(CoreError::Config("bad".into())).context("Failed to load configuration");
        assert_eq!(categorize_error(&wrapped), ExitCodes::CONFIG_ERROR);

        assert_eq!(categorize_error(&anyhow::anyhow!("boom")), ExitCodes::GENERAL_ERROR);
    }
}
