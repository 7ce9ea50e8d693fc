//! FinSight CLI - Main entry point.
//!
//! Exit codes:
//! - 0: Success
//! - 1: General error
//! - 2: Invalid arguments / profile not found
//! - 3: Validation failure
//! - 4: Plan compilation failure

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use finsight_plan::PlanError;
use finsight_profile::ProfileError;

mod commands;

use commands::{Cli, Commands};

/// CI-friendly exit codes
pub struct ExitCodes;

impl ExitCodes {
    pub const SUCCESS: u8 = 0;
    pub const GENERAL_ERROR: u8 = 1;
    pub const INVALID_ARGS: u8 = 2;
    pub const VALIDATION_FAILURE: u8 = 3;
    pub const COMPILE_ERROR: u8 = 4;
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.global.verbose {
        "finsight=debug"
    } else if cli.global.quiet {
        "finsight=error"
    } else {
        "finsight=info"
    };
    let mut filter = EnvFilter::from_default_env();
    for directive in [level, "warn"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }
    // Logs go to stderr so `synth` output can be piped
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init();

    let result = match cli.command {
        Commands::Synth(args) => commands::synth::execute(&cli.global, args).await,
        Commands::Validate(args) => commands::validate::execute(&cli.global, args).await,
        Commands::Diff(args) => commands::diff::execute(&cli.global, args).await,
    };

    match result {
        Ok(()) => ExitCode::from(ExitCodes::SUCCESS),
        Err(e) => {
            let exit_code = categorize_error(&e);
            eprintln!("❌ Error: {:#}", e);
            ExitCode::from(exit_code)
        }
    }
}

/// Map the first typed error in the chain to an exit code
fn categorize_error(e: &anyhow::Error) -> u8 {
    for cause in e.chain() {
        if let Some(err) = cause.downcast_ref::<ProfileError>() {
            return match err {
                ProfileError::NotFound { .. } | ProfileError::ConfigDirNotFound(_) => {
                    ExitCodes::INVALID_ARGS
                }
                ProfileError::Io(_) => ExitCodes::GENERAL_ERROR,
                _ => ExitCodes::VALIDATION_FAILURE,
            };
        }
        if let Some(err) = cause.downcast_ref::<PlanError>() {
            return match err {
                PlanError::ConfigValidation(_) | PlanError::Profile(_) => ExitCodes::VALIDATION_FAILURE,
                PlanError::Io(_) => ExitCodes::GENERAL_ERROR,
                _ => ExitCodes::COMPILE_ERROR,
            };
        }
    }
    ExitCodes::GENERAL_ERROR
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_categorize_profile_errors() {
        let missing: anyhow::Result<()> = Err(ProfileError::NotFound {
            environment: "qa".into(),
            dir: "config".into(),
        })
        .context("loading profile 'qa'");
        assert_eq!(categorize_error(&missing.unwrap_err()), ExitCodes::INVALID_ARGS);

        let invalid = anyhow::Error::new(ProfileError::Validation {
            environment: "dev".into(),
            errors: vec!["auth0Domain cannot be empty".into()],
        });
        assert_eq!(categorize_error(&invalid), ExitCodes::VALIDATION_FAILURE);
    }

    #[test]
    fn test_categorize_plan_errors() {
        let cycle = anyhow::Error::new(PlanError::DependencyCycle {
            cycle: vec!["a".into(), "b".into(), "a".into()],
        });
        assert_eq!(categorize_error(&cycle), ExitCodes::COMPILE_ERROR);

        let config = anyhow::Error::new(PlanError::ConfigValidation("no row".into()));
        assert_eq!(categorize_error(&config), ExitCodes::VALIDATION_FAILURE);

        assert_eq!(categorize_error(&anyhow::anyhow!("boom")), ExitCodes::GENERAL_ERROR);
    }
}
