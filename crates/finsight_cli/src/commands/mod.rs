//! CLI command definitions.
//!
//! Every subcommand works on one environment: its profile is read from
//! `<config-dir>/<env>.{json,yaml,yml,toml}` and compiled with the standard
//! FinSight units.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;

use finsight_plan::{Plan, PlanCompiler};
use finsight_profile::{EnvironmentProfile, FileProfileLoader, ProfileLoader};
use finsight_stacks::standard_registry;

pub mod diff;
pub mod synth;
pub mod validate;

/// FinSight infrastructure plan compiler
#[derive(Parser)]
#[command(name = "finsight")]
#[command(version, about = "FinSight infrastructure plan compiler")]
#[command(long_about = r#"
Compiles an environment profile into an ordered, fully resolved deployment
plan for the FinSight stacks (network, database, API, WAF, monitoring, email).

COMMANDS:
  synth     → Compile the plan and print or write it as JSON
  validate  → Validate the profile and check that the plan compiles
  diff      → Compare the plan with a recorded live state

EXIT CODES:
  0 - Success
  1 - General error
  2 - Invalid arguments / profile not found
  3 - Validation failure
  4 - Plan compilation failure
"#)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Target environment
    #[arg(short, long, global = true, env = "FINSIGHT_ENV", default_value = "prod")]
    pub env: String,

    /// Directory holding one profile file per environment
    #[arg(long, global = true, env = "FINSIGHT_CONFIG_DIR", default_value = "config")]
    pub config_dir: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compile the plan for an environment
    Synth(synth::SynthArgs),

    /// Validate a profile and its plan
    Validate(validate::ValidateArgs),

    /// Show the changes between the plan and a live state
    Diff(diff::DiffArgs),
}

impl GlobalArgs {
    pub fn load_profile(&self) -> Result<EnvironmentProfile> {
        let loader = FileProfileLoader::new(&self.config_dir);
        loader
            .load(&self.env)
            .with_context(|| format!("loading profile '{}'", self.env))
    }
}

/// Compile `profile` with the standard units.
pub fn compile_plan(profile: &EnvironmentProfile) -> Result<Plan> {
    let compiler = PlanCompiler::new(Arc::new(standard_registry()));
    let plan = compiler
        .compile(profile)
        .with_context(|| format!("compiling plan for '{}'", profile.environment))?;
    info!("Plan ready: {} unit(s)", plan.units.len());
    Ok(plan)
}
