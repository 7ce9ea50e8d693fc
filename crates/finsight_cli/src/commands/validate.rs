//! Validate command - check a profile and that its plan compiles.

use anyhow::Result;
use clap::Args;
use tracing::info;

use finsight_profile::ProfileValidator;

use super::{compile_plan, GlobalArgs};

#[derive(Args)]
pub struct ValidateArgs {
    /// Only validate the profile, skip plan compilation
    #[arg(long)]
    profile_only: bool,
}

pub async fn execute(global: &GlobalArgs, args: ValidateArgs) -> Result<()> {
    info!("Validating environment: {}", global.env);

    println!("📋 Validating profile '{}'...", global.env);
    let profile = global.load_profile()?;
    let result = ProfileValidator::validate(&profile);
    for warning in &result.warnings {
        println!("   ⚠️  {}", warning);
    }
    println!("   ✅ Profile is valid ({}, {} tier)", profile.region, profile.tier());

    if args.profile_only {
        return Ok(());
    }

    println!("🏗️  Compiling plan...");
    let plan = compile_plan(&profile)?;
    println!(
        "   ✅ {} unit(s), {} resource(s), {} reference(s)",
        plan.units.len(),
        plan.resource_count(),
        plan.references.len()
    );

    println!();
    println!("✅ All validations passed!");
    Ok(())
}
