//! Synth command - compile a plan to JSON.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use super::{compile_plan, GlobalArgs};

#[derive(Args)]
pub struct SynthArgs {
    /// Write the plan here instead of stdout
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Print only the per-unit summary
    #[arg(long)]
    summary: bool,
}

pub async fn execute(global: &GlobalArgs, args: SynthArgs) -> Result<()> {
    let profile = global.load_profile()?;
    let plan = compile_plan(&profile)?;

    if args.summary {
        println!("{}", plan.summary());
        return Ok(());
    }

    let json = plan.to_json()?;
    match &args.out {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
            fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
            info!("Plan written to {:?}", path);
            if !global.quiet {
                println!("{}", plan.summary());
                println!("✅ Plan written to {}", path.display());
            }
        }
        None => println!("{}", json),
    }

    Ok(())
}
