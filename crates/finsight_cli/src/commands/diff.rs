//! Diff command - compare a plan with a recorded live state.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tracing::{info, warn};

use finsight_plan::{Executor, InMemoryExecutor, LiveState};

use super::{compile_plan, GlobalArgs};

#[derive(Args)]
pub struct DiffArgs {
    /// Live state file; a missing file means nothing is deployed yet
    #[arg(short, long)]
    state: PathBuf,

    /// Apply the plan to the state file after showing the diff
    #[arg(long)]
    apply: bool,
}

pub async fn execute(global: &GlobalArgs, args: DiffArgs) -> Result<()> {
    let profile = global.load_profile()?;
    let plan = compile_plan(&profile)?;

    let live = if args.state.exists() {
        LiveState::load(&args.state)
            .with_context(|| format!("reading state {}", args.state.display()))?
    } else {
        warn!("State file {:?} not found, diffing against an empty state", args.state);
        LiveState::new()
    };
    info!("Live state has {} resource(s)", live.len());

    let executor = InMemoryExecutor::with_state(live.clone());
    let changes = executor.diff(&plan, &live).await?;
    println!("{}", changes.report());

    if !args.apply {
        return Ok(());
    }
    if changes.is_empty() {
        println!("✅ Nothing to apply");
        return Ok(());
    }

    let outcome = executor.apply(&plan).await?;
    executor
        .state()
        .save(&args.state)
        .with_context(|| format!("writing state {}", args.state.display()))?;
    println!(
        "✅ Applied {} change(s) to {} (run {})",
        outcome.changes.changes.len(),
        args.state.display(),
        outcome.run_id
    );
    Ok(())
}
