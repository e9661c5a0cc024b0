//! `converge plan`: every declaration as a dry run

use anyhow::{Context as _, Result};
use convergence::Options;
use indicatif::ProgressBar;

use super::{Clients, Connect};
use crate::Context;
use crate::cli::PlanArgs;
use crate::ui;

/// Read-only requests run on this many workers
const PLAN_JOBS: usize = 4;

pub fn run(ctx: &Context, args: PlanArgs) -> Result<()> {
    let (state, declarations) = super::load(args.file.as_deref(), args.target.as_deref())?;
    if declarations.is_empty() {
        return Ok(());
    }

    let clients = Clients::build(ctx, &state, &declarations, Connect::Online)?;
    let results = super::converge_all(
        &clients,
        &declarations,
        Options::dry_run(),
        PLAN_JOBS,
        &ProgressBar::hidden(),
    )?;

    if args.json {
        let json = serde_json::to_string_pretty(&results).context("Failed to encode results")?;
        println!("{json}");
    } else {
        ui::header("Plan");
        let failed = super::report(ctx, &declarations, &results);
        let pending = results.iter().filter(|r| !r.changes.is_empty()).count();
        println!();
        if pending == 0 && failed == 0 {
            ui::success("Everything is converged");
        } else if !ctx.quiet {
            ui::info(&format!("{pending} resource(s) would change"));
        }
    }

    let failed = results.iter().filter(|r| !r.succeeded()).count();
    if failed > 0 {
        anyhow::bail!("{failed} resource(s) could not be planned");
    }
    Ok(())
}
