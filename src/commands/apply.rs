//! `converge apply`: plan, confirm, converge

use anyhow::{Context as _, Result, bail};
use convergence::{ConvergenceResult, Options};
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};

use super::{Clients, Connect};
use crate::Context;
use crate::cli::ApplyArgs;
use crate::schema::Declaration;
use crate::ui;

fn progress_bar(len: usize, hidden: bool) -> ProgressBar {
    if hidden {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len as u64);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-");
    pb.set_style(style);
    pb
}

/// Declarations whose dry run found something to do
fn pending<'a>(
    declarations: &'a [Declaration],
    plan: &[ConvergenceResult],
) -> Vec<&'a Declaration> {
    declarations
        .iter()
        .zip(plan)
        .filter(|(_, result)| !result.changes.is_empty())
        .map(|(declaration, _)| declaration)
        .collect()
}

fn print_json(results: &[ConvergenceResult]) -> Result<()> {
    let json = serde_json::to_string_pretty(results).context("Failed to encode results")?;
    println!("{json}");
    Ok(())
}

pub fn run(ctx: &Context, args: ApplyArgs) -> Result<()> {
    let (state, declarations) = super::load(args.file.as_deref(), args.target.as_deref())?;
    if declarations.is_empty() {
        return Ok(());
    }

    let clients = Clients::build(ctx, &state, &declarations, Connect::Online)?;
    let quiet_output = args.json || ctx.quiet;

    let pb = progress_bar(declarations.len(), quiet_output);
    pb.set_message("Planning");
    let plan =
        super::converge_all(&clients, &declarations, Options::dry_run(), args.jobs, &pb)?;
    pb.finish_and_clear();

    if plan.iter().any(|r| !r.succeeded()) {
        if args.json {
            print_json(&plan)?;
        } else {
            ui::header("Plan");
            super::report(ctx, &declarations, &plan);
        }
        bail!("Planning failed; nothing was applied");
    }

    let pending = pending(&declarations, &plan);
    if pending.is_empty() {
        if args.json {
            print_json(&plan)?;
        } else {
            ui::success("Everything is converged, nothing to do");
        }
        return Ok(());
    }

    if !args.json {
        ui::header("Plan");
        for (declaration, result) in declarations.iter().zip(&plan) {
            if !result.changes.is_empty() {
                ui::report(&declaration.label(), result);
            }
        }
        println!();
    }

    if args.dry_run {
        if args.json {
            print_json(&plan)?;
        } else {
            ui::warn("Dry run - no changes will be made");
        }
        return Ok(());
    }

    if !args.yes {
        let changes: usize = plan.iter().map(|r| r.changes.len()).sum();
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "Apply {changes} change(s) to {} resource(s)?",
                pending.len()
            ))
            .default(false)
            .interact()
            .context("Failed to read confirmation")?;

        if !confirmed {
            ui::info("Aborted");
            return Ok(());
        }
    }

    // Each resource is fetched and diffed again
    let targets: Vec<Declaration> = pending.into_iter().cloned().collect();
    let pb = progress_bar(targets.len(), quiet_output);
    let results = super::converge_all(&clients, &targets, Options::default(), args.jobs, &pb)?;
    pb.finish_and_clear();

    let failed = if args.json {
        print_json(&results)?;
        results.iter().filter(|r| !r.succeeded()).count()
    } else {
        ui::header("Apply");
        let failed = super::report(ctx, &targets, &results);
        println!();
        if failed == 0 {
            ui::success("Apply complete!");
        }
        failed
    };

    if failed > 0 {
        bail!("{failed} of {} resource(s) failed to converge", targets.len());
    }
    Ok(())
}
