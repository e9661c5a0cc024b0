//! `converge validate`: check the state file offline

use anyhow::{Result, bail};
use colored::Colorize;

use super::{Clients, Connect};
use crate::Context;
use crate::cli::ValidateArgs;
use crate::ui;

pub fn run(ctx: &Context, args: ValidateArgs) -> Result<()> {
    let (state, declarations) = super::load(args.file.as_deref(), None)?;
    let clients = Clients::build(ctx, &state, &declarations, Connect::Offline)?;

    let mut invalid = 0;
    for declaration in &declarations {
        match clients.validate(declaration)? {
            Ok(()) => {
                if !ctx.quiet {
                    println!("  {} {}", "✓".green(), declaration.label());
                }
            }
            Err(err) => {
                invalid += 1;
                println!("  {} {}: {}", "✗".red(), declaration.label().bold(), err);
            }
        }
    }

    if invalid > 0 {
        bail!("{invalid} of {} declaration(s) are invalid", declarations.len());
    }

    ui::success(&format!("{} declaration(s) are valid", declarations.len()));
    Ok(())
}
