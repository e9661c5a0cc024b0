use colored::Colorize;
use convergence::{Change, ChangeSummary, ConvergenceResult, Outcome};

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

// ============================================================================
// Change Reports
// ============================================================================

fn change_line(change: &Change) -> String {
    let symbol = change.operation.symbol().to_string();
    let symbol = match change.operation.symbol() {
        '+' => symbol.green(),
        '-' => symbol.red(),
        _ => symbol.yellow(),
    };
    let operation = change.operation.to_string();

    match &change.outcome {
        Outcome::Applied => format!("    {symbol} {operation}"),
        Outcome::Skipped { reason } => {
            format!("    {symbol} {operation} {}", format!("({reason})").dimmed())
        }
        Outcome::Failed { error } => {
            format!("    {} {operation}: {}", "✗".red(), error.red())
        }
    }
}

/// Print the ledger of one resource
pub fn report(label: &str, result: &ConvergenceResult) {
    let icon = if !result.succeeded() {
        "✗".red()
    } else if result.changes.is_empty() {
        "✓".green()
    } else {
        "●".cyan()
    };
    println!("  {} {}", icon, label.bold());

    if result.is_converged() {
        println!("    {}", "up to date".dimmed());
    }
    for change in &result.changes {
        println!("{}", change_line(change));
    }
    if let Some(failure) = &result.failure
        && result.changes.iter().all(|c| !c.outcome.is_failed())
    {
        println!("    {} {}", "✗".red(), failure.to_string().red());
    }
}

/// Print totals across every resource
pub fn summary(summary: &ChangeSummary, failed_resources: usize) {
    println!();
    kv("Created", &summary.created.to_string());
    kv("Patched", &summary.patched.to_string());
    kv("Added", &summary.added.to_string());
    kv("Removed", &summary.removed.to_string());
    kv("Deleted", &summary.deleted.to_string());
    if summary.skipped > 0 {
        kv("Skipped", &summary.skipped.to_string());
    }
    if failed_resources > 0 {
        kv("Failed", &failed_resources.to_string().red().to_string());
    }
}
