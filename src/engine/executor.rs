//! Execution engine - converge-specific executor with UI integration

use colored::Colorize;
use declarative::{
    ApplyResult, ConfirmCallback, Error, ExecuteOptions, ExecuteSummary, PackageCache, Plan,
    ProgressCallback, SystemRunner,
};
use indicatif::ProgressBar;

use crate::progress;
use crate::ui;

/// Options for execution (CLI-specific, includes `yes` for confirmation skip)
#[derive(Debug, Clone, Default)]
pub struct ApplyOptions {
    pub execute: ExecuteOptions,
    /// Skip confirmation prompts
    pub yes: bool,
    /// Hide progress and per-resource lines
    pub quiet: bool,
}

/// Progress bar plus one line per converged resource
struct TerminalProgress {
    pb: ProgressBar,
    quiet: bool,
}

impl TerminalProgress {
    fn new(total: usize, quiet: bool) -> Self {
        Self {
            pb: progress::bar(total as u64, !quiet),
            quiet,
        }
    }

    fn line(&self, symbol: &str, id: &str, detail: &str) {
        if self.quiet {
            return;
        }
        let line = if detail.is_empty() {
            format!("  {symbol} {id}")
        } else {
            format!("  {symbol} {id} {}", detail.dimmed())
        };
        self.pb.suspend(|| println!("{line}"));
    }
}

impl ProgressCallback for TerminalProgress {
    fn on_batch_start(&mut self, count: usize) {
        log::debug!("starting batch of {count}");
    }

    fn on_resource_start(&mut self, id: &str, description: &str) {
        self.pb.set_message(format!("{id}: {description}"));
    }

    fn on_resource_complete(&mut self, id: &str, result: &ApplyResult) {
        match result {
            ApplyResult::NoChange => self.line(&"○".dimmed().to_string(), id, "up to date"),
            ApplyResult::Changed { detail } => self.line(&"✓".green().to_string(), id, detail),
            ApplyResult::Skipped { reason } => self.line(&"⊘".yellow().to_string(), id, reason),
        }
        self.pb.inc(1);
    }

    fn on_resource_failed(&mut self, id: &str, _error: &Error) {
        self.line(&"✗".red().to_string(), id, "failed");
        self.pb.inc(1);
    }

    fn on_batch_complete(&mut self) {}
}

impl Drop for TerminalProgress {
    fn drop(&mut self) {
        self.pb.finish_and_clear();
    }
}

/// Interactive confirmation, answered automatically by `--yes`
struct PromptConfirm {
    yes: bool,
    declined: bool,
}

impl ConfirmCallback for PromptConfirm {
    fn confirm(&mut self, prompt: &str) -> bool {
        if self.yes {
            return true;
        }
        let confirmed = match dialoguer::Confirm::new()
            .with_prompt(prompt)
            .default(true)
            .interact()
        {
            Ok(confirmed) => confirmed,
            Err(e) => {
                log::warn!("cannot prompt for confirmation: {e}");
                false
            }
        };
        self.declined = !confirmed;
        confirmed
    }
}

/// Execute the plan with converge's UI integration
pub fn execute(plan: &Plan, opts: &ApplyOptions) -> declarative::Result<ExecuteSummary> {
    let mut progress = TerminalProgress::new(plan.len(), opts.quiet);
    let mut confirm = PromptConfirm {
        yes: opts.yes,
        declined: false,
    };
    let cache = PackageCache::new();

    let summary = declarative::execute(
        plan,
        &opts.execute,
        &SystemRunner,
        &cache,
        &mut progress,
        &mut confirm,
    )?;
    drop(progress);

    if !opts.quiet {
        print_summary(&summary, opts.execute.dry_run, confirm.declined);
    }
    Ok(summary)
}

/// Print final summary
fn print_summary(summary: &ExecuteSummary, dry_run: bool, declined: bool) {
    println!();
    if dry_run {
        ui::info("Dry run - no changes made");
    } else if declined {
        ui::warn("Aborted - no changes made");
    } else {
        println!("  {} Converged", "✓".green().bold());
    }

    if summary.changed > 0 {
        println!("    • {} changed", ui::plural(summary.changed, "resource"));
    }
    if summary.no_change > 0 {
        println!("    • {} already up to date", ui::plural(summary.no_change, "resource"));
    }
    if summary.skipped > 0 {
        println!("    • {} skipped", ui::plural(summary.skipped, "resource"));
    }
}
