use anyhow::Result;
use declarative::ExecuteOptions;

use crate::Context;
use crate::cli::ApplyArgs;
use crate::engine::{self, ApplyOptions};
use crate::loader;
use crate::ui;

pub fn run(ctx: &Context, args: ApplyArgs) -> Result<()> {
    let dir = ctx.config.states_dir(args.target.dir);
    let plan = loader::load_plan(&dir)?;

    // The resolved tree goes to stderr before anything runs
    eprint!("{}", plan.tree(false)?);

    if plan.is_empty() {
        ui::info("Nothing declared.");
        return Ok(());
    }

    let opts = ApplyOptions {
        execute: ExecuteOptions {
            dry_run: args.dry_run,
            jobs: args.jobs.unwrap_or(ctx.config.jobs).max(1),
            verbose: ctx.verbose > 0,
            sudo: args.sudo || ctx.config.sudo,
            refresh_index: ctx.config.refresh_index && !args.no_refresh,
        },
        yes: args.yes,
        quiet: ctx.quiet,
    };

    if opts.execute.sudo && !ctx.quiet {
        ui::dim("package manager commands run through sudo");
    }

    engine::execute(&plan, &opts)?;
    Ok(())
}
