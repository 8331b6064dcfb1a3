use anyhow::Result;
use colored::Colorize;
use declarative::Resource;

use crate::Context;
use crate::cli::PlanArgs;
use crate::loader;
use crate::ui;

pub fn run(ctx: &Context, args: PlanArgs) -> Result<()> {
    let dir = ctx.config.states_dir(args.target.dir);
    let plan = loader::load_plan(&dir)?;

    if args.json {
        let report = plan.report()?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    ui::header(&format!("Plan for {}", dir.display()));
    print!("{}", plan.tree(args.all)?);

    if plan.is_empty() {
        println!();
        ui::info("Nothing declared.");
        return Ok(());
    }

    ui::section("Execution order");
    let order = plan.execution_order()?;
    for (i, vertex) in order.iter().enumerate() {
        let Some(step) = plan.step(*vertex) else {
            continue;
        };
        ui::step(
            i + 1,
            order.len(),
            &format!("{} {}", step.key, step.state.describe().dimmed()),
        );
        if ctx.verbose > 0 {
            ui::kv("declared in", &step.source);
            if !step.requires.is_empty() {
                ui::kv("requires", &step.requires.join(", "));
            }
        }
    }

    Ok(())
}
