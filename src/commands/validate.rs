use anyhow::Result;

use crate::Context;
use crate::cli::DirArgs;
use crate::loader;
use crate::ui;

pub fn run(ctx: &Context, args: DirArgs) -> Result<()> {
    let dir = ctx.config.states_dir(args.dir);
    let files = loader::declaration_files(&dir)?;
    let plan = loader::load_plan(&dir)?;

    if ctx.quiet {
        return Ok(());
    }
    ui::success(&format!(
        "{} valid: {}, {} in {}",
        dir.display(),
        ui::plural(plan.len(), "resource"),
        ui::plural(plan.graph().edge_count(), "edge"),
        ui::plural(files.len(), "file"),
    ));
    Ok(())
}
