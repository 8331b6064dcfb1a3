//! Execution engine - converges a plan in dependency order
//!
//! With one job the plan is walked in topological order. With more, each
//! frontier of mutually independent resources runs on a rayon pool and must
//! finish before the next frontier is scheduled. Any failure stops the run;
//! resources that already converged are not rolled back.

use crate::context::{
    ApplyContext, AutoConfirm, CommandRunner, ConfirmCallback, NoProgress, PackageCache,
    ProgressCallback,
};
use crate::error::{Error, Result};
use crate::graph::VertexId;
use crate::resolver::{Plan, Step};
use crate::resource::Resource;
use crate::types::{ApplyResult, ExecuteOptions, ExecuteSummary};
use log::{debug, info};
use rayon::prelude::*;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

/// Execute a plan with the given options and callbacks
///
/// # Arguments
/// * `plan` - The resolved plan to converge
/// * `opts` - Execution options (dry_run, jobs, verbose, sudo)
/// * `runner` - Executes the commands resources issue
/// * `cache` - Package state shared by every resource in this run
/// * `progress` - Progress callback
/// * `confirm` - Asked once before anything changes; not asked on dry runs
///
/// # Returns
/// Summary of execution results, or the first failure
pub fn execute<P, C>(
    plan: &Plan,
    opts: &ExecuteOptions,
    runner: &dyn CommandRunner,
    cache: &PackageCache,
    progress: &mut P,
    confirm: &mut C,
) -> Result<ExecuteSummary>
where
    P: ProgressCallback,
    C: ConfirmCallback,
{
    if plan.is_empty() {
        return Ok(ExecuteSummary::default());
    }

    if !opts.dry_run && !confirm.confirm(&format!("Converge {} resources?", plan.len())) {
        return Ok(ExecuteSummary {
            skipped: plan.len(),
            ..Default::default()
        });
    }

    if opts.jobs <= 1 {
        execute_sequential(plan, opts, runner, cache, progress)
    } else {
        execute_frontiers(plan, opts, runner, cache, progress)
    }
}

/// Walk the plan in topological order, one resource at a time
fn execute_sequential<P: ProgressCallback>(
    plan: &Plan,
    opts: &ExecuteOptions,
    runner: &dyn CommandRunner,
    cache: &PackageCache,
    progress: &mut P,
) -> Result<ExecuteSummary> {
    let mut summary = ExecuteSummary::default();
    progress.on_batch_start(plan.len());

    plan.graph().walk(|vertex, _| -> Result<()> {
        let Some(step) = plan.step(vertex) else {
            return Ok(());
        };
        let name = step.key.to_string();
        progress.on_resource_start(&name, &step.state.describe());
        match converge_step(step, &name, opts, runner, cache) {
            Ok(result) => {
                progress.on_resource_complete(&name, &result);
                summary.add_result(&result);
                Ok(())
            }
            Err(e) => {
                progress.on_resource_failed(&name, &e);
                Err(e)
            }
        }
    })?;

    progress.on_batch_complete();
    Ok(summary)
}

/// Run each frontier in parallel on a pool of `opts.jobs` threads
fn execute_frontiers<P: ProgressCallback>(
    plan: &Plan,
    opts: &ExecuteOptions,
    runner: &dyn CommandRunner,
    cache: &PackageCache,
    progress: &mut P,
) -> Result<ExecuteSummary> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(opts.jobs)
        .build()
        .map_err(|e| Error::Io(io::Error::other(format!("failed to create thread pool: {e}"))))?;

    let mut summary = ExecuteSummary::default();
    let failed = AtomicBool::new(false);

    for frontier in plan.graph().frontiers()? {
        let steps: Vec<(VertexId, &Step)> = frontier
            .into_iter()
            .filter_map(|vertex| plan.step(vertex).map(|step| (vertex, step)))
            .collect();
        if steps.is_empty() {
            continue;
        }

        progress.on_batch_start(steps.len());

        // The progress callback is not shared across threads; results are
        // reported in insertion order once the frontier settles.
        let results: Vec<Option<Result<ApplyResult>>> = pool.install(|| {
            steps
                .par_iter()
                .map(|(_, step)| {
                    if failed.load(Ordering::SeqCst) {
                        return None;
                    }
                    let name = step.key.to_string();
                    let result = converge_step(step, &name, opts, runner, cache);
                    if result.is_err() {
                        failed.store(true, Ordering::SeqCst);
                    }
                    Some(result)
                })
                .collect()
        });

        let mut first_error = None;
        for ((_, step), result) in steps.iter().zip(results) {
            let name = step.key.to_string();
            match result {
                Some(Ok(result)) => {
                    progress.on_resource_start(&name, &step.state.describe());
                    progress.on_resource_complete(&name, &result);
                    summary.add_result(&result);
                }
                Some(Err(e)) => {
                    progress.on_resource_start(&name, &step.state.describe());
                    progress.on_resource_failed(&name, &e);
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
                None => debug!("{name}: not started after an earlier failure"),
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }
        progress.on_batch_complete();
    }

    Ok(summary)
}

fn converge_step(
    step: &Step,
    name: &str,
    opts: &ExecuteOptions,
    runner: &dyn CommandRunner,
    cache: &PackageCache,
) -> Result<ApplyResult> {
    info!("{name}: {}", step.state.describe());
    let ctx = ApplyContext::new(name, opts, runner, cache);
    let result = step.state.converge(&ctx)?;
    if let ApplyResult::Skipped { reason } = &result {
        debug!("{name}: skipped: {reason}");
    }
    Ok(result)
}

/// Simple execution without callbacks
///
/// For basic use cases where you don't need progress or confirmation.
pub fn execute_simple(
    plan: &Plan,
    opts: &ExecuteOptions,
    runner: &dyn CommandRunner,
    cache: &PackageCache,
) -> Result<ExecuteSummary> {
    execute(plan, opts, runner, cache, &mut NoProgress, &mut AutoConfirm)
}
