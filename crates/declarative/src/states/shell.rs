//! Arbitrary commands

use super::default_true;
use crate::context::ApplyContext;
use crate::error::{Phase, Result};
use crate::resource::Resource;
use crate::types::ApplyResult;
use log::{debug, info};
use serde::Deserialize;

pub const KIND: &str = "shell";

/// A command run once per convergence
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Shell {
    pub cmd: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Accepted for compatibility with apt declarations; ignored
    #[serde(default = "default_true")]
    pub allow_no_version: bool,
}

impl Shell {
    /// The command line as it would be typed
    pub fn command_line(&self) -> String {
        std::iter::once(self.cmd.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl Resource for Shell {
    fn kind(&self) -> &'static str {
        KIND
    }

    fn describe(&self) -> String {
        format!("run {}", self.command_line())
    }

    fn pre(&self, ctx: &ApplyContext) -> Result<()> {
        if ctx.runner.command_exists(&self.cmd) {
            Ok(())
        } else {
            Err(ctx.fail(Phase::Pre, format!("command not found: {}", self.cmd)))
        }
    }

    fn apply(&self, ctx: &ApplyContext) -> Result<ApplyResult> {
        if ctx.dry_run {
            return Ok(ApplyResult::Skipped {
                reason: format!("would run: {}", self.command_line()),
            });
        }

        let args: Vec<&str> = self.args.iter().map(String::as_str).collect();
        let output = ctx.run(Phase::Apply, &self.cmd, &args)?;

        let combined = output.combined();
        if !combined.is_empty() {
            if ctx.verbose {
                info!("{}: {combined}", ctx.resource);
            } else {
                debug!("{}: {combined}", ctx.resource);
            }
        }

        Ok(ApplyResult::Changed {
            detail: format!("ran {}", self.command_line()),
        })
    }
}
