//! Resource trait for declarative state management
//!
//! A Resource is one declared piece of machine state. The executor drives
//! every resource through the same contract, in dependency order:
//! `pre`, then `apply`, then `post`.

use crate::context::ApplyContext;
use crate::error::Result;
use crate::types::ApplyResult;
use std::fmt;

/// Core trait for declarative resources
///
/// # Example
///
/// ```ignore
/// use declarative::{ApplyContext, ApplyResult, Resource, Result};
///
/// #[derive(Debug)]
/// struct Touch { path: String }
///
/// impl Resource for Touch {
///     fn kind(&self) -> &'static str { "touch" }
///
///     fn describe(&self) -> String { format!("touch {}", self.path) }
///
///     fn apply(&self, ctx: &ApplyContext) -> Result<ApplyResult> {
///         if ctx.dry_run {
///             return Ok(ApplyResult::Skipped { reason: "dry run".into() });
///         }
///         ctx.run(declarative::Phase::Apply, "touch", &[&self.path])?;
///         Ok(ApplyResult::Changed { detail: self.describe() })
///     }
/// }
/// ```
pub trait Resource: Send + Sync + fmt::Debug {
    /// Resource kind as written in declarations, e.g. `apt`
    fn kind(&self) -> &'static str;

    /// Human-readable description of the action this resource performs
    fn describe(&self) -> String;

    /// Reconcile with another declaration of the same identity
    ///
    /// No current kind merges anything.
    fn merge(&mut self, _peer: &Self)
    where
        Self: Sized,
    {
    }

    /// Idempotent preparation, safe to call repeatedly
    fn pre(&self, _ctx: &ApplyContext) -> Result<()> {
        Ok(())
    }

    /// Perform the convergence action
    ///
    /// Must respect `ctx.dry_run` by returning `Skipped` without side effects.
    fn apply(&self, ctx: &ApplyContext) -> Result<ApplyResult>;

    /// Idempotent verification or cleanup
    fn post(&self, _ctx: &ApplyContext) -> Result<()> {
        Ok(())
    }

    /// Run the full contract, stopping at the first failing phase
    fn converge(&self, ctx: &ApplyContext) -> Result<ApplyResult> {
        self.pre(ctx)?;
        let result = self.apply(ctx)?;
        self.post(ctx)?;
        Ok(result)
    }
}
