//! Apply context and provider traits
//!
//! These traits allow the declarative crate to be used without
//! depending on specific implementations of process execution, progress, etc.

use crate::error::{CapturedOutput, Error, Phase, Result};
use crate::types::{ApplyResult, CommandOutput, ExecuteOptions};
use std::collections::HashSet;
use std::io;
use std::process::Command;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Runs external commands on behalf of resources
///
/// Implement this trait to redirect or record command execution.
pub trait CommandRunner: Send + Sync {
    /// Run a command to completion, capturing its output
    fn run(&self, cmd: &str, args: &[&str]) -> io::Result<CommandOutput>;

    /// Check if a command can be executed
    ///
    /// A command containing `/` must be an executable file; anything else is
    /// looked up on `PATH`.
    fn command_exists(&self, cmd: &str) -> bool {
        which::which(cmd).is_ok()
    }
}

/// Runs commands as child processes of this one
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, cmd: &str, args: &[&str]) -> io::Result<CommandOutput> {
        let output = Command::new(cmd).args(args).output()?;
        Ok(output.into())
    }
}

/// Process-scoped package state shared by every package resource in a run
///
/// The package index is refreshed at most once, and the installed package
/// set is loaded at most once and then kept current as packages install.
#[derive(Debug, Default)]
pub struct PackageCache {
    index_refreshed: Mutex<bool>,
    installed: Mutex<Option<HashSet<String>>>,
    package_manager: Mutex<()>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl PackageCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// A cache that already knows the installed packages and considers the
    /// index fresh
    pub fn seeded<I, S>(installed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            index_refreshed: Mutex::new(true),
            installed: Mutex::new(Some(installed.into_iter().map(Into::into).collect())),
            package_manager: Mutex::new(()),
        }
    }

    /// Whether the package index was refreshed during this run
    pub fn index_refreshed(&self) -> bool {
        *lock(&self.index_refreshed)
    }

    /// Run `refresh` unless a previous call already succeeded
    ///
    /// Concurrent callers wait for the first one instead of refreshing twice.
    pub fn refresh_once<F>(&self, refresh: F) -> Result<()>
    where
        F: FnOnce() -> Result<()>,
    {
        let mut refreshed = lock(&self.index_refreshed);
        if !*refreshed {
            refresh()?;
            *refreshed = true;
        }
        Ok(())
    }

    /// Load the installed set with `load` unless it is already known
    pub fn ensure_loaded<F>(&self, load: F) -> Result<()>
    where
        F: FnOnce() -> Result<HashSet<String>>,
    {
        let mut installed = lock(&self.installed);
        if installed.is_none() {
            *installed = Some(load()?);
        }
        Ok(())
    }

    /// Whether a package is recorded as installed
    pub fn is_installed(&self, name: &str) -> bool {
        lock(&self.installed)
            .as_ref()
            .is_some_and(|set| set.contains(name))
    }

    /// Run `f` while holding the package manager lock
    ///
    /// dpkg allows one writer at a time.
    pub fn exclusive<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = lock(&self.package_manager);
        f()
    }

    /// Record packages as installed
    pub fn mark_installed<'a>(&self, names: impl IntoIterator<Item = &'a str>) {
        let mut installed = lock(&self.installed);
        let set = installed.get_or_insert_with(HashSet::new);
        set.extend(names.into_iter().map(ToString::to_string));
    }
}

/// Progress callback for execution operations
///
/// Implement this trait to receive progress updates during execution.
pub trait ProgressCallback: Send {
    /// Called when a frontier of `count` independent resources starts
    fn on_batch_start(&mut self, count: usize);

    /// Called when starting to apply a single resource
    fn on_resource_start(&mut self, id: &str, description: &str);

    /// Called when a resource application completes
    fn on_resource_complete(&mut self, id: &str, result: &ApplyResult);

    /// Called when a resource fails; execution stops afterwards
    fn on_resource_failed(&mut self, id: &str, error: &Error);

    /// Called when a frontier completes
    fn on_batch_complete(&mut self);
}

/// Confirmation callback for user interaction
///
/// Implement this trait to handle user confirmations.
pub trait ConfirmCallback: Send {
    /// Ask the user to confirm an action
    ///
    /// An implementation that cannot ask should answer `false`.
    fn confirm(&mut self, prompt: &str) -> bool;
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_batch_start(&mut self, _count: usize) {}
    fn on_resource_start(&mut self, _id: &str, _description: &str) {}
    fn on_resource_complete(&mut self, _id: &str, _result: &ApplyResult) {}
    fn on_resource_failed(&mut self, _id: &str, _error: &Error) {}
    fn on_batch_complete(&mut self) {}
}

/// Auto-confirm callback (always returns true)
pub struct AutoConfirm;

impl ConfirmCallback for AutoConfirm {
    fn confirm(&mut self, _prompt: &str) -> bool {
        true
    }
}

/// Auto-decline callback (always returns false)
pub struct AutoDecline;

impl ConfirmCallback for AutoDecline {
    fn confirm(&mut self, _prompt: &str) -> bool {
        false
    }
}

/// Context passed to resource operations
pub struct ApplyContext<'a> {
    /// Display name of the resource being converged
    pub resource: &'a str,
    /// Whether this is a dry run (no actual changes)
    pub dry_run: bool,
    /// Whether to output verbose information
    pub verbose: bool,
    /// Prefix privileged commands with sudo
    pub sudo: bool,
    /// Refresh the package index before reading it
    pub refresh_index: bool,
    /// Executes commands
    pub runner: &'a dyn CommandRunner,
    /// Package state shared across the run
    pub cache: &'a PackageCache,
}

impl<'a> ApplyContext<'a> {
    /// Create a context for one resource
    pub fn new(
        resource: &'a str,
        opts: &ExecuteOptions,
        runner: &'a dyn CommandRunner,
        cache: &'a PackageCache,
    ) -> Self {
        Self {
            resource,
            dry_run: opts.dry_run,
            verbose: opts.verbose,
            sudo: opts.sudo,
            refresh_index: opts.refresh_index,
            runner,
            cache,
        }
    }

    /// Build a failure for this resource
    pub fn fail(&self, phase: Phase, message: impl Into<String>) -> Error {
        Error::ResourceActionFailed {
            resource: self.resource.to_string(),
            phase,
            message: message.into(),
            output: CapturedOutput::none(),
        }
    }

    /// Run a command and return its output whatever the exit status
    pub fn capture(&self, phase: Phase, cmd: &str, args: &[&str]) -> Result<CommandOutput> {
        log::debug!("{}: running {} {}", self.resource, cmd, args.join(" "));
        self.runner
            .run(cmd, args)
            .map_err(|e| self.fail(phase, format!("failed to execute {cmd}: {e}")))
    }

    /// Run a command that must exit successfully
    pub fn run(&self, phase: Phase, cmd: &str, args: &[&str]) -> Result<CommandOutput> {
        let output = self.capture(phase, cmd, args)?;
        if !output.success {
            let line: Vec<&str> = std::iter::once(cmd).chain(args.iter().copied()).collect();
            return Err(Error::ResourceActionFailed {
                resource: self.resource.to_string(),
                phase,
                message: format!("{} failed with {}", line.join(" "), output.status_str()),
                output: output.combined().into(),
            });
        }
        Ok(output)
    }

    /// Run a command that must exit successfully, through sudo when enabled
    pub fn run_privileged(&self, phase: Phase, cmd: &str, args: &[&str]) -> Result<CommandOutput> {
        if self.sudo {
            let mut sudo_args = Vec::with_capacity(args.len() + 1);
            sudo_args.push(cmd);
            sudo_args.extend_from_slice(args);
            self.run(phase, "sudo", &sudo_args)
        } else {
            self.run(phase, cmd, args)
        }
    }
}
