//! Core types for declarative resource management

use serde::Serialize;
use std::process::Output;

/// Result of converging a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ApplyResult {
    /// Already in the desired state
    NoChange,
    /// The resource action ran and changed the system
    Changed { detail: String },
    /// Nothing was done, e.g. during a dry run
    Skipped { reason: String },
}

/// Summary of execution results
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecuteSummary {
    pub changed: usize,
    pub no_change: usize,
    pub skipped: usize,
}

impl ExecuteSummary {
    /// Total number of resources processed
    pub fn total(&self) -> usize {
        self.changed + self.no_change + self.skipped
    }

    /// Add a result to the summary
    pub fn add_result(&mut self, result: &ApplyResult) {
        match result {
            ApplyResult::NoChange => self.no_change += 1,
            ApplyResult::Changed { .. } => self.changed += 1,
            ApplyResult::Skipped { .. } => self.skipped += 1,
        }
    }
}

/// Options for execution
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Don't make changes, just show what would happen
    pub dry_run: bool,
    /// Number of resources converged concurrently within one frontier
    pub jobs: usize,
    /// Verbose output
    pub verbose: bool,
    /// Prefix package manager commands with sudo
    pub sudo: bool,
    /// Refresh the package index before the first package resource
    pub refresh_index: bool,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            jobs: 1,
            verbose: false,
            sudo: false,
            refresh_index: true,
        }
    }
}

/// Output captured from a command
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub success: bool,
    pub code: Option<i32>,
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        Self {
            stdout: output.stdout,
            stderr: output.stderr,
            success: output.status.success(),
            code: output.status.code(),
        }
    }
}

impl CommandOutput {
    /// Successful output with the given stdout, for fakes and tests
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into().into_bytes(),
            stderr: Vec::new(),
            success: true,
            code: Some(0),
        }
    }

    /// Failed output with the given exit code and stderr
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            stdout: Vec::new(),
            stderr: stderr.into().into_bytes(),
            success: false,
            code: Some(code),
        }
    }

    /// Get stdout as a string
    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    /// Get stderr as a string
    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }

    /// Stdout followed by stderr, trimmed
    pub fn combined(&self) -> String {
        let stdout = self.stdout_str();
        let stderr = self.stderr_str();
        match (stdout.trim(), stderr.trim()) {
            ("", err) => err.to_string(),
            (out, "") => out.to_string(),
            (out, err) => format!("{out}\n{err}"),
        }
    }

    /// Human-readable exit status
    pub fn status_str(&self) -> String {
        match self.code {
            Some(code) => format!("exit status {code}"),
            None => "terminated by signal".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_counts_each_result() {
        let mut summary = ExecuteSummary::default();
        summary.add_result(&ApplyResult::NoChange);
        summary.add_result(&ApplyResult::Changed {
            detail: "ran echo".into(),
        });
        summary.add_result(&ApplyResult::Skipped {
            reason: "dry run".into(),
        });
        assert_eq!(summary.total(), 3);
        assert_eq!(summary.changed, 1);
    }

    #[test]
    fn combined_output_joins_streams() {
        let output = CommandOutput {
            stdout: b"hello\n".to_vec(),
            stderr: b"warning\n".to_vec(),
            success: true,
            code: Some(0),
        };
        assert_eq!(output.combined(), "hello\nwarning");
        assert_eq!(CommandOutput::failed(2, "boom").combined(), "boom");
        assert_eq!(CommandOutput::failed(2, "").status_str(), "exit status 2");
    }
}
