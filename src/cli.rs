use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "converge")]
#[command(version)]
#[command(about = "Converge this machine to the state declared in a directory", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file [default: ~/.config/converge/config.toml]
    #[arg(long, env = "CONVERGE_CONFIG", global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Resolve declarations and show the dependency tree and execution order
    Plan(PlanArgs),

    /// Check that declarations parse and resolve
    Validate(DirArgs),

    /// Converge resources in dependency order
    Apply(ApplyArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args)]
pub struct DirArgs {
    /// Directory of *.toml declarations [default: config `directory`, then ./states]
    #[arg(env = "CONVERGE_DIR", value_name = "DIR")]
    pub dir: Option<PathBuf>,
}

#[derive(Args)]
pub struct PlanArgs {
    #[command(flatten)]
    pub target: DirArgs,

    /// Repeat resources reachable along several branches
    #[arg(long)]
    pub all: bool,

    /// Print vertices, edges and order as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct ApplyArgs {
    #[command(flatten)]
    pub target: DirArgs,

    /// Show what would be done without making changes
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Resources converged in parallel within one frontier
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Run package manager commands through sudo
    #[arg(long)]
    pub sudo: bool,

    /// Do not refresh the package index first
    #[arg(long)]
    pub no_refresh: bool,
}
