//! # Declarative
//!
//! A dependency-ordered engine for declarative machine state.
//!
//! Resources are declared as `[kind.group.name]` TOML tables with an
//! optional `requires` attribute naming other resources. The engine builds
//! an acyclic dependency graph from the declarations and converges each
//! resource only after everything it depends on has converged.
//!
//! ## Core Concepts
//!
//! - **Digraph**: a DAG that rejects cycles when an edge is inserted
//! - **Resolver**: registers every stanza, then wires `requires` into edges
//! - **Plan**: the resolved graph plus a decoded resource per vertex
//! - **Resource**: the `pre` / `apply` / `post` contract every kind implements
//! - **Executor**: walks the plan in topological order, optionally running
//!   independent resources in parallel
//!
//! ## Example
//!
//! ```no_run
//! use declarative::{
//!     execute_simple, parse_document, resolve, ExecuteOptions, PackageCache, SystemRunner,
//! };
//!
//! let text = r#"
//! [apt.update.base]
//! packages = ["curl"]
//!
//! [shell.run.hello]
//! cmd = "echo"
//! args = ["hi"]
//! requires = "apt.update.base"
//! "#;
//!
//! let plan = resolve(parse_document("states.toml", text)?)?;
//! eprint!("{}", plan.tree(false)?);
//!
//! let summary = execute_simple(
//!     &plan,
//!     &ExecuteOptions::default(),
//!     &SystemRunner,
//!     &PackageCache::new(),
//! )?;
//! println!("{} changed", summary.changed);
//! # Ok::<(), declarative::Error>(())
//! ```
//!
//! ## Provider Traits
//!
//! The crate uses traits for dependency injection:
//!
//! - [`CommandRunner`]: Executes the commands resources issue
//! - [`ProgressCallback`]: Receives progress updates
//! - [`ConfirmCallback`]: Handles user confirmations
//!
//! This allows the crate to be used without hard dependencies on
//! specific UI frameworks or process handling.

pub mod context;
pub mod error;
pub mod executor;
pub mod graph;
pub mod resolver;
pub mod resource;
pub mod stanza;
pub mod states;
pub mod types;

// Re-export main types at crate root
pub use context::{
    ApplyContext, AutoConfirm, AutoDecline, CommandRunner, ConfirmCallback, NoProgress,
    PackageCache, ProgressCallback, SystemRunner,
};
pub use error::{CapturedOutput, Endpoint, Error, Phase, Result};
pub use executor::{execute, execute_simple};
pub use graph::{Digraph, VertexId};
pub use resolver::{resolve, EdgeReport, Plan, PlanReport, Resolver, ResourceReport, Step};
pub use resource::Resource;
pub use stanza::{dependency_identifier, parse_document, Node, RawStanza, ResourceKey};
pub use states::{Apt, Shell, State};
pub use types::{ApplyResult, CommandOutput, ExecuteOptions, ExecuteSummary};
