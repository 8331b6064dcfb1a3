//! Error types for the declarative engine.
//!
//! Every failure the graph, the resolver or a resource action can produce is
//! a variant here. Dependency errors always name both ends of the reference
//! so an operator can find the offending declaration.

use std::fmt;
use thiserror::Error;

/// Which end of an edge an identifier lookup failed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Source,
    Target,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source => write!(f, "source"),
            Self::Target => write!(f, "target"),
        }
    }
}

/// Convergence phase a resource action failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Pre,
    Apply,
    Post,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pre => write!(f, "pre"),
            Self::Apply => write!(f, "apply"),
            Self::Post => write!(f, "post"),
        }
    }
}

/// Errors produced while building or executing a plan
#[derive(Error, Debug)]
pub enum Error {
    /// A vertex with the same value or identifier is already registered
    #[error("vertex already exists: {id}")]
    VertexExists { id: String },

    /// A vertex handle or identifier is not registered in the graph
    #[error("{endpoint} vertex does not exist: {id}")]
    VertexNotFound { id: String, endpoint: Endpoint },

    /// An edge from a vertex to itself
    #[error("vertex cannot depend on itself: {id}")]
    SelfCycle { id: String },

    /// The same ordered edge was added twice
    #[error("edge already exists: {source_id} -> {target_id}")]
    EdgeExists {
        source_id: String,
        target_id: String,
    },

    /// Adding the edge would close a loop
    #[error("edge {source_id} -> {target_id} would create a cycle")]
    CycleDetected {
        source_id: String,
        target_id: String,
    },

    /// Topological ordering left vertices unvisited
    #[error("graph is inconsistent: vertices never became ready: {}", .unvisited.join(", "))]
    InconsistentOrder { unvisited: Vec<String> },

    /// A declaration is not labelled `kind.group.name`
    #[error("invalid stanza '{labels}' in {source_name}: expected exactly three labels (kind, group, name)")]
    InvalidStanza { labels: String, source_name: String },

    /// A TOML document could not be parsed
    #[error("failed to parse {source_name}: {message}")]
    Parse {
        source_name: String,
        message: String,
    },

    /// No resource kind is registered under this name
    #[error("unknown resource kind '{kind}' for {resource}")]
    UnknownResourceKind { kind: String, resource: String },

    /// Attributes did not decode into the kind's structure
    #[error("invalid attributes for {resource}: {message}")]
    AttributeDecode { resource: String, message: String },

    /// A `requires` reference names a resource that was never declared
    #[error("unable to find 'requires' state '{reference}', which {dependent} depends on")]
    DependencySourceNotFound {
        reference: String,
        dependent: String,
    },

    /// The dependent resource itself could not be located
    #[error("unable to find target state {dependent} which '{reference}' points to")]
    DependencyTargetNotFound {
        dependent: String,
        reference: String,
    },

    /// A resource's pre, apply or post step failed
    #[error("{resource} failed during {phase}: {message}{output}")]
    ResourceActionFailed {
        resource: String,
        phase: Phase,
        message: String,
        output: CapturedOutput,
    },

    /// Filesystem or process error outside a resource action
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Command output attached to a failed resource action.
///
/// Displays as a trailing block on its own line, or nothing when empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput(pub Option<String>);

impl CapturedOutput {
    pub fn none() -> Self {
        Self(None)
    }

    pub fn text(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

impl From<String> for CapturedOutput {
    fn from(output: String) -> Self {
        Self(Some(output))
    }
}

impl fmt::Display for CapturedOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.as_deref().map(str::trim) {
            Some(out) if !out.is_empty() => write!(f, "\n{out}"),
            _ => Ok(()),
        }
    }
}

impl Error {
    /// Whether this error was raised while inserting an edge
    pub fn is_edge_violation(&self) -> bool {
        matches!(
            self,
            Self::SelfCycle { .. } | Self::EdgeExists { .. } | Self::CycleDetected { .. }
        )
    }
}

/// Result type for declarative operations
pub type Result<T> = std::result::Result<T, Error>;
