//! Resolver - turns declared stanzas into an ordered plan
//!
//! Resolution runs in three passes:
//!
//! 1. Every stanza becomes a vertex registered under its identifier. This
//!    pass may be fed from several threads.
//! 2. Once every vertex exists, each `requires` reference becomes an edge
//!    from the referenced resource to the dependent one. Resources without
//!    dependencies hang off the synthetic root.
//! 3. The remaining attributes decode into a resource of the stanza's kind.
//!
//! Wiring waits for registration to finish, so references may point
//! forward or backward in declaration order.

use crate::error::{Endpoint, Error, Result};
use crate::graph::{Digraph, VertexId};
use crate::resource::Resource;
use crate::stanza::{dependency_identifier, Node, RawStanza, ResourceKey};
use crate::states::State;
use log::debug;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};
use toml::{Table, Value};

/// Reserved attribute holding dependency references
pub const REQUIRES: &str = "requires";

/// A resolved resource
#[derive(Debug, Clone)]
pub struct Step {
    pub key: ResourceKey,
    pub state: State,
    /// References exactly as declared
    pub requires: Vec<String>,
    /// Document the resource was declared in
    pub source: String,
}

struct Pending {
    vertex: VertexId,
    key: ResourceKey,
    attributes: Table,
    source: String,
}

/// Builds a [`Plan`] from stanzas
pub struct Resolver {
    graph: Digraph<Node>,
    root: VertexId,
    pending: Mutex<Vec<Pending>>,
}

impl Resolver {
    /// Create a resolver whose graph holds only the root
    pub fn new() -> Result<Self> {
        let graph = Digraph::new();
        let root = graph.add_vertex(Node::Root, Node::Root.identifier())?;
        Ok(Self {
            graph,
            root,
            pending: Mutex::new(Vec::new()),
        })
    }

    /// Register one stanza as a vertex
    pub fn register(&self, stanza: RawStanza) -> Result<VertexId> {
        let key = stanza.key()?;
        let vertex = self
            .graph
            .add_vertex(Node::Resource(key.clone()), key.identifier())?;
        debug!("registered {key} from {}", stanza.source);

        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Pending {
                vertex,
                key,
                attributes: stanza.attributes,
                source: stanza.source,
            });
        Ok(vertex)
    }

    /// Register stanzas in order, stopping at the first failure
    pub fn register_all(&self, stanzas: impl IntoIterator<Item = RawStanza>) -> Result<()> {
        for stanza in stanzas {
            self.register(stanza)?;
        }
        Ok(())
    }

    /// Wire dependencies and decode every registered stanza
    pub fn resolve(self) -> Result<Plan> {
        let mut pending = self
            .pending
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        pending.sort_by_key(|p| p.vertex);

        let mut wired = Vec::with_capacity(pending.len());
        for mut entry in pending {
            let requires = take_requires(&entry.key, &mut entry.attributes)?;
            wire(&self.graph, &entry.key, &requires, entry.vertex)?;
            wired.push((entry, requires));
        }

        let mut steps = BTreeMap::new();
        for (entry, requires) in wired {
            let state = State::decode(&entry.key, entry.attributes)?;
            steps.insert(
                entry.vertex,
                Step {
                    key: entry.key,
                    state,
                    requires,
                    source: entry.source,
                },
            );
        }

        Ok(Plan {
            graph: self.graph,
            root: self.root,
            steps,
        })
    }
}

/// Resolve stanzas in one go
pub fn resolve(stanzas: impl IntoIterator<Item = RawStanza>) -> Result<Plan> {
    let resolver = Resolver::new()?;
    resolver.register_all(stanzas)?;
    resolver.resolve()
}

/// Remove `requires` from the attributes and normalise it to a list
fn take_requires(key: &ResourceKey, attributes: &mut Table) -> Result<Vec<String>> {
    let invalid = |message: &str| Error::AttributeDecode {
        resource: key.to_string(),
        message: format!("'{REQUIRES}' {message}"),
    };

    let references = match attributes.remove(REQUIRES) {
        None => Vec::new(),
        Some(Value::String(reference)) if reference.is_empty() => Vec::new(),
        Some(Value::String(reference)) => vec![reference],
        Some(Value::Array(items)) => items
            .into_iter()
            .map(|item| match item {
                Value::String(reference) if !reference.is_empty() => Ok(reference),
                Value::String(_) => Err(invalid("contains an empty reference")),
                _ => Err(invalid("must contain only strings")),
            })
            .collect::<Result<_>>()?,
        Some(_) => return Err(invalid("must be a string or a list of strings")),
    };
    Ok(references)
}

fn wire(graph: &Digraph<Node>, key: &ResourceKey, requires: &[String], vertex: VertexId) -> Result<()> {
    if requires.is_empty() {
        debug!("{key} has no dependencies, linking to root");
        return graph.link_to_root(vertex);
    }

    let dependent = key.identifier();
    for reference in requires {
        graph
            .link_by_identifier(&dependency_identifier(reference), &dependent)
            .map_err(|e| match e {
                Error::VertexNotFound {
                    endpoint: Endpoint::Source,
                    ..
                } => Error::DependencySourceNotFound {
                    reference: reference.clone(),
                    dependent: key.to_string(),
                },
                Error::VertexNotFound {
                    endpoint: Endpoint::Target,
                    ..
                } => Error::DependencyTargetNotFound {
                    dependent: key.to_string(),
                    reference: reference.clone(),
                },
                other => other,
            })?;
        debug!("{reference} -> {key}");
    }
    Ok(())
}

/// A validated dependency graph with a decoded resource per vertex
#[derive(Debug)]
pub struct Plan {
    graph: Digraph<Node>,
    root: VertexId,
    steps: BTreeMap<VertexId, Step>,
}

impl Plan {
    pub fn graph(&self) -> &Digraph<Node> {
        &self.graph
    }

    pub fn root(&self) -> VertexId {
        self.root
    }

    /// The resource behind a vertex; `None` for the root
    pub fn step(&self, vertex: VertexId) -> Option<&Step> {
        self.steps.get(&vertex)
    }

    /// Resources in declaration order
    pub fn steps(&self) -> impl Iterator<Item = (VertexId, &Step)> {
        self.steps.iter().map(|(vertex, step)| (*vertex, step))
    }

    /// Resource vertices in execution order, root excluded
    pub fn execution_order(&self) -> Result<Vec<VertexId>> {
        let order = self.graph.topological_order()?;
        Ok(order.into_iter().filter(|v| *v != self.root).collect())
    }

    /// Indented tree of the graph below the root
    pub fn tree(&self, include_duplicates: bool) -> Result<String> {
        self.graph.print(self.root, include_duplicates)
    }

    /// Number of resources
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    fn name(&self, vertex: VertexId) -> String {
        self.step(vertex)
            .map_or_else(|| Node::Root.to_string(), |step| step.key.to_string())
    }

    /// Machine-readable description of the plan
    pub fn report(&self) -> Result<PlanReport> {
        let resources = self
            .steps()
            .map(|(_, step)| ResourceReport {
                name: step.key.to_string(),
                kind: step.key.kind.clone(),
                group: step.key.group.clone(),
                instance: step.key.name.clone(),
                description: step.state.describe(),
                requires: step.requires.clone(),
                source: step.source.clone(),
            })
            .collect();

        let edges = self
            .graph
            .edges()
            .into_iter()
            .map(|(from, to)| EdgeReport {
                from: self.name(from),
                to: self.name(to),
            })
            .collect();

        let order = self
            .execution_order()?
            .into_iter()
            .map(|vertex| self.name(vertex))
            .collect();

        Ok(PlanReport {
            resources,
            edges,
            order,
        })
    }
}

/// Serializable summary of a [`Plan`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanReport {
    pub resources: Vec<ResourceReport>,
    pub edges: Vec<EdgeReport>,
    pub order: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceReport {
    pub name: String,
    pub kind: String,
    pub group: String,
    pub instance: String,
    pub description: String,
    pub requires: Vec<String>,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EdgeReport {
    pub from: String,
    pub to: String,
}
