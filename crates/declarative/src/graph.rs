//! Acyclic dependency graph
//!
//! Vertices live in an arena and are addressed by [`VertexId`] handles; a
//! separate table maps each vertex's stable string identifier to its handle.
//! An edge `a -> b` means "a must complete before b may begin".
//!
//! Acyclicity is enforced when an edge is inserted, so the graph is a DAG at
//! every point in its life. The first vertex ever added becomes the root.
//!
//! All structural operations and traversals hold the exclusive lock for
//! their whole duration, which makes the check-then-insert in
//! [`Digraph::add_edge`] atomic. Counter reads take the shared lock.

use crate::error::{Endpoint, Error, Result};
use log::trace;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt::{self, Write as _};
use std::hash::Hash;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Handle to a vertex, ordered by insertion
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VertexId(usize);

impl VertexId {
    /// Position of the vertex in insertion order
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for VertexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

struct Inner<T> {
    vertices: Vec<T>,
    by_value: HashMap<T, VertexId>,
    by_identifier: HashMap<String, VertexId>,
    adjacency: Vec<Vec<VertexId>>,
    edge_count: usize,
    root: Option<VertexId>,
}

/// A directed acyclic graph over vertex values of type `T`
pub struct Digraph<T> {
    inner: RwLock<Inner<T>>,
}

impl<T> Digraph<T>
where
    T: Clone + Eq + Hash + fmt::Display,
{
    /// Create an empty graph
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                vertices: Vec::new(),
                by_value: HashMap::new(),
                by_identifier: HashMap::new(),
                adjacency: Vec::new(),
                edge_count: 0,
                root: None,
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner<T>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner<T>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a vertex under a unique identifier
    ///
    /// The first vertex ever registered becomes the root.
    pub fn add_vertex(&self, vertex: T, identifier: impl Into<String>) -> Result<VertexId> {
        let identifier = identifier.into();
        let mut inner = self.write();

        if inner.by_value.contains_key(&vertex) {
            return Err(Error::VertexExists {
                id: vertex.to_string(),
            });
        }
        if inner.by_identifier.contains_key(&identifier) {
            return Err(Error::VertexExists { id: identifier });
        }

        let id = VertexId(inner.vertices.len());
        if inner.root.is_none() {
            inner.root = Some(id);
        }
        trace!("registered vertex {vertex} as {identifier}");
        inner.by_value.insert(vertex.clone(), id);
        inner.by_identifier.insert(identifier, id);
        inner.vertices.push(vertex);
        inner.adjacency.push(Vec::new());

        Ok(id)
    }

    /// Add the edge `source -> target`
    ///
    /// Rejects self loops, unknown endpoints, duplicate edges and any edge
    /// that would close a cycle. A rejected edge leaves the graph untouched.
    pub fn add_edge(&self, source: VertexId, target: VertexId) -> Result<()> {
        self.write().add_edge(source, target)
    }

    /// Link `target` below the root. Linking the root itself is a no-op.
    pub fn link_to_root(&self, target: VertexId) -> Result<()> {
        let mut inner = self.write();
        match inner.root {
            Some(root) if root == target => Ok(()),
            Some(root) => inner.add_edge(root, target),
            None => Err(Error::VertexNotFound {
                id: target.to_string(),
                endpoint: Endpoint::Target,
            }),
        }
    }

    /// Add an edge between two vertices looked up by identifier
    pub fn link_by_identifier(&self, source: &str, target: &str) -> Result<()> {
        let mut inner = self.write();
        let source_id = *inner
            .by_identifier
            .get(source)
            .ok_or_else(|| Error::VertexNotFound {
                id: source.to_string(),
                endpoint: Endpoint::Source,
            })?;
        let target_id = *inner
            .by_identifier
            .get(target)
            .ok_or_else(|| Error::VertexNotFound {
                id: target.to_string(),
                endpoint: Endpoint::Target,
            })?;
        inner.add_edge(source_id, target_id)
    }

    /// Whether `target` can be reached from `source` along directed edges
    pub fn reachable(&self, source: VertexId, target: VertexId) -> bool {
        self.write().reachable(source, target)
    }

    /// Whether the edge `source -> target` exists
    pub fn has_edge(&self, source: VertexId, target: VertexId) -> bool {
        self.write().has_edge(source, target)
    }

    /// Look up a vertex handle by identifier
    pub fn lookup(&self, identifier: &str) -> Option<VertexId> {
        self.write().by_identifier.get(identifier).copied()
    }

    /// Value stored for a vertex
    pub fn vertex(&self, id: VertexId) -> Option<T> {
        self.write().vertices.get(id.0).cloned()
    }

    /// The root vertex, if any vertex was added
    pub fn root(&self) -> Option<VertexId> {
        self.write().root
    }

    /// Direct successors of a vertex, in edge insertion order
    pub fn adjacent(&self, id: VertexId) -> Vec<VertexId> {
        self.write()
            .adjacency
            .get(id.0)
            .cloned()
            .unwrap_or_default()
    }

    /// Every edge as `(source, target)`, grouped by source in insertion order
    pub fn edges(&self) -> Vec<(VertexId, VertexId)> {
        let inner = self.write();
        inner
            .adjacency
            .iter()
            .enumerate()
            .flat_map(|(source, targets)| targets.iter().map(move |&t| (VertexId(source), t)))
            .collect()
    }

    /// Number of edges pointing at a vertex
    pub fn in_degree(&self, id: VertexId) -> usize {
        self.write().in_degrees().get(id.0).copied().unwrap_or(0)
    }

    /// A topological order of every vertex
    ///
    /// Uses in-degree elimination; among vertices that are ready at the same
    /// time the one added first goes first, so the order is reproducible.
    pub fn topological_order(&self) -> Result<Vec<VertexId>> {
        self.write().topological_order()
    }

    /// Vertices grouped into frontiers
    ///
    /// Every vertex in a frontier depends only on vertices in earlier
    /// frontiers, so the members of one frontier may run concurrently.
    pub fn frontiers(&self) -> Result<Vec<Vec<VertexId>>> {
        self.write().frontiers()
    }

    /// Call `visit` once per vertex in topological order
    ///
    /// The order and vertex values are captured under the lock; `visit` runs
    /// after it is released, so it may query the graph. The first error
    /// returned by `visit` stops the walk.
    pub fn walk<F, E>(&self, mut visit: F) -> std::result::Result<(), E>
    where
        F: FnMut(VertexId, &T) -> std::result::Result<(), E>,
        E: From<Error>,
    {
        let snapshot: Vec<(VertexId, T)> = {
            let inner = self.write();
            let order = inner.topological_order()?;
            order
                .into_iter()
                .map(|id| (id, inner.vertices[id.0].clone()))
                .collect()
        };

        for (id, vertex) in &snapshot {
            visit(*id, vertex)?;
        }
        Ok(())
    }

    /// Render the graph below `root` as an indented tree
    ///
    /// With `include_duplicates` false, a vertex reachable along several
    /// branches is printed only the first time it is met.
    pub fn print(&self, root: VertexId, include_duplicates: bool) -> Result<String> {
        self.write().print(root, include_duplicates)
    }

    /// Number of vertices
    pub fn vertex_count(&self) -> usize {
        self.read().vertices.len()
    }

    /// Number of edges
    pub fn edge_count(&self) -> usize {
        self.read().edge_count
    }

    /// Whether the graph has no vertices
    pub fn is_empty(&self) -> bool {
        self.read().vertices.is_empty()
    }
}

impl<T> Default for Digraph<T>
where
    T: Clone + Eq + Hash + fmt::Display,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Display for Digraph<T>
where
    T: Clone + Eq + Hash + fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(root) = self.root() else {
            return Ok(());
        };
        match self.print(root, false) {
            Ok(tree) => f.write_str(&tree),
            Err(_) => Ok(()),
        }
    }
}

impl<T> fmt::Debug for Digraph<T>
where
    T: Clone + Eq + Hash + fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.read();
        f.debug_struct("Digraph")
            .field("vertices", &inner.vertices.len())
            .field("edges", &inner.edge_count)
            .field("root", &inner.root)
            .finish()
    }
}

impl<T> Inner<T>
where
    T: fmt::Display,
{
    fn contains(&self, id: VertexId) -> bool {
        id.0 < self.vertices.len()
    }

    fn label(&self, id: VertexId) -> String {
        self.vertices
            .get(id.0)
            .map_or_else(|| id.to_string(), ToString::to_string)
    }

    fn add_edge(&mut self, source: VertexId, target: VertexId) -> Result<()> {
        if source == target {
            return Err(Error::SelfCycle {
                id: self.label(source),
            });
        }
        if !self.contains(source) {
            return Err(Error::VertexNotFound {
                id: source.to_string(),
                endpoint: Endpoint::Source,
            });
        }
        if !self.contains(target) {
            return Err(Error::VertexNotFound {
                id: target.to_string(),
                endpoint: Endpoint::Target,
            });
        }
        if self.has_edge(source, target) {
            return Err(Error::EdgeExists {
                source_id: self.label(source),
                target_id: self.label(target),
            });
        }
        // A path target -> ... -> source means the new edge closes a loop
        if self.reachable(target, source) {
            return Err(Error::CycleDetected {
                source_id: self.label(source),
                target_id: self.label(target),
            });
        }

        self.adjacency[source.0].push(target);
        self.edge_count += 1;
        trace!("added edge {} -> {}", self.label(source), self.label(target));
        Ok(())
    }

    fn has_edge(&self, source: VertexId, target: VertexId) -> bool {
        self.adjacency
            .get(source.0)
            .is_some_and(|targets| targets.contains(&target))
    }

    fn reachable(&self, source: VertexId, target: VertexId) -> bool {
        if !self.contains(source) {
            return false;
        }

        let mut discovered: HashSet<VertexId> = HashSet::new();
        let mut stack = vec![source];

        while let Some(current) = stack.pop() {
            for &next in &self.adjacency[current.0] {
                if next == target {
                    return true;
                }
                if discovered.insert(next) {
                    stack.push(next);
                }
            }
        }

        false
    }

    fn in_degrees(&self) -> Vec<usize> {
        let mut degrees = vec![0; self.vertices.len()];
        for targets in &self.adjacency {
            for target in targets {
                degrees[target.0] += 1;
            }
        }
        degrees
    }

    fn unvisited(&self, seen: &[bool]) -> Error {
        Error::InconsistentOrder {
            unvisited: seen
                .iter()
                .enumerate()
                .filter(|(_, seen)| !**seen)
                .map(|(index, _)| self.label(VertexId(index)))
                .collect(),
        }
    }

    fn topological_order(&self) -> Result<Vec<VertexId>> {
        let mut degrees = self.in_degrees();
        let mut seen = vec![false; self.vertices.len()];
        let mut order = Vec::with_capacity(self.vertices.len());

        // Ordered set: the lowest handle is the earliest inserted
        let mut ready: BTreeSet<VertexId> = (0..self.vertices.len())
            .filter(|&index| degrees[index] == 0)
            .map(VertexId)
            .collect();

        while let Some(current) = ready.pop_first() {
            seen[current.0] = true;
            order.push(current);

            for &next in &self.adjacency[current.0] {
                degrees[next.0] -= 1;
                if degrees[next.0] == 0 {
                    ready.insert(next);
                }
            }
        }

        if order.len() != self.vertices.len() {
            return Err(self.unvisited(&seen));
        }
        Ok(order)
    }

    fn frontiers(&self) -> Result<Vec<Vec<VertexId>>> {
        let mut degrees = self.in_degrees();
        let mut seen = vec![false; self.vertices.len()];
        let mut visited = 0;
        let mut frontiers = Vec::new();

        let mut current: Vec<VertexId> = (0..self.vertices.len())
            .filter(|&index| degrees[index] == 0)
            .map(VertexId)
            .collect();

        while !current.is_empty() {
            let mut next = Vec::new();
            for &vertex in &current {
                seen[vertex.0] = true;
                visited += 1;
                for &successor in &self.adjacency[vertex.0] {
                    degrees[successor.0] -= 1;
                    if degrees[successor.0] == 0 {
                        next.push(successor);
                    }
                }
            }
            next.sort_unstable();
            frontiers.push(std::mem::replace(&mut current, next));
        }

        if visited != self.vertices.len() {
            return Err(self.unvisited(&seen));
        }
        Ok(frontiers)
    }

    fn print(&self, root: VertexId, include_duplicates: bool) -> Result<String> {
        if !self.contains(root) {
            return Err(Error::VertexNotFound {
                id: root.to_string(),
                endpoint: Endpoint::Source,
            });
        }

        let mut tree = String::new();
        let mut printed: HashSet<VertexId> = HashSet::new();
        // (vertex, prefix, whether it is a child subject to elision)
        let mut stack = vec![(root, String::new(), false)];

        while let Some((vertex, prefix, is_child)) = stack.pop() {
            if is_child && !include_duplicates && !printed.insert(vertex) {
                continue;
            }

            let _ = writeln!(tree, "{prefix} - {}", self.vertices[vertex.0]);

            let adjacent = &self.adjacency[vertex.0];
            let last = adjacent.len().saturating_sub(1);
            for (i, &child) in adjacent.iter().enumerate().rev() {
                let child_prefix = if i == last {
                    format!("{prefix}    ")
                } else {
                    format!("{prefix}   |")
                };
                stack.push((child, child_prefix, true));
            }
        }

        Ok(tree)
    }
}
