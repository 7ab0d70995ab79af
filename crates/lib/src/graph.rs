//! In-session dependency graph.
//!
//! Records every build item touched during a session together with two kinds
//! of edges between fingerprints:
//!
//! - `Nested`: the parent built the child while it ran (kept for the session)
//! - `Waiting`: the parent is currently suspended on the child (removed when the
//!   wait ends)
//!
//! Adding a `Waiting` edge that would close a loop means the requesters can
//! never make progress, so it is refused with `CircularDependency` instead.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use petgraph::Direction;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;

use crate::build::Fingerprint;
use crate::error::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
  Nested,
  Waiting,
}

/// Lifecycle of a build item within a session.
#[derive(Debug, Clone)]
pub enum ItemState {
  Pending,
  /// Plugins ran and produced the artifact.
  Built,
  /// Reused from the persistent cache without running plugins.
  Cached,
  Failed(PipelineError),
}

impl ItemState {
  pub fn is_terminal(&self) -> bool {
    !matches!(self, ItemState::Pending)
  }
}

#[derive(Debug, Clone)]
pub struct ItemRecord {
  pub fingerprint: Fingerprint,
  pub asset: String,
  pub state: ItemState,
  pub artifact: Option<PathBuf>,
  pub dependencies: Vec<PathBuf>,
  pub outputs: Vec<PathBuf>,
  pub warnings: Vec<String>,
}

#[derive(Default)]
pub struct DependencyGraph {
  graph: StableDiGraph<Fingerprint, EdgeKind>,
  nodes: HashMap<Fingerprint, NodeIndex>,
  items: HashMap<Fingerprint, ItemRecord>,
}

impl DependencyGraph {
  pub fn new() -> Self {
    Self::default()
  }

  fn node(&mut self, fingerprint: &Fingerprint) -> NodeIndex {
    if let Some(idx) = self.nodes.get(fingerprint) {
      return *idx;
    }
    let idx = self.graph.add_node(fingerprint.clone());
    self.nodes.insert(fingerprint.clone(), idx);
    idx
  }

  /// Register an item as pending. Existing records are left untouched.
  pub fn begin(&mut self, fingerprint: &Fingerprint, asset: &str) {
    self.node(fingerprint);
    self.items.entry(fingerprint.clone()).or_insert_with(|| ItemRecord {
      fingerprint: fingerprint.clone(),
      asset: asset.to_string(),
      state: ItemState::Pending,
      artifact: None,
      dependencies: Vec::new(),
      outputs: Vec::new(),
      warnings: Vec::new(),
    });
  }

  /// Move an item to a terminal state.
  pub fn finish(&mut self, fingerprint: &Fingerprint, state: ItemState) {
    if let Some(record) = self.items.get_mut(fingerprint) {
      record.state = state;
    }
  }

  pub fn item(&self, fingerprint: &Fingerprint) -> Option<&ItemRecord> {
    self.items.get(fingerprint)
  }

  pub fn item_mut(&mut self, fingerprint: &Fingerprint) -> Option<&mut ItemRecord> {
    self.items.get_mut(fingerprint)
  }

  /// All items, ordered by asset name.
  pub fn items(&self) -> Vec<ItemRecord> {
    let mut items: Vec<ItemRecord> = self.items.values().cloned().collect();
    items.sort_by(|a, b| a.asset.cmp(&b.asset).then_with(|| a.fingerprint.cmp(&b.fingerprint)));
    items
  }

  /// Record that `parent` built `child`.
  pub fn add_nested(&mut self, parent: &Fingerprint, child: &Fingerprint) {
    let from = self.node(parent);
    let to = self.node(child);
    let exists = self
      .graph
      .edges_connecting(from, to)
      .any(|e| *e.weight() == EdgeKind::Nested);
    if !exists {
      self.graph.add_edge(from, to, EdgeKind::Nested);
    }
  }

  /// Record that `waiter` is about to suspend until `target` completes.
  ///
  /// Fails with `CircularDependency` when `target` is already (transitively)
  /// waiting on `waiter`; the edge is not added in that case.
  pub fn add_wait(&mut self, waiter: &Fingerprint, target: &Fingerprint) -> Result<(), PipelineError> {
    let from = self.node(waiter);
    let to = self.node(target);

    let cycle = if from == to {
      Some(vec![from, to])
    } else {
      self.path(to, from, EdgeKind::Waiting).map(|mut path| {
        path.insert(0, from);
        path
      })
    };

    if let Some(path) = cycle {
      return Err(PipelineError::CircularDependency {
        chain: path.into_iter().map(|idx| self.label(idx)).collect(),
      });
    }

    self.graph.add_edge(from, to, EdgeKind::Waiting);
    Ok(())
  }

  /// Remove one `Waiting` edge from `waiter` to `target`.
  pub fn remove_wait(&mut self, waiter: &Fingerprint, target: &Fingerprint) {
    let (Some(&from), Some(&to)) = (self.nodes.get(waiter), self.nodes.get(target)) else {
      return;
    };
    let edge = self
      .graph
      .edges_connecting(from, to)
      .find(|e| *e.weight() == EdgeKind::Waiting)
      .map(|e| e.id());
    if let Some(edge) = edge {
      self.graph.remove_edge(edge);
    }
  }

  /// Items that built `fingerprint`, directly or transitively.
  pub fn dependents(&self, fingerprint: &Fingerprint) -> Vec<Fingerprint> {
    let Some(&start) = self.nodes.get(fingerprint) else {
      return Vec::new();
    };
    let mut seen = HashSet::new();
    let mut stack = vec![start];
    let mut result = Vec::new();

    while let Some(idx) = stack.pop() {
      for edge in self.graph.edges_directed(idx, Direction::Incoming) {
        if *edge.weight() == EdgeKind::Nested && seen.insert(edge.source()) {
          result.push(self.graph[edge.source()].clone());
          stack.push(edge.source());
        }
      }
    }

    result.sort();
    result
  }

  /// Items `fingerprint` built directly.
  pub fn nested(&self, fingerprint: &Fingerprint) -> Vec<Fingerprint> {
    let Some(&idx) = self.nodes.get(fingerprint) else {
      return Vec::new();
    };
    let mut children: Vec<Fingerprint> = self
      .graph
      .edges_directed(idx, Direction::Outgoing)
      .filter(|e| *e.weight() == EdgeKind::Nested)
      .map(|e| self.graph[e.target()].clone())
      .collect();
    children.sort();
    children.dedup();
    children
  }

  /// Depth-first path from `from` to `to` following only `kind` edges.
  fn path(&self, from: NodeIndex, to: NodeIndex, kind: EdgeKind) -> Option<Vec<NodeIndex>> {
    let mut visited = HashSet::new();
    let mut path = vec![from];
    if self.dfs(from, to, kind, &mut visited, &mut path) {
      Some(path)
    } else {
      None
    }
  }

  fn dfs(
    &self,
    current: NodeIndex,
    to: NodeIndex,
    kind: EdgeKind,
    visited: &mut HashSet<NodeIndex>,
    path: &mut Vec<NodeIndex>,
  ) -> bool {
    if current == to {
      return true;
    }
    if !visited.insert(current) {
      return false;
    }
    for edge in self.graph.edges_directed(current, Direction::Outgoing) {
      if *edge.weight() != kind {
        continue;
      }
      path.push(edge.target());
      if self.dfs(edge.target(), to, kind, visited, path) {
        return true;
      }
      path.pop();
    }
    false
  }

  fn label(&self, idx: NodeIndex) -> String {
    let fingerprint = &self.graph[idx];
    self
      .items
      .get(fingerprint)
      .map(|r| r.asset.clone())
      .unwrap_or_else(|| fingerprint.to_string())
  }
}
