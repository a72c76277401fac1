//! Pairwise preference store and the topological solver over it.
//!
//! A [`PreferenceGraph`] records "`preferred` must come before `other`"
//! edges for one registry key. [`resolve_order`] turns a candidate list plus
//! those edges into a total order, or reports that the edges among the
//! candidates contain a cycle.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::fmt::Debug;
use std::hash::Hash;

use crate::error::{RegistryError, RegistryResult};

/// Directed preference edges over nodes of type `N`.
///
/// Edges are kept in insertion order and never duplicated. The graph does
/// not track which nodes exist; callers validate endpoints and filter stale
/// edges through the candidate list passed to [`PreferenceGraph::resolve_order`].
#[derive(Debug, Clone)]
pub struct PreferenceGraph<N> {
    edges: Vec<(N, N)>,
}

impl<N> Default for PreferenceGraph<N> {
    fn default() -> Self {
        Self { edges: Vec::new() }
    }
}

impl<N> PreferenceGraph<N>
where
    N: Clone + Eq + Hash + Debug,
{
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `preferred -> other`. Returns `false` if the edge already existed.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidPreference`] if both endpoints are the same node.
    pub fn add_edge(&mut self, preferred: N, other: N) -> RegistryResult<bool> {
        if preferred == other {
            return Err(RegistryError::invalid_preference(format!(
                "cannot prefer {preferred:?} over itself"
            )));
        }
        if self.contains(&preferred, &other) {
            return Ok(false);
        }
        self.edges.push((preferred, other));
        Ok(true)
    }

    /// Removes `preferred -> other`. Returns `false` if there was no such edge.
    pub fn remove_edge(&mut self, preferred: &N, other: &N) -> bool {
        let before = self.edges.len();
        self.edges.retain(|(p, o)| !(p == preferred && o == other));
        self.edges.len() != before
    }

    /// Removes every edge that touches `node`. Returns the number removed.
    pub fn remove_node(&mut self, node: &N) -> usize {
        let before = self.edges.len();
        self.edges.retain(|(p, o)| p != node && o != node);
        before - self.edges.len()
    }

    /// Removes every edge.
    pub fn clear(&mut self) {
        self.edges.clear();
    }

    /// Returns `true` if `preferred -> other` is recorded.
    #[must_use]
    pub fn contains(&self, preferred: &N, other: &N) -> bool {
        self.edges.iter().any(|(p, o)| p == preferred && o == other)
    }

    /// All edges in insertion order.
    #[must_use]
    pub fn edges(&self) -> &[(N, N)] {
        &self.edges
    }

    /// Number of edges.
    #[must_use]
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    /// Returns `true` if there are no edges.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Orders `candidates` consistently with the recorded edges.
    ///
    /// See [`resolve_order`].
    #[must_use]
    pub fn resolve_order(&self, candidates: &[N]) -> Option<Vec<N>> {
        resolve_order(candidates, &self.edges)
    }
}

/// Topologically sorts `candidates` under `edges` (Kahn's algorithm).
///
/// Edges with an endpoint outside `candidates` are dropped before sorting, so
/// stale preferences never block resolution. Among nodes that are free at the
/// same time the one appearing first in `candidates` wins, which makes the
/// result a pure function of the inputs.
///
/// Returns `None` if the edges among the candidates form a cycle, and
/// `Some(vec![])` for an empty candidate list.
#[must_use]
pub fn resolve_order<N>(candidates: &[N], edges: &[(N, N)]) -> Option<Vec<N>>
where
    N: Clone + Eq + Hash,
{
    let mut index: HashMap<&N, usize> = HashMap::with_capacity(candidates.len());
    for (i, node) in candidates.iter().enumerate() {
        index.entry(node).or_insert(i);
    }

    let n = candidates.len();
    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut in_degree = vec![0_usize; n];

    for (preferred, other) in edges {
        let (Some(&from), Some(&to)) = (index.get(preferred), index.get(other)) else {
            continue;
        };
        if from == to || successors[from].contains(&to) {
            continue;
        }
        successors[from].push(to);
        in_degree[to] += 1;
    }

    // Duplicate candidates collapse onto their first occurrence.
    let live: Vec<bool> = candidates
        .iter()
        .enumerate()
        .map(|(i, node)| index.get(node) == Some(&i))
        .collect();
    let live_count = live.iter().filter(|l| **l).count();

    let mut ready: BinaryHeap<Reverse<usize>> = (0..n)
        .filter(|&i| live[i] && in_degree[i] == 0)
        .map(Reverse)
        .collect();

    let mut order = Vec::with_capacity(live_count);
    while let Some(Reverse(next)) = ready.pop() {
        order.push(candidates[next].clone());
        for &succ in &successors[next] {
            in_degree[succ] -= 1;
            if in_degree[succ] == 0 {
                ready.push(Reverse(succ));
            }
        }
    }

    if order.len() == live_count {
        Some(order)
    } else {
        tracing::trace!(
            candidates = live_count,
            unresolved = live_count - order.len(),
            "preference cycle"
        );
        None
    }
}
