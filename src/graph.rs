//! Dependency graph with Kahn's topological sort.
//!
//! Edges point from a dependency to its dependent (`param -> func`,
//! `func -> output`). Nodes are numbered in the order they are first declared;
//! when several nodes are ready at once the earliest declared one is emitted
//! first, so the build order is stable for a fixed registration order.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

use crate::address::Address;
use crate::error::{DiError, DiResult};

/// Result of [`Graph::build`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildOrder {
    /// Nodes in dependency order (dependencies strictly first).
    pub order: Vec<Address>,
    /// Nodes downstream of a break point, left for later invocation.
    pub deferred: Vec<Address>,
}

/// Dependency graph keyed by [`Address`].
#[derive(Debug, Default)]
pub struct Graph {
    nodes: Vec<Address>,
    index: HashMap<Address, usize>,
    successors: Vec<Vec<usize>>,
    edges: HashSet<(usize, usize)>,
    break_points: HashSet<usize>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a node without edges. Returns its index.
    pub fn declare(&mut self, address: &Address) -> usize {
        if let Some(&i) = self.index.get(address) {
            return i;
        }
        let i = self.nodes.len();
        self.nodes.push(address.clone());
        self.index.insert(address.clone(), i);
        self.successors.push(Vec::new());
        i
    }

    /// Adds the edge `from -> to`. Adding the same edge twice is a no-op.
    pub fn add(&mut self, from: &Address, to: &Address) {
        let f = self.declare(from);
        let t = self.declare(to);
        if self.edges.insert((f, t)) {
            self.successors[f].push(t);
        }
    }

    /// Marks `address` as terminal.
    ///
    /// The node's own dependencies are still ordered before it, but its
    /// outgoing edges are never released: everything downstream ends up in
    /// [`BuildOrder::deferred`] instead of the build order.
    pub fn break_point(&mut self, address: &Address) {
        let i = self.declare(address);
        self.break_points.insert(i);
    }

    pub fn is_break_point(&self, address: &Address) -> bool {
        self.index
            .get(address)
            .is_some_and(|i| self.break_points.contains(i))
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.index.contains_key(address)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes in declaration order.
    pub fn nodes(&self) -> &[Address] {
        &self.nodes
    }

    /// All edges, grouped by source in declaration order.
    pub fn edges(&self) -> Vec<(Address, Address)> {
        let mut out = Vec::with_capacity(self.edges.len());
        for (from, succ) in self.successors.iter().enumerate() {
            for &to in succ {
                out.push((self.nodes[from].clone(), self.nodes[to].clone()));
            }
        }
        out
    }

    /// Direct dependencies of `address` (sources of its incoming edges).
    pub fn dependencies_of(&self, address: &Address) -> Vec<Address> {
        let Some(&target) = self.index.get(address) else {
            return Vec::new();
        };
        self.successors
            .iter()
            .enumerate()
            .filter(|(_, succ)| succ.contains(&target))
            .map(|(from, _)| self.nodes[from].clone())
            .collect()
    }

    /// Topologically sorts the graph.
    ///
    /// Fails with [`DiError::Cycle`] naming the nodes that sit on a cycle,
    /// including cycles downstream of a break point.
    pub fn build(&self) -> DiResult<BuildOrder> {
        let (order, emitted) = self.release(true);
        if order.len() == self.nodes.len() {
            return Ok(BuildOrder { order, deferred: Vec::new() });
        }

        // Release break points too: whatever is still stuck is on a cycle.
        let (_, reachable) = self.release(false);
        let stuck: Vec<Address> = (0..self.nodes.len())
            .filter(|&i| !reachable[i])
            .map(|i| self.nodes[i].clone())
            .collect();
        if !stuck.is_empty() {
            return Err(DiError::Cycle(stuck));
        }

        let deferred = (0..self.nodes.len())
            .filter(|&i| !emitted[i])
            .map(|i| self.nodes[i].clone())
            .collect();
        Ok(BuildOrder { order, deferred })
    }

    /// One Kahn pass. With `hold_break_points`, the outgoing edges of break
    /// points are never released.
    fn release(&self, hold_break_points: bool) -> (Vec<Address>, Vec<bool>) {
        let n = self.nodes.len();
        let mut in_degree = vec![0usize; n];
        for succ in &self.successors {
            for &to in succ {
                in_degree[to] += 1;
            }
        }

        let mut ready: BinaryHeap<Reverse<usize>> = (0..n)
            .filter(|&i| in_degree[i] == 0)
            .map(Reverse)
            .collect();
        let mut emitted = vec![false; n];
        let mut order = Vec::with_capacity(n);

        while let Some(Reverse(current)) = ready.pop() {
            emitted[current] = true;
            order.push(self.nodes[current].clone());
            if hold_break_points && self.break_points.contains(&current) {
                continue;
            }
            for &next in &self.successors[current] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    ready.push(Reverse(next));
                }
            }
        }
        (order, emitted)
    }
}
