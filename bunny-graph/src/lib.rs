//! Deterministic directed acyclic graph (DAG) for build-plan nodes.
//!
//! The graph is the storage layer underneath the operation graphs produced
//! while packaging unikernel images. Two graphs built from the same inputs in
//! the same order are structurally identical: node identifiers are dense
//! indices, neighbour sets are ordered and the topological order breaks ties
//! by insertion order, so serialized graphs compare byte for byte.
//!
//! # Features
//!
//! - Generic nodes and edges with type parameters
//! - Deterministic topological sorting using Kahn's algorithm
//! - Cycle refusal on edge insertion
//! - Optional serde support
//!
//! # Example
//!
//! ```
//! use bunny_graph::DAG;
//!
//! let mut dag = DAG::<&str, usize>::new();
//!
//! let image = dag.add_node("image");
//! let mkdir = dag.add_node("mkdir /tmp");
//! let exec = dag.add_node("exec");
//!
//! dag.add_edge(image, mkdir, 0).unwrap();
//! dag.add_edge(mkdir, exec, 0).unwrap();
//!
//! assert_eq!(dag.topological_sort().unwrap(), vec![image, mkdir, exec]);
//! assert!(dag.add_edge(exec, image, 0).is_err());
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![warn(unused_results)]

use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashSet, VecDeque};
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Node identifier in the DAG.
///
/// Identifiers are handed out densely in insertion order, so they double as
/// a stable ordering key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NodeId(usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node({})", self.0)
    }
}

/// Error types for DAG operations.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// Cycle detected in the graph
    #[error("Cycle detected in graph: {0}")]
    CycleDetected(String),

    /// Node not found
    #[error("Node {0} not found in graph")]
    NodeNotFound(NodeId),
}

/// Result type for DAG operations.
pub type GraphResult<T> = Result<T, GraphError>;

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
struct Node<N> {
    data: N,
    outgoing: BTreeSet<NodeId>,
    incoming: BTreeSet<NodeId>,
}

/// An edge in the DAG, `from` must be materialized before `to`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Edge<E> {
    /// Upstream node
    pub from: NodeId,
    /// Downstream node
    pub to: NodeId,
    /// Payload carried by the edge
    pub data: E,
}

/// Generic directed acyclic graph (DAG).
///
/// Parallel edges between the same pair of nodes are allowed and kept in
/// insertion order; an operation may consume the same upstream output twice.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DAG<N, E> {
    nodes: Vec<Node<N>>,
    edges: Vec<Edge<E>>,
}

impl<N, E> Default for DAG<N, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N, E> DAG<N, E> {
    /// Create a new empty DAG.
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    /// Add a node to the graph and return its ID.
    pub fn add_node(&mut self, data: N) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            data,
            outgoing: BTreeSet::new(),
            incoming: BTreeSet::new(),
        });
        id
    }

    /// Add a directed edge from `from` to `to` with associated data.
    ///
    /// # Errors
    ///
    /// - `GraphError::NodeNotFound` if either node doesn't exist
    /// - `GraphError::CycleDetected` if adding the edge would create a cycle
    pub fn add_edge(&mut self, from: NodeId, to: NodeId, data: E) -> GraphResult<()> {
        if !self.contains(from) {
            return Err(GraphError::NodeNotFound(from));
        }
        if !self.contains(to) {
            return Err(GraphError::NodeNotFound(to));
        }

        if self.can_reach(to, from) {
            return Err(GraphError::CycleDetected(format!(
                "Adding edge {from} -> {to} would create a cycle"
            )));
        }

        self.edges.push(Edge { from, to, data });
        let _ = self.nodes[from.0].outgoing.insert(to);
        let _ = self.nodes[to.0].incoming.insert(from);

        Ok(())
    }

    /// Whether `id` belongs to this graph.
    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        id.0 < self.nodes.len()
    }

    fn can_reach(&self, start: NodeId, end: NodeId) -> bool {
        if start == end {
            return true;
        }

        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([start]);

        while let Some(current) = queue.pop_front() {
            if current == end {
                return true;
            }
            if !visited.insert(current) {
                continue;
            }
            for &neighbor in &self.nodes[current.0].outgoing {
                if !visited.contains(&neighbor) {
                    queue.push_back(neighbor);
                }
            }
        }

        false
    }

    /// Get a reference to a node's data.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::NodeNotFound` if the node doesn't exist.
    pub fn node(&self, id: NodeId) -> GraphResult<&N> {
        self.nodes
            .get(id.0)
            .map(|node| &node.data)
            .ok_or(GraphError::NodeNotFound(id))
    }

    /// Get the number of nodes in the graph.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Get the number of edges in the graph.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// All edges in insertion order.
    #[must_use]
    pub fn edges(&self) -> &[Edge<E>] {
        &self.edges
    }

    /// Perform topological sort using Kahn's algorithm.
    ///
    /// Returns nodes in dependency order. Among nodes that are ready at the
    /// same time the one inserted first comes first, so the order only
    /// depends on how the graph was built.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::CycleDetected` if the graph contains a cycle.
    pub fn topological_sort(&self) -> GraphResult<Vec<NodeId>> {
        let mut in_degree: Vec<usize> = self.nodes.iter().map(|n| n.incoming.len()).collect();

        let mut ready: BinaryHeap<Reverse<NodeId>> = in_degree
            .iter()
            .enumerate()
            .filter(|&(_, &degree)| degree == 0)
            .map(|(index, _)| Reverse(NodeId(index)))
            .collect();

        let mut result = Vec::with_capacity(self.nodes.len());

        while let Some(Reverse(node_id)) = ready.pop() {
            result.push(node_id);

            for &neighbor in &self.nodes[node_id.0].outgoing {
                let degree = &mut in_degree[neighbor.0];
                *degree -= 1;
                if *degree == 0 {
                    ready.push(Reverse(neighbor));
                }
            }
        }

        if result.len() == self.nodes.len() {
            Ok(result)
        } else {
            Err(GraphError::CycleDetected(
                "Graph contains a cycle".to_string(),
            ))
        }
    }
}
