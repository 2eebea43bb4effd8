// SPDX-License-Identifier: PMPL-1.0-or-later
//! Declared relationship graph between indices.
//!
//! Built once per rewrite from the query's `#options` declarations, then
//! queried repeatedly during expansion injection. The graph is an
//! undirected multigraph over index names; shortest paths are resolved with
//! unit-weight Dijkstra, ties broken by declaration order.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use refract_ast::{IndexLink, LinkDecl};
use tracing::trace;

use crate::LinkError;

/// One declared edge: a field in one index maps onto a field in another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    pub left_index: String,
    pub left_field: String,
    pub right_index: String,
    pub right_field: String,
}

impl Relationship {
    /// The same edge traversed in the opposite direction.
    pub fn flipped(&self) -> Relationship {
        Relationship {
            left_index: self.right_index.clone(),
            left_field: self.right_field.clone(),
            right_index: self.left_index.clone(),
            right_field: self.left_field.clone(),
        }
    }

    /// The [`IndexLink`] for traversing this edge left-to-right.
    pub fn to_link(&self) -> IndexLink {
        IndexLink {
            alias: None,
            index_name: self.right_index.clone(),
            left_field: Some(self.left_field.clone()),
            right_field: self.right_field.clone(),
        }
    }
}

/// Undirected multigraph of declared relationships.
#[derive(Debug, Clone, Default)]
pub struct RelationshipGraph {
    edges: Vec<Relationship>,
    adjacency: HashMap<String, Vec<usize>>,
}

impl RelationshipGraph {
    pub fn new() -> Self {
        RelationshipGraph::default()
    }

    /// Build the graph from `#options` declarations against `root`.
    ///
    /// A declaration's left field normally belongs to the root index; an
    /// alias-qualified left field (`alias.field`) chains off the index a
    /// previous declaration bound to that alias.
    pub fn from_decls(root: &IndexLink, decls: &[LinkDecl]) -> Self {
        let mut graph = RelationshipGraph::new();
        let mut aliases: HashMap<&str, &str> = HashMap::new();
        for decl in decls {
            let (left_index, left_field) = match decl.left_field.split_once('.') {
                Some((alias, field)) if aliases.contains_key(alias) => {
                    (aliases[alias].to_string(), field.to_string())
                }
                _ => (root.index_name.clone(), decl.left_field.clone()),
            };
            graph.add(Relationship {
                left_index,
                left_field,
                right_index: decl.index_name.clone(),
                right_field: decl.right_field.clone(),
            });
            if let Some(alias) = &decl.alias {
                aliases.insert(alias.as_str(), decl.index_name.as_str());
            }
        }
        graph
    }

    /// Append an edge; declaration order is the tie-break order.
    pub fn add(&mut self, edge: Relationship) {
        let idx = self.edges.len();
        self.adjacency
            .entry(edge.left_index.clone())
            .or_default()
            .push(idx);
        self.adjacency
            .entry(edge.right_index.clone())
            .or_default()
            .push(idx);
        self.edges.push(edge);
    }

    pub fn contains(&self, index: &str) -> bool {
        self.adjacency.contains_key(index)
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Ordered edge sequence connecting `from` to `to`, oriented so each
    /// edge's left side faces the source. Empty when `from == to`.
    ///
    /// Disconnected endpoints are a configuration error (a missing
    /// `#options` relationship), surfaced as [`LinkError::NoPath`].
    pub fn shortest_path(&self, from: &str, to: &str) -> Result<Vec<Relationship>, LinkError> {
        if from == to {
            return Ok(Vec::new());
        }
        if !self.contains(from) {
            return Err(LinkError::UnknownIndex(from.to_string()));
        }
        if !self.contains(to) {
            return Err(LinkError::UnknownIndex(to.to_string()));
        }

        let mut dist: HashMap<&str, usize> = HashMap::new();
        let mut prev: HashMap<&str, (usize, &str)> = HashMap::new();
        let mut heap: BinaryHeap<Reverse<(usize, usize, &str)>> = BinaryHeap::new();
        let mut seq = 0usize;

        dist.insert(from, 0);
        heap.push(Reverse((0, seq, from)));

        while let Some(Reverse((d, _, node))) = heap.pop() {
            if d > dist[node] {
                continue;
            }
            if node == to {
                break;
            }
            for &edge_idx in self.adjacency.get(node).into_iter().flatten() {
                let edge = &self.edges[edge_idx];
                let neighbor: &str = if edge.left_index == node {
                    &edge.right_index
                } else {
                    &edge.left_index
                };
                let next = d + 1;
                if next < dist.get(neighbor).copied().unwrap_or(usize::MAX) {
                    dist.insert(neighbor, next);
                    prev.insert(neighbor, (edge_idx, node));
                    seq += 1;
                    heap.push(Reverse((next, seq, neighbor)));
                }
            }
        }

        if !prev.contains_key(to) {
            return Err(LinkError::NoPath {
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        let mut path = Vec::new();
        let mut cursor = to;
        while cursor != from {
            let (edge_idx, came_from) = prev[cursor];
            let edge = &self.edges[edge_idx];
            let oriented = if edge.left_index == came_from {
                edge.clone()
            } else {
                edge.flipped()
            };
            path.push(oriented);
            cursor = came_from;
        }
        path.reverse();
        trace!(from, to, hops = path.len(), "resolved relationship path");
        Ok(path)
    }
}
