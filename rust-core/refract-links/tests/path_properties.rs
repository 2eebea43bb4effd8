// SPDX-License-Identifier: PMPL-1.0-or-later
//! Property-based tests for shortest-path resolution.

use proptest::prelude::*;
use refract_links::{Relationship, RelationshipGraph};

fn index_name(i: usize) -> String {
    format!("idx_{i}")
}

/// Random undirected edge lists over a small index universe.
fn arb_edges() -> impl Strategy<Value = Vec<(usize, usize)>> {
    prop::collection::vec((0usize..6, 0usize..6), 1..15)
}

fn build(edges: &[(usize, usize)]) -> RelationshipGraph {
    let mut graph = RelationshipGraph::new();
    for (n, (a, b)) in edges.iter().enumerate() {
        graph.add(Relationship {
            left_index: index_name(*a),
            left_field: format!("lf_{n}"),
            right_index: index_name(*b),
            right_field: format!("rf_{n}"),
        });
    }
    graph
}

proptest! {
    /// path(A,B) must be path(B,A) reversed with every edge flipped.
    #[test]
    fn test_path_symmetry(edges in arb_edges(), a in 0usize..6, b in 0usize..6) {
        let graph = build(&edges);
        let (from, to) = (index_name(a), index_name(b));

        let forward = graph.shortest_path(&from, &to);
        let backward = graph.shortest_path(&to, &from);

        match (forward, backward) {
            (Ok(fwd), Ok(bwd)) => {
                let mut expectation: Vec<Relationship> =
                    fwd.iter().map(Relationship::flipped).collect();
                expectation.reverse();
                prop_assert_eq!(bwd, expectation);
            }
            (Err(_), Err(_)) => {} // disconnected both ways
            (fwd, bwd) => {
                return Err(TestCaseError::fail(format!(
                    "asymmetric reachability: {fwd:?} vs {bwd:?}"
                )));
            }
        }
    }

    /// A resolved path never revisits an index, so its length is bounded
    /// by the universe size.
    #[test]
    fn test_path_is_simple(edges in arb_edges(), a in 0usize..6, b in 0usize..6) {
        let graph = build(&edges);
        if let Ok(path) = graph.shortest_path(&index_name(a), &index_name(b)) {
            prop_assert!(path.len() < 6);

            let mut seen = std::collections::HashSet::new();
            for edge in &path {
                prop_assert!(seen.insert(edge.left_index.clone()));
            }
        }
    }

    /// Each consecutive pair of path edges shares the intermediate index.
    #[test]
    fn test_path_is_connected(edges in arb_edges(), a in 0usize..6, b in 0usize..6) {
        let graph = build(&edges);
        let (from, to) = (index_name(a), index_name(b));
        if let Ok(path) = graph.shortest_path(&from, &to) {
            if path.is_empty() {
                prop_assert_eq!(from, to);
                return Ok(());
            }
            prop_assert_eq!(&path[0].left_index, &from);
            prop_assert_eq!(&path[path.len() - 1].right_index, &to);
            for pair in path.windows(2) {
                prop_assert_eq!(&pair[0].right_index, &pair[1].left_index);
            }
        }
    }
}
