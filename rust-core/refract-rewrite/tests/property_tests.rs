// SPDX-License-Identifier: PMPL-1.0-or-later
//! Property-based tests for the optimizer passes.

use proptest::prelude::*;
use refract_ast::{Node, NodeId, NodeKind, Operator, Tree};
use refract_links::{FieldType, IndexDef, StaticMetadata};
use refract_rewrite::{assign, optimizer};

fn metadata() -> StaticMetadata {
    StaticMetadata::new(
        IndexDef::new("db.public.posts.idx_posts", "id")
            .with_field("f0", FieldType::Text)
            .with_field("f1", FieldType::Text)
            .with_field("f2", FieldType::Text),
    )
}

/// Abstract tree shapes: random And/Or groups over a few fields.
#[derive(Debug, Clone)]
enum Shape {
    Word(u8, u8),
    Group(bool, Vec<Shape>),
}

fn arb_shape() -> impl Strategy<Value = Shape> {
    let leaf = (0u8..3, 0u8..5).prop_map(|(f, v)| Shape::Word(f, v));
    leaf.prop_recursive(4, 48, 5, |inner| {
        (any::<bool>(), prop::collection::vec(inner, 0..5))
            .prop_map(|(and, children)| Shape::Group(and, children))
    })
}

fn materialize(shape: &Shape, tree: &mut Tree) -> NodeId {
    match shape {
        Shape::Word(f, v) => tree.add(
            Node::new(NodeKind::Word(format!("v{v}"))).with_field(format!("f{f}")),
        ),
        Shape::Group(and, children) => {
            let kind = if *and { NodeKind::And } else { NodeKind::Or };
            let group = tree.add(Node::new(kind));
            for child in children {
                let id = materialize(child, tree);
                let _ = tree.push_child(group, id);
            }
            group
        }
    }
}

/// Structural fingerprint of the reachable tree.
fn fingerprint(tree: &Tree, id: NodeId) -> String {
    let node = &tree[id];
    let mut out = node.kind.name().to_string();
    if let Some(value) = node.kind.value_str() {
        out.push(':');
        out.push_str(value);
    }
    if !node.children().is_empty() {
        out.push('(');
        let parts: Vec<String> = node
            .children()
            .iter()
            .map(|&c| fingerprint(tree, c))
            .collect();
        out.push_str(&parts.join(","));
        out.push(')');
    }
    out
}

proptest! {
    /// Applying Reduce twice yields the same tree as applying it once.
    #[test]
    fn test_reduce_is_idempotent(shape in arb_shape()) {
        let mut tree = Tree::new();
        let root = tree.add(Node::new(NodeKind::And));
        let body = materialize(&shape, &mut tree);
        let _ = tree.push_child(root, body);

        optimizer::reduce(&mut tree, root);
        let once = fingerprint(&tree, root);
        optimizer::reduce(&mut tree, root);
        prop_assert_eq!(fingerprint(&tree, root), once);
    }

    /// After Reduce, no reachable And/Or has zero or one children.
    #[test]
    fn test_reduce_leaves_no_degenerate_groups(shape in arb_shape()) {
        let mut tree = Tree::new();
        let root = tree.add(Node::new(NodeKind::And));
        let body = materialize(&shape, &mut tree);
        let _ = tree.push_child(root, body);

        optimizer::reduce(&mut tree, root);
        for id in tree.descendants(root) {
            if id == root {
                continue;
            }
            if matches!(tree[id].kind, NodeKind::And | NodeKind::Or) {
                prop_assert!(tree[id].children().len() >= 2);
            }
        }
    }

    /// The merge/rollup fixpoint terminates with a non-increasing node
    /// count and a second run is a no-op.
    #[test]
    fn test_fixpoint_is_monotonic_and_stable(shape in arb_shape()) {
        let mut tree = Tree::new();
        let root = tree.add(Node::new(NodeKind::And));
        let body = materialize(&shape, &mut tree);
        let _ = tree.push_child(root, body);

        let before = tree.node_count(root);
        assign::merge_rollup_fixpoint(&mut tree, root).unwrap();
        let after = tree.node_count(root);
        prop_assert!(after <= before);

        assign::merge_rollup_fixpoint(&mut tree, root).unwrap();
        prop_assert_eq!(tree.node_count(root), after);
    }

    /// Rollup never changes the set of reachable leaves.
    #[test]
    fn test_rollup_preserves_leaves(shape in arb_shape()) {
        let mut tree = Tree::new();
        let root = tree.add(Node::new(NodeKind::And));
        let body = materialize(&shape, &mut tree);
        let _ = tree.push_child(root, body);

        let leaves_of = |tree: &Tree| {
            let mut leaves: Vec<String> = tree
                .descendants(root)
                .into_iter()
                .filter(|&id| tree[id].kind.is_predicate())
                .map(|id| fingerprint(tree, id))
                .collect();
            leaves.sort();
            leaves
        };

        let before = leaves_of(&tree);
        optimizer::rollup_groups(&mut tree, root);
        prop_assert_eq!(leaves_of(&tree), before);
    }

    /// Same-field literal runs merge into one Array whose `and` flag is
    /// (parent conjunctive) XOR (operator NE).
    #[test]
    fn test_literal_merge_flag_formula(
        parent_and in any::<bool>(),
        negated in any::<bool>(),
        count in 2usize..6,
    ) {
        let md = metadata();
        let mut tree = Tree::new();
        let kind = if parent_and { NodeKind::And } else { NodeKind::Or };
        let root = tree.add(Node::new(kind));
        let operator = if negated { Operator::Ne } else { Operator::Eq };
        for i in 0..count {
            tree.add_child(
                root,
                Node::new(NodeKind::Word(format!("v{i}")))
                    .with_field("f0")
                    .with_operator(operator),
            );
        }

        optimizer::merge_literals(&mut tree, root, &md);

        prop_assert_eq!(tree[root].children().len(), 1);
        let array = tree[root].children()[0];
        match tree[array].kind {
            NodeKind::Array { and } => {
                prop_assert_eq!(and, parent_and ^ negated);
            }
            ref other => {
                return Err(TestCaseError::fail(format!(
                    "expected Array, got {}",
                    other.name()
                )));
            }
        }
        prop_assert_eq!(tree[array].children().len(), count);
    }
}
