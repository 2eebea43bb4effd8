// SPDX-License-Identifier: PMPL-1.0-or-later
//! Generic tree optimization passes.
//!
//! The passes run in a fixed order (see [`crate::QueryRewriter`]) and each
//! one is a standalone function over the arena tree. Any violated
//! invariant aborts the whole compilation; there is no partial output.

use refract_ast::{IndexLink, Node, NodeId, NodeKind, Operator, Tree};
use refract_links::IndexMetadata;
use tracing::debug;

use crate::error::RewriteError;

/// Containers the literal-merge and array-merge passes recurse into.
/// Arrays themselves are never descended into.
fn is_container(kind: &NodeKind) -> bool {
    matches!(
        kind,
        NodeKind::And
            | NodeKind::Or
            | NodeKind::Not
            | NodeKind::With
            | NodeKind::Expansion { .. }
            | NodeKind::Bool
            | NodeKind::Must
            | NodeKind::Should
            | NodeKind::MustNot
    )
}

/// Pass 1: hoist directive nodes (limit, visibility, aggregates, suggest,
/// options, field lists) to the front of the tree in first-seen order.
pub fn pull_directives(tree: &mut Tree, root: NodeId) {
    let directives: Vec<NodeId> = tree
        .descendants(root)
        .into_iter()
        .filter(|&id| id != root && tree[id].kind.is_directive())
        .collect();
    for &id in &directives {
        tree.detach(id);
    }
    for (pos, &id) in directives.iter().enumerate() {
        // directives are detached above, so reinsertion cannot fail
        let _ = tree.insert_child(root, pos, id);
    }
}

/// Every aggregate/suggest directive must resolve to one target index.
pub fn validate_aggregate_targets(
    tree: &Tree,
    root: NodeId,
    metadata: &dyn IndexMetadata,
) -> Result<(), RewriteError> {
    let mut target: Option<IndexLink> = None;
    for id in tree.descendants(root) {
        if !matches!(
            tree[id].kind,
            NodeKind::Aggregate { .. } | NodeKind::Suggest { .. }
        ) {
            continue;
        }
        let Some(field) = tree[id].fieldname.as_deref() else {
            continue;
        };
        let Some(link) = metadata.resolve_field(field) else {
            continue;
        };
        match &target {
            None => target = Some(link),
            Some(existing) if *existing == link => {}
            Some(existing) => {
                return Err(RewriteError::configuration(format!(
                    "ambiguous aggregate target index: '{}' vs '{}'",
                    existing.index_name, link.index_name
                )));
            }
        }
    }
    Ok(())
}

/// Pass 2: every `With` group's predicates must share one nested path.
pub fn validate_with_groups(
    tree: &Tree,
    root: NodeId,
    metadata: &dyn IndexMetadata,
) -> Result<(), RewriteError> {
    for id in tree.descendants(root) {
        if !matches!(tree[id].kind, NodeKind::With) {
            continue;
        }
        let mut expected: Option<String> = None;
        for leaf in tree.descendants(id) {
            if !tree[leaf].kind.is_predicate() {
                continue;
            }
            let Some(field) = tree[leaf].fieldname.as_deref() else {
                continue;
            };
            let Some(path) = metadata.nested_path(field) else {
                return Err(RewriteError::structure(format!(
                    "field '{field}' in a WITH group is not part of a nested mapping"
                )));
            };
            match &expected {
                None => expected = Some(path),
                Some(p) if *p == path => {}
                Some(p) => {
                    return Err(RewriteError::structure(format!(
                        "WITH group mixes nested paths '{p}' and '{path}'"
                    )));
                }
            }
        }
    }
    Ok(())
}

/// Pass 3 (and 9): delete empty And/Or groups and collapse single-child
/// ones into the child, bottom-up.
pub fn reduce(tree: &mut Tree, root: NodeId) {
    let mut ids = tree.descendants(root);
    ids.reverse(); // children before parents
    for id in ids {
        if id == root || tree[id].parent().is_none() {
            continue;
        }
        if !matches!(tree[id].kind, NodeKind::And | NodeKind::Or) {
            continue;
        }
        match tree[id].children().len() {
            0 => tree.detach(id),
            1 => {
                let child = tree[id].children()[0];
                tree.detach(child);
                // id is attached and child was just detached
                let _ = tree.replace(id, child);
            }
            _ => {}
        }
    }
}

/// Pass 4: all leaves of a proximity group must share one field name,
/// which is then propagated onto the group node.
pub fn validate_proximity_fields(tree: &mut Tree, root: NodeId) -> Result<(), RewriteError> {
    for id in tree.descendants(root) {
        if !matches!(tree[id].kind, NodeKind::Proximity { .. }) {
            continue;
        }
        let mut found = tree[id].fieldname.clone();
        for leaf in tree.descendants(id) {
            if leaf == id {
                continue;
            }
            let Some(field) = tree[leaf].fieldname.as_deref() else {
                continue;
            };
            match &found {
                None => found = Some(field.to_string()),
                Some(f) if f == field => {}
                Some(f) => {
                    return Err(RewriteError::structure(format!(
                        "proximity group mixes field names '{f}' and '{field}'"
                    )));
                }
            }
        }
        tree[id].fieldname = found;
    }
    Ok(())
}

/// Pass 5: splice And-in-And / Or-in-Or children upward, to a fixpoint.
pub fn rollup_groups(tree: &mut Tree, root: NodeId) {
    loop {
        let mut changed = false;
        for id in tree.descendants(root) {
            if id == root {
                continue;
            }
            let Some(parent) = tree[id].parent() else {
                continue;
            };
            let same_shape = matches!(
                (&tree[id].kind, &tree[parent].kind),
                (NodeKind::And, NodeKind::And) | (NodeKind::Or, NodeKind::Or)
            );
            let boost_neutral = tree[id].boost == 1.0 || tree[id].boost == tree[parent].boost;
            if same_shape && boost_neutral {
                let _ = tree.replace_with_children(id);
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
}

/// Merge key for pass 6. Boost is compared bitwise.
#[derive(PartialEq)]
struct MergeKey {
    field: String,
    operator: Operator,
    boost_bits: u32,
    link: Option<IndexLink>,
    and: bool,
}

/// Pass 6: coalesce literal siblings sharing fieldname, operator, boost
/// and index link into one Array predicate.
///
/// The Array's `and` flag is `(parent is conjunctive) XOR (operator is
/// NE)` — preserved verbatim, its NE-in-disjunction behavior is
/// load-bearing. Nested fields are left alone under pure conjunctions so
/// they stay eligible for nested-path grouping.
pub fn merge_literals(tree: &mut Tree, root: NodeId, metadata: &dyn IndexMetadata) {
    let containers: Vec<NodeId> = tree
        .descendants(root)
        .into_iter()
        .filter(|&id| is_container(&tree[id].kind))
        .collect();
    for container in containers {
        if container != root && tree[container].parent().is_none() {
            continue;
        }
        merge_container_literals(tree, container, metadata);
    }
}

fn merge_container_literals(tree: &mut Tree, container: NodeId, metadata: &dyn IndexMetadata) {
    let conjunctive = tree[container].kind.is_conjunctive();
    let children: Vec<NodeId> = tree[container].children().to_vec();

    let mut groups: Vec<(MergeKey, Vec<NodeId>)> = Vec::new();
    for child in children {
        let node = &tree[child];
        let is_array = matches!(node.kind, NodeKind::Array { .. });
        if !node.kind.is_literal() && !is_array {
            continue;
        }
        if !matches!(
            node.operator,
            Operator::Eq | Operator::Ne | Operator::Contains
        ) {
            continue;
        }
        let Some(field) = node.fieldname.clone() else {
            continue;
        };
        if conjunctive && metadata.nested_path(&field).is_some() {
            continue;
        }
        let and = conjunctive ^ (node.operator == Operator::Ne);
        if let NodeKind::Array { and: existing } = node.kind {
            if existing != and {
                continue;
            }
        }
        let key = MergeKey {
            field,
            operator: node.operator,
            boost_bits: node.boost.to_bits(),
            link: node.link.clone(),
            and,
        };
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, members)) => members.push(child),
            None => groups.push((key, vec![child])),
        }
    }

    for (key, members) in groups {
        if members.len() < 2 {
            continue;
        }
        debug!(
            field = %key.field,
            members = members.len(),
            and = key.and,
            "merging literal siblings into array"
        );
        let mut array_node = Node::new(NodeKind::Array { and: key.and })
            .with_field(key.field)
            .with_operator(key.operator)
            .with_boost(f32::from_bits(key.boost_bits));
        if let Some(link) = key.link {
            array_node = array_node.with_link(link);
        }
        let array = tree.add(array_node);
        // the array takes the first member's position
        let _ = tree.replace(members[0], array);
        for member in members {
            tree.detach(member);
            if matches!(tree[member].kind, NodeKind::Array { .. }) {
                tree.adopt_children(array, member);
            } else {
                let _ = tree.push_child(array, member);
            }
        }
    }
}

/// Pass 7: merge sibling Arrays sharing fieldname and `and` flag by
/// adopting their members into the first.
pub fn merge_arrays(tree: &mut Tree, root: NodeId) {
    let containers: Vec<NodeId> = tree
        .descendants(root)
        .into_iter()
        .filter(|&id| is_container(&tree[id].kind))
        .collect();
    for container in containers {
        let children: Vec<NodeId> = tree[container].children().to_vec();
        let mut firsts: Vec<(String, bool, NodeId)> = Vec::new();
        for child in children {
            let NodeKind::Array { and } = tree[child].kind else {
                continue;
            };
            let Some(field) = tree[child].fieldname.clone() else {
                continue;
            };
            let first = firsts
                .iter()
                .find(|(f, a, _)| *f == field && *a == and)
                .map(|&(_, _, id)| id);
            match first {
                Some(first) => {
                    tree.adopt_children(first, child);
                    tree.detach(child);
                }
                None => firsts.push((field, and, child)),
            }
        }
    }
}

/// Pass 8: rewrite every generated Expansion into
/// `Or(expansion, copy-of-inner-query)`.
///
/// Processed bottom-up via an explicit stack: inner generated expansions
/// convert before outer ones. Converting outer-first would exclude rows
/// whose inner join field is null.
pub fn convert_generated_expansions(tree: &mut Tree, root: NodeId) -> Result<(), RewriteError> {
    let mut stack: Vec<NodeId> = tree
        .descendants(root)
        .into_iter()
        .filter(|&id| matches!(tree[id].kind, NodeKind::Expansion { generated: true }))
        .collect();
    while let Some(expansion) = stack.pop() {
        if tree[expansion].parent().is_none() {
            continue;
        }
        let Some(&query) = tree[expansion].children().first() else {
            continue;
        };
        let copy = tree.clone_subtree(query);
        let or = tree.add(Node::new(NodeKind::Or));
        tree.replace(expansion, or)?;
        tree.push_child(or, expansion)?;
        tree.push_child(or, copy)?;
    }
    Ok(())
}

/// Pass 10: gather siblings sharing one nested path under a `With` node
/// when a parent holds more than one distinct path group. Groups are
/// appended in lexicographic path order; nodes whose path cannot be
/// determined stay where they are.
pub fn group_nested_siblings(tree: &mut Tree, root: NodeId, metadata: &dyn IndexMetadata) {
    let containers: Vec<NodeId> = tree
        .descendants(root)
        .into_iter()
        .filter(|&id| {
            matches!(
                tree[id].kind,
                NodeKind::And
                    | NodeKind::Or
                    | NodeKind::Must
                    | NodeKind::Should
                    | NodeKind::MustNot
            )
        })
        .collect();
    for container in containers {
        group_container(tree, container, metadata);
    }
}

fn group_container(tree: &mut Tree, container: NodeId, metadata: &dyn IndexMetadata) {
    use std::collections::BTreeMap;

    let children: Vec<NodeId> = tree[container].children().to_vec();
    let mut grouped: BTreeMap<String, Vec<NodeId>> = BTreeMap::new();
    for child in children {
        if matches!(tree[child].kind, NodeKind::With) {
            continue;
        }
        if let Some(path) = subtree_path(tree, child, metadata) {
            grouped.entry(path).or_default().push(child);
        }
    }
    if grouped.len() < 2 {
        return;
    }
    for (path, members) in grouped {
        debug!(path = %path, members = members.len(), "grouping nested siblings");
        let with = tree.add(Node::new(NodeKind::With));
        for &member in &members {
            tree.detach(member);
            let _ = tree.push_child(with, member);
        }
        let _ = tree.push_child(container, with);
    }
}

/// The single nested path of a subtree, or `None` when mixed, absent, or
/// not yet determinable.
fn subtree_path(tree: &Tree, id: NodeId, metadata: &dyn IndexMetadata) -> Option<String> {
    match &tree[id].kind {
        NodeKind::With | NodeKind::Expansion { .. } => None,
        kind if kind.is_predicate() => tree[id]
            .fieldname
            .as_deref()
            .and_then(|f| metadata.nested_path(f)),
        _ => {
            let mut common: Option<String> = None;
            for &child in tree[id].children() {
                let path = subtree_path(tree, child, metadata)?;
                match &common {
                    None => common = Some(path),
                    Some(p) if *p == path => {}
                    Some(_) => return None,
                }
            }
            common
        }
    }
}
