// SPDX-License-Identifier: PMPL-1.0-or-later
//! Index link assignment and expansion injection.
//!
//! Every predicate is tagged with the link of the index owning its field;
//! subtrees that reference exactly one foreign index are then wrapped in a
//! generated Expansion chain along the shortest declared path back to the
//! enclosing context. A bounded fixpoint loop afterwards merges sibling
//! expansions and rolls up the groups that merging exposes.

use refract_ast::{IndexLink, Node, NodeId, NodeKind, Tree};
use refract_links::{IndexMetadata, RelationshipGraph};
use tracing::debug;

use crate::error::RewriteError;
use crate::optimizer::rollup_groups;

/// Internal fields (leading underscore) other than `_all` never resolve.
fn is_internal_field(field: &str) -> bool {
    field.starts_with('_') && field != "_all"
}

/// Tag every predicate-bearing node that has no explicit link with the
/// link of the index owning its field. Unresolvable fields belong to the
/// enclosing context.
pub fn assign_links(
    tree: &mut Tree,
    root: NodeId,
    metadata: &dyn IndexMetadata,
    local: &IndexLink,
) {
    for id in tree.descendants(root) {
        let node = &tree[id];
        if node.link.is_some() || !node.kind.is_predicate() {
            continue;
        }
        let Some(field) = node.fieldname.as_deref() else {
            continue;
        };
        if is_internal_field(field) {
            continue;
        }
        let link = metadata.resolve_field(field).unwrap_or_else(|| local.clone());
        tree[id].link = Some(link);
    }
}

/// Rewrite links declared against the self sentinel by substituting the
/// index the node's field actually resolves to. A substitution that lands
/// on a foreign index is picked up by the next injection sweep.
pub fn resolve_self_links(
    tree: &mut Tree,
    root: NodeId,
    metadata: &dyn IndexMetadata,
    local: &IndexLink,
) {
    for id in tree.descendants(root) {
        let needs_rewrite = tree[id]
            .link
            .as_ref()
            .is_some_and(|link| link.is_self_sentinel());
        if !needs_rewrite {
            continue;
        }
        let substituted = tree[id]
            .fieldname
            .as_deref()
            .and_then(|field| metadata.resolve_field(field))
            .map(|resolved| resolved.index_name)
            .unwrap_or_else(|| local.index_name.clone());
        if let Some(link) = tree[id].link.as_mut() {
            link.index_name = substituted;
        }
    }
}

/// Distinct foreign links referenced by the subtree, ignoring anything
/// already bound under an Expansion and all directive nodes.
fn foreign_links(tree: &Tree, id: NodeId, local: &IndexLink) -> Vec<IndexLink> {
    let mut found: Vec<IndexLink> = Vec::new();
    let mut stack = vec![id];
    while let Some(cursor) = stack.pop() {
        let node = &tree[cursor];
        if matches!(node.kind, NodeKind::Expansion { .. }) || node.kind.is_directive() {
            continue;
        }
        if let Some(link) = &node.link {
            if link != local && !found.contains(link) {
                found.push(link.clone());
            }
        }
        stack.extend(node.children().iter().copied());
    }
    found
}

/// Wrap every maximal single-foreign-link subtree in a generated Expansion
/// chain along the shortest path from the enclosing context.
pub fn inject_expansions(
    tree: &mut Tree,
    root: NodeId,
    graph: &RelationshipGraph,
    local: &IndexLink,
) -> Result<(), RewriteError> {
    inject(tree, root, graph, local)
}

fn inject(
    tree: &mut Tree,
    id: NodeId,
    graph: &RelationshipGraph,
    local: &IndexLink,
) -> Result<(), RewriteError> {
    let links = foreign_links(tree, id, local);
    match links.len() {
        0 => Ok(()),
        1 if tree[id].parent().is_some() => wrap_in_chain(tree, id, &links[0], graph, local),
        _ => {
            // zero-or-many foreign links (or the unparented root): recurse
            let children: Vec<NodeId> = tree[id].children().to_vec();
            for child in children {
                inject(tree, child, graph, local)?;
            }
            Ok(())
        }
    }
}

fn wrap_in_chain(
    tree: &mut Tree,
    target: NodeId,
    link: &IndexLink,
    graph: &RelationshipGraph,
    local: &IndexLink,
) -> Result<(), RewriteError> {
    let path = graph.shortest_path(&local.index_name, &link.index_name)?;
    let chain: Vec<IndexLink> = if path.is_empty() {
        // same-index alias link (self join): a single hop through the
        // declared field pair
        vec![link.clone()]
    } else {
        path.iter().map(|edge| edge.to_link()).collect()
    };
    debug!(
        target_index = %link.index_name,
        hops = chain.len(),
        "injecting expansion chain"
    );

    let outer = tree.add(
        Node::new(NodeKind::Expansion { generated: true }).with_link(chain[0].clone()),
    );
    tree.replace(target, outer)?;
    let mut cursor = outer;
    for hop in &chain[1..] {
        cursor = tree.add_child(
            cursor,
            Node::new(NodeKind::Expansion { generated: true }).with_link(hop.clone()),
        );
    }
    tree.push_child(cursor, target)?;
    Ok(())
}

/// Merge sibling Expansions sharing an identical link by unioning their
/// inner subtrees into one group matching the parent's combinator.
pub fn merge_adjacent_expansions(tree: &mut Tree, root: NodeId) -> Result<(), RewriteError> {
    let containers: Vec<NodeId> = tree
        .descendants(root)
        .into_iter()
        .filter(|&id| tree[id].kind.is_group())
        .collect();
    for container in containers {
        if container != root && tree[container].parent().is_none() {
            continue;
        }
        merge_container_expansions(tree, container)?;
    }
    Ok(())
}

fn merge_container_expansions(tree: &mut Tree, container: NodeId) -> Result<(), RewriteError> {
    let conjunctive = tree[container].kind.is_conjunctive();
    let children: Vec<NodeId> = tree[container].children().to_vec();

    let mut firsts: Vec<(IndexLink, NodeId)> = Vec::new();
    for child in children {
        // expansions carrying a filter subquery are left alone
        let is_plain_expansion = matches!(tree[child].kind, NodeKind::Expansion { .. })
            && tree[child].children().len() == 1;
        if !is_plain_expansion {
            continue;
        }
        let Some(link) = tree[child].link.clone() else {
            continue;
        };
        let first = firsts
            .iter()
            .find(|(l, _)| *l == link)
            .map(|&(_, id)| id);
        match first {
            Some(first) => {
                merge_expansion_pair(tree, first, child, conjunctive)?;
            }
            None => firsts.push((link, child)),
        }
    }
    Ok(())
}

fn merge_expansion_pair(
    tree: &mut Tree,
    first: NodeId,
    second: NodeId,
    conjunctive: bool,
) -> Result<(), RewriteError> {
    let first_query = tree[first].children()[0];
    let second_query = tree[second].children()[0];
    tree.remove_child(second, second_query)?;
    tree.detach(second);

    // a merged expansion is only "generated" if both halves were
    let second_generated = matches!(tree[second].kind, NodeKind::Expansion { generated: true });
    if let NodeKind::Expansion { generated } = &mut tree[first].kind {
        *generated = *generated && second_generated;
    }

    let union_kind = if conjunctive { NodeKind::And } else { NodeKind::Or };
    let reuse_group = match (&tree[first_query].kind, &union_kind) {
        (NodeKind::And, NodeKind::And) | (NodeKind::Or, NodeKind::Or) => true,
        _ => false,
    };
    if reuse_group {
        tree.push_child(first_query, second_query)?;
    } else {
        let group = tree.add(Node::new(union_kind));
        tree.remove_child(first, first_query)?;
        tree.push_child(first, group)?;
        tree.push_child(group, first_query)?;
        tree.push_child(group, second_query)?;
    }
    Ok(())
}

/// The bounded fixpoint of §expansion merging and group rollup: each
/// iteration only ever removes nodes, so the loop terminates once the
/// reachable node count stops shrinking.
pub fn merge_rollup_fixpoint(tree: &mut Tree, root: NodeId) -> Result<(), RewriteError> {
    let mut iterations = 0usize;
    loop {
        let before = tree.node_count(root);
        merge_adjacent_expansions(tree, root)?;
        rollup_groups(tree, root);
        iterations += 1;
        if tree.node_count(root) >= before {
            break;
        }
    }
    debug!(iterations, "expansion merge/rollup fixpoint reached");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use refract_ast::Operator;
    use refract_links::{FieldType, IndexDef, Relationship, StaticMetadata};

    fn users_link() -> IndexLink {
        IndexLink {
            alias: Some("users".into()),
            index_name: "db.public.users.idx_users".into(),
            left_field: Some("owner_id".into()),
            right_field: "id".into(),
        }
    }

    fn metadata() -> StaticMetadata {
        StaticMetadata::new(
            IndexDef::new("db.public.posts.idx_posts", "id")
                .with_field("tag", FieldType::Text)
                .with_field("title", FieldType::Text),
        )
        .with_linked(
            users_link(),
            IndexDef::new("db.public.users.idx_users", "id")
                .with_field("name", FieldType::Text),
        )
    }

    fn graph() -> RelationshipGraph {
        let mut g = RelationshipGraph::new();
        g.add(Relationship {
            left_index: "db.public.posts.idx_posts".into(),
            left_field: "owner_id".into(),
            right_index: "db.public.users.idx_users".into(),
            right_field: "id".into(),
        });
        g.add(Relationship {
            left_index: "db.public.users.idx_users".into(),
            left_field: "profile_id".into(),
            right_index: "db.public.profiles.idx_profiles".into(),
            right_field: "id".into(),
        });
        g
    }

    fn local() -> IndexLink {
        IndexLink::local("db.public.posts.idx_posts", "id")
    }

    #[test]
    fn test_assign_links_local_and_foreign() {
        let md = metadata();
        let mut tree = Tree::new();
        let root = tree.add(Node::new(NodeKind::And));
        let a = tree.add_child(
            root,
            Node::new(NodeKind::Word("x".into())).with_field("tag"),
        );
        let b = tree.add_child(
            root,
            Node::new(NodeKind::Word("bob".into())).with_field("name"),
        );

        assign_links(&mut tree, root, &md, &local());
        assert_eq!(tree[a].link, Some(local()));
        assert_eq!(tree[b].link, Some(users_link()));
    }

    #[test]
    fn test_assign_links_skips_internal_fields() {
        let md = metadata();
        let mut tree = Tree::new();
        let root = tree.add(Node::new(NodeKind::And));
        let hidden = tree.add_child(
            root,
            Node::new(NodeKind::Word("x".into())).with_field("_score"),
        );
        let all = tree.add_child(
            root,
            Node::new(NodeKind::Word("x".into())).with_field("_all"),
        );

        assign_links(&mut tree, root, &md, &local());
        assert_eq!(tree[hidden].link, None);
        assert_eq!(tree[all].link, Some(local()));
    }

    #[test]
    fn test_self_sentinel_substitution() {
        let md = metadata();
        let mut tree = Tree::new();
        let root = tree.add(Node::new(NodeKind::And));
        let node = tree.add_child(
            root,
            Node::new(NodeKind::Word("7".into()))
                .with_field("tag")
                .with_link(IndexLink {
                    alias: None,
                    index_name: refract_ast::link::SELF_SENTINEL.into(),
                    left_field: Some("manager_id".into()),
                    right_field: "id".into(),
                }),
        );

        resolve_self_links(&mut tree, root, &md, &local());
        let link = tree[node].link.as_ref().unwrap();
        assert_eq!(link.index_name, "db.public.posts.idx_posts");
        assert_eq!(link.left_field.as_deref(), Some("manager_id"));
    }

    #[test]
    fn test_inject_single_foreign_subtree() {
        let md = metadata();
        let mut tree = Tree::new();
        let root = tree.add(Node::new(NodeKind::And));
        tree.add_child(
            root,
            Node::new(NodeKind::Word("x".into())).with_field("tag"),
        );
        let foreign = tree.add_child(
            root,
            Node::new(NodeKind::Word("bob".into())).with_field("name"),
        );
        assign_links(&mut tree, root, &md, &local());

        inject_expansions(&mut tree, root, &graph(), &local()).unwrap();

        let expansion = tree[foreign].parent().expect("wrapped");
        assert!(matches!(
            tree[expansion].kind,
            NodeKind::Expansion { generated: true }
        ));
        let link = tree[expansion].link.as_ref().unwrap();
        assert_eq!(link.index_name, "db.public.users.idx_users");
        assert_eq!(tree[expansion].parent(), Some(root));
    }

    #[test]
    fn test_inject_chain_matches_hop_count() {
        // a predicate on the profiles index, two hops away
        let mut tree = Tree::new();
        let root = tree.add(Node::new(NodeKind::And));
        tree.add_child(
            root,
            Node::new(NodeKind::Word("x".into())).with_field("tag").with_link(local()),
        );
        let far = tree.add_child(
            root,
            Node::new(NodeKind::Word("ada".into()))
                .with_field("bio")
                .with_link(IndexLink {
                    alias: None,
                    index_name: "db.public.profiles.idx_profiles".into(),
                    left_field: Some("profile_id".into()),
                    right_field: "id".into(),
                }),
        );

        inject_expansions(&mut tree, root, &graph(), &local()).unwrap();

        // chain depth equals the shortest-path hop count (2)
        let inner = tree[far].parent().expect("inner expansion");
        let outer = tree[inner].parent().expect("outer expansion");
        assert!(matches!(tree[inner].kind, NodeKind::Expansion { .. }));
        assert!(matches!(tree[outer].kind, NodeKind::Expansion { .. }));
        assert_eq!(tree[outer].parent(), Some(root));

        assert_eq!(
            tree[outer].link.as_ref().unwrap().index_name,
            "db.public.users.idx_users"
        );
        assert_eq!(
            tree[inner].link.as_ref().unwrap().index_name,
            "db.public.profiles.idx_profiles"
        );
    }

    #[test]
    fn test_inject_disconnected_fails() {
        let mut tree = Tree::new();
        let root = tree.add(Node::new(NodeKind::And));
        tree.add_child(
            root,
            Node::new(NodeKind::Word("x".into())).with_field("tag").with_link(local()),
        );
        tree.add_child(
            root,
            Node::new(NodeKind::Word("y".into()))
                .with_field("sku")
                .with_link(IndexLink {
                    alias: None,
                    index_name: "db.public.orders.idx_orders".into(),
                    left_field: Some("sku".into()),
                    right_field: "sku".into(),
                }),
        );

        let result = inject_expansions(&mut tree, root, &graph(), &local());
        assert!(matches!(result, Err(RewriteError::Link(_))));
    }

    #[test]
    fn test_merge_sibling_expansions_conjunctive() {
        let mut tree = Tree::new();
        let root = tree.add(Node::new(NodeKind::And));
        let e1 = tree.add_child(
            root,
            Node::new(NodeKind::Expansion { generated: true }).with_link(users_link()),
        );
        let q1 = tree.add_child(
            e1,
            Node::new(NodeKind::Word("bob".into())).with_field("name"),
        );
        let e2 = tree.add_child(
            root,
            Node::new(NodeKind::Expansion { generated: true }).with_link(users_link()),
        );
        let q2 = tree.add_child(
            e2,
            Node::new(NodeKind::Word("alice".into())).with_field("name"),
        );

        merge_adjacent_expansions(&mut tree, root).unwrap();

        assert_eq!(tree[root].children(), &[e1]);
        assert_eq!(tree[e2].parent(), None);
        let group = tree[e1].children()[0];
        assert!(matches!(tree[group].kind, NodeKind::And));
        assert_eq!(tree[group].children(), &[q1, q2]);
    }

    #[test]
    fn test_merge_reuses_matching_group() {
        let mut tree = Tree::new();
        let root = tree.add(Node::new(NodeKind::Or));
        let e1 = tree.add_child(
            root,
            Node::new(NodeKind::Expansion { generated: true }).with_link(users_link()),
        );
        let or = tree.add_child(e1, Node::new(NodeKind::Or));
        tree.add_child(or, Node::new(NodeKind::Word("bob".into())).with_field("name"));
        let e2 = tree.add_child(
            root,
            Node::new(NodeKind::Expansion { generated: true }).with_link(users_link()),
        );
        let q2 = tree.add_child(
            e2,
            Node::new(NodeKind::Word("alice".into())).with_field("name"),
        );

        merge_adjacent_expansions(&mut tree, root).unwrap();
        assert_eq!(tree[e1].children(), &[or]);
        assert_eq!(tree[or].children().len(), 2);
        assert_eq!(*tree[or].children().last().unwrap(), q2);
    }

    #[test]
    fn test_merge_skips_different_links() {
        let other_link = IndexLink {
            alias: None,
            index_name: "db.public.profiles.idx_profiles".into(),
            left_field: Some("profile_id".into()),
            right_field: "id".into(),
        };
        let mut tree = Tree::new();
        let root = tree.add(Node::new(NodeKind::And));
        let e1 = tree.add_child(
            root,
            Node::new(NodeKind::Expansion { generated: true }).with_link(users_link()),
        );
        tree.add_child(e1, Node::new(NodeKind::Word("a".into())).with_field("name"));
        let e2 = tree.add_child(
            root,
            Node::new(NodeKind::Expansion { generated: true }).with_link(other_link),
        );
        tree.add_child(e2, Node::new(NodeKind::Word("b".into())).with_field("bio"));

        merge_adjacent_expansions(&mut tree, root).unwrap();
        assert_eq!(tree[root].children(), &[e1, e2]);
    }

    #[test]
    fn test_fixpoint_terminates_and_stabilizes() {
        let mut tree = Tree::new();
        let root = tree.add(Node::new(NodeKind::And));
        // two mergeable expansions whose union exposes an And-in-And rollup
        for value in ["a", "b"] {
            let e = tree.add_child(
                root,
                Node::new(NodeKind::Expansion { generated: true }).with_link(users_link()),
            );
            let and = tree.add_child(e, Node::new(NodeKind::And));
            tree.add_child(
                and,
                Node::new(NodeKind::Word(value.into()))
                    .with_field("name")
                    .with_operator(Operator::Eq),
            );
            tree.add_child(
                and,
                Node::new(NodeKind::Word("active".into())).with_field("name"),
            );
        }

        let before = tree.node_count(root);
        merge_rollup_fixpoint(&mut tree, root).unwrap();
        let after = tree.node_count(root);
        assert!(after < before);

        // running again changes nothing
        merge_rollup_fixpoint(&mut tree, root).unwrap();
        assert_eq!(tree.node_count(root), after);
    }
}
