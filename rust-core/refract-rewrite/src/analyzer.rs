// SPDX-License-Identifier: PMPL-1.0-or-later
//! Token analysis pass.
//!
//! String-valued leaves are normalized through the backend's analyzer
//! before plan construction, so the compiled plan only ever carries tokens
//! the index actually stores. Leaves that normalize to nothing are deleted;
//! leaves that change shape (a phrase collapsing to a word, a word
//! splitting into several tokens) are replaced in place and the subtree
//! scan restarts, since the replacement may itself need analysis.

use refract_ast::{Node, NodeId, NodeKind, Tree};
use refract_links::IndexMetadata;
use tantivy::tokenizer::{LowerCaser, SimpleTokenizer, TextAnalyzer};
use tracing::trace;

use crate::error::RewriteError;

/// One token produced by analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyzedToken {
    pub token: String,
    pub position: usize,
}

/// Normalizes/tokenizes leaf values using the index's analyzer classes.
pub trait TokenAnalyzer {
    /// Analyze `text` for `field` under the given analyzer class
    /// (`exact`, `phrase`, `fulltext`, `date`; `None` for unmapped fields).
    fn analyze(
        &self,
        analyzer: Option<&str>,
        field: &str,
        text: &str,
    ) -> Result<Vec<AnalyzedToken>, RewriteError>;
}

/// Bundled analyzer built on tantivy's tokenizer pipeline.
///
/// `exact` and `date` classes lowercase/pass the whole value through as a
/// single token; everything else runs the simple-tokenizer + lowercaser
/// chain the document store indexes with.
#[derive(Debug, Clone, Copy, Default)]
pub struct TantivyAnalyzer;

impl TantivyAnalyzer {
    pub fn new() -> Self {
        TantivyAnalyzer
    }
}

impl TokenAnalyzer for TantivyAnalyzer {
    fn analyze(
        &self,
        analyzer: Option<&str>,
        _field: &str,
        text: &str,
    ) -> Result<Vec<AnalyzedToken>, RewriteError> {
        match analyzer {
            Some("exact") => {
                let token = text.trim().to_lowercase();
                if token.is_empty() {
                    return Ok(Vec::new());
                }
                Ok(vec![AnalyzedToken { token, position: 0 }])
            }
            Some("date") => Ok(vec![AnalyzedToken {
                token: text.to_string(),
                position: 0,
            }]),
            _ => {
                let mut chain = TextAnalyzer::builder(SimpleTokenizer::default())
                    .filter(LowerCaser)
                    .build();
                let mut stream = chain.token_stream(text);
                let mut tokens = Vec::new();
                while stream.advance() {
                    let token = stream.token();
                    tokens.push(AnalyzedToken {
                        token: token.text.clone(),
                        position: token.position,
                    });
                }
                Ok(tokens)
            }
        }
    }
}

/// Run the token-analysis pass over the whole tree.
pub fn analyze_tokens(
    tree: &mut Tree,
    root: NodeId,
    metadata: &dyn IndexMetadata,
    analyzer: &dyn TokenAnalyzer,
) -> Result<(), RewriteError> {
    // each sweep stops at its first mutation and restarts
    while analyze_sweep(tree, root, metadata, analyzer)? {}
    extract_non_literal_members(tree, root)?;
    Ok(())
}

fn analyze_sweep(
    tree: &mut Tree,
    root: NodeId,
    metadata: &dyn IndexMetadata,
    analyzer: &dyn TokenAnalyzer,
) -> Result<bool, RewriteError> {
    for id in tree.descendants(root) {
        let node = &tree[id];
        if !node.kind.is_analyzable_text() || node.operator.is_verbatim() {
            continue;
        }
        let Some(field) = node.fieldname.clone() else {
            continue;
        };
        let Some(value) = node.kind.value_str().map(str::to_string) else {
            continue;
        };
        let class = metadata.search_analyzer(&field);

        match &tree[id].kind {
            NodeKind::Word(_) => {
                let tokens = analyzer.analyze(class.as_deref(), &field, &value)?;
                match tokens.len() {
                    0 => {
                        trace!(field = %field, "word normalized to nothing, deleting");
                        tree.detach(id);
                        return Ok(true);
                    }
                    1 => {
                        if tokens[0].token != value {
                            tree[id].kind = NodeKind::Word(tokens[0].token.clone());
                            return Ok(true);
                        }
                    }
                    _ => {
                        replace_with_proximity(tree, id, &field, tokens)?;
                        return Ok(true);
                    }
                }
            }
            NodeKind::Phrase(_) => {
                let tokens = analyzer.analyze(class.as_deref(), &field, &value)?;
                match tokens.len() {
                    0 => {
                        trace!(field = %field, "phrase normalized to nothing, deleting");
                        tree.detach(id);
                        return Ok(true);
                    }
                    1 => {
                        // single-token phrases collapse to plain words
                        tree[id].kind = NodeKind::Word(tokens[0].token.clone());
                        return Ok(true);
                    }
                    _ => {
                        let joined: Vec<&str> =
                            tokens.iter().map(|t| t.token.as_str()).collect();
                        if joined.join(" ") != value {
                            replace_with_proximity(tree, id, &field, tokens)?;
                            return Ok(true);
                        }
                    }
                }
            }
            // pattern-bearing leaves only get whole-value normalization,
            // so their metacharacters survive
            NodeKind::Fuzzy(_) | NodeKind::Prefix(_) | NodeKind::Wildcard(_) => {
                let tokens = analyzer.analyze(Some("exact"), &field, &value)?;
                match tokens.first() {
                    None => {
                        tree.detach(id);
                        return Ok(true);
                    }
                    Some(first) if first.token != value => {
                        let token = first.token.clone();
                        tree[id].kind = match &tree[id].kind {
                            NodeKind::Fuzzy(_) => NodeKind::Fuzzy(token),
                            NodeKind::Prefix(_) => NodeKind::Prefix(token),
                            _ => NodeKind::Wildcard(token),
                        };
                        return Ok(true);
                    }
                    Some(_) => {}
                }
            }
            _ => {}
        }
    }
    Ok(false)
}

/// A multi-token value becomes an exact ordered run of its tokens.
fn replace_with_proximity(
    tree: &mut Tree,
    id: NodeId,
    field: &str,
    tokens: Vec<AnalyzedToken>,
) -> Result<(), RewriteError> {
    let mut proximity = Node::new(NodeKind::Proximity {
        distance: 0,
        ordered: true,
    })
    .with_field(field)
    .with_boost(tree[id].boost);
    proximity.operator = tree[id].operator;
    if let Some(link) = tree[id].link.clone() {
        proximity = proximity.with_link(link);
    }
    let proximity = tree.add(proximity);
    for token in tokens {
        tree.add_child(
            proximity,
            Node::new(NodeKind::Word(token.token)).with_field(field),
        );
    }
    tree.replace(id, proximity)?;
    Ok(())
}

/// Non-literal members left inside an Array after analysis are pulled out
/// into a sibling group matching the array's combinator; the array keeps
/// its remaining literal members.
fn extract_non_literal_members(tree: &mut Tree, root: NodeId) -> Result<(), RewriteError> {
    let arrays: Vec<NodeId> = tree
        .descendants(root)
        .into_iter()
        .filter(|&id| matches!(tree[id].kind, NodeKind::Array { .. }))
        .collect();
    for array in arrays {
        if tree[array].parent().is_none() {
            continue;
        }
        let non_literals: Vec<NodeId> = tree[array]
            .children()
            .iter()
            .copied()
            .filter(|&m| !tree[m].kind.is_literal())
            .collect();
        if non_literals.is_empty() {
            continue;
        }
        let NodeKind::Array { and } = tree[array].kind else {
            continue;
        };
        let group = tree.add(Node::new(if and { NodeKind::And } else { NodeKind::Or }));
        tree.replace(array, group)?;
        tree.push_child(group, array)?;
        for member in non_literals {
            tree.detach(member);
            tree.push_child(group, member)?;
        }
    }
    Ok(())
}
