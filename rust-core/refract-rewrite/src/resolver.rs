// SPDX-License-Identifier: PMPL-1.0-or-later
//! Expansion resolution.
//!
//! An Expansion binds a cross-index link to a subtree evaluated against
//! the link's target index. Before plan construction it must become a
//! locally-evaluable predicate: either the pkey-to-pkey algebraic rewrite,
//! or a term extraction against the target index whose distinct values are
//! materialized into an external Array on the local join field.
//!
//! How values are obtained is a construction-time strategy choice
//! ([`JoinStrategy`]): the production implementation drives the
//! [`TermExtractor`] collaborator, the static implementation serves
//! precomputed tables. There is no runtime probing for backend plugins.

use std::collections::HashMap;

use refract_ast::{IndexLink, Node, NodeId, NodeKind, TermStream, TermValue, Tree};
use refract_links::{IndexMetadata, RewriteCaches};
use refract_plan::{ExpansionResolution, PlanBuilder, PlanError, QueryPlan};
use tracing::debug;

use crate::error::RewriteError;

/// Values of one field for one shard's matching documents.
#[derive(Debug, Clone)]
pub struct ShardTerms {
    pub shard: u32,
    pub values: Vec<TermValue>,
}

/// A shard that failed to report.
#[derive(Debug, Clone)]
pub struct ShardFailure {
    pub shard: u32,
    pub reason: String,
}

/// Result of one term-extraction call. Partial shard failure is reported
/// distinctly from zero matches.
#[derive(Debug, Clone, Default)]
pub struct TermExtraction {
    pub shards: Vec<ShardTerms>,
    pub failures: Vec<ShardFailure>,
}

impl TermExtraction {
    pub fn total(&self) -> usize {
        self.shards.iter().map(|s| s.values.len()).sum()
    }
}

/// Backend collaborator: distinct values of `field` across documents of
/// `index` matching `query`. The call blocks the rewrite until the
/// per-shard buffers (or a failure) are available.
pub trait TermExtractor {
    fn extract(
        &self,
        index: &str,
        field: &str,
        query: &QueryPlan,
    ) -> Result<TermExtraction, RewriteError>;
}

/// How a cross-index expansion is turned into local join-field values.
/// Chosen once at rewriter construction.
pub trait JoinStrategy {
    fn join_terms(&self, link: &IndexLink, query: &QueryPlan)
        -> Result<TermStream, RewriteError>;
}

/// Production strategy: term extraction against the target index.
pub struct TermExtractionJoin<'a> {
    extractor: &'a dyn TermExtractor,
}

impl<'a> TermExtractionJoin<'a> {
    pub fn new(extractor: &'a dyn TermExtractor) -> Self {
        TermExtractionJoin { extractor }
    }
}

impl JoinStrategy for TermExtractionJoin<'_> {
    fn join_terms(
        &self,
        link: &IndexLink,
        query: &QueryPlan,
    ) -> Result<TermStream, RewriteError> {
        let extraction = self
            .extractor
            .extract(&link.index_name, &link.right_field, query)?;
        if !extraction.failures.is_empty() {
            let reasons: Vec<String> = extraction
                .failures
                .iter()
                .map(|f| format!("shard {}: {}", f.shard, f.reason))
                .collect();
            return Err(RewriteError::backend(format!(
                "term extraction against '{}' failed on {} shard(s): {}",
                link.index_name,
                extraction.failures.len(),
                reasons.join("; ")
            )));
        }
        let total = extraction.total();
        debug!(index = %link.index_name, field = %link.right_field, total, "term extraction complete");
        Ok(TermStream::new(
            total,
            extraction.shards.into_iter().flat_map(|s| s.values),
        ))
    }
}

/// Alternate strategy: precomputed value tables, keyed by
/// (index, field). Used for snapshot joins and in tests.
#[derive(Debug, Clone, Default)]
pub struct StaticTermsJoin {
    tables: HashMap<(String, String), Vec<TermValue>>,
}

impl StaticTermsJoin {
    pub fn new() -> Self {
        StaticTermsJoin::default()
    }

    pub fn with_table(
        mut self,
        index: impl Into<String>,
        field: impl Into<String>,
        values: Vec<TermValue>,
    ) -> Self {
        self.tables.insert((index.into(), field.into()), values);
        self
    }
}

impl JoinStrategy for StaticTermsJoin {
    fn join_terms(
        &self,
        link: &IndexLink,
        _query: &QueryPlan,
    ) -> Result<TermStream, RewriteError> {
        let key = (link.index_name.clone(), link.right_field.clone());
        let values = self.tables.get(&key).ok_or_else(|| {
            RewriteError::configuration(format!(
                "no precomputed join table for {}.{}",
                link.index_name, link.right_field
            ))
        })?;
        Ok(TermStream::new(values.len(), values.clone().into_iter()))
    }
}

/// Resolves Expansion nodes during plan construction.
pub struct ExpansionResolver<'a> {
    metadata: &'a dyn IndexMetadata,
    join: &'a dyn JoinStrategy,
    local: IndexLink,
    visibility: Option<QueryPlan>,
    caches: Option<&'a RewriteCaches>,
}

impl<'a> ExpansionResolver<'a> {
    pub fn new(
        metadata: &'a dyn IndexMetadata,
        join: &'a dyn JoinStrategy,
        local: IndexLink,
    ) -> Self {
        ExpansionResolver {
            metadata,
            join,
            local,
            visibility: None,
            caches: None,
        }
    }

    /// Exclusion filter conjoined with every extraction query.
    pub fn with_visibility(mut self, filter: QueryPlan) -> Self {
        self.visibility = Some(filter);
        self
    }

    pub fn with_caches(mut self, caches: &'a RewriteCaches) -> Self {
        self.caches = Some(caches);
        self
    }

    /// Resolve one expansion, threading the chain of links currently being
    /// resolved so cyclic chains fail instead of recursing forever.
    fn resolve_chain(
        &self,
        tree: &mut Tree,
        expansion: NodeId,
        active: &mut Vec<IndexLink>,
    ) -> Result<NodeId, RewriteError> {
        let link = tree[expansion].link.clone().ok_or_else(|| {
            RewriteError::configuration("expansion node carries no index link")
        })?;

        // an expansion against the enclosing context is a no-op wrapper
        if link == self.local {
            let query = tree[expansion].children().first().copied().ok_or_else(|| {
                RewriteError::structure("expansion node has no subquery")
            })?;
            let filter = tree[expansion].children().get(1).copied();
            tree.remove_child(expansion, query)?;
            let replacement = match filter {
                None => query,
                Some(filter) => {
                    tree.remove_child(expansion, filter)?;
                    let conjunction = tree.add(Node::new(NodeKind::And));
                    tree.push_child(conjunction, query)?;
                    tree.push_child(conjunction, filter)?;
                    conjunction
                }
            };
            tree.replace(expansion, replacement)?;
            return Ok(replacement);
        }

        if active.contains(&link) {
            return Err(RewriteError::configuration(format!(
                "cyclic expansion chain through '{}'",
                link.index_name
            )));
        }
        active.push(link.clone());
        let resolved = self.resolve_foreign(tree, expansion, &link, active);
        active.pop();
        resolved
    }

    fn resolve_foreign(
        &self,
        tree: &mut Tree,
        expansion: NodeId,
        link: &IndexLink,
        active: &mut Vec<IndexLink>,
    ) -> Result<NodeId, RewriteError> {
        let query = tree[expansion].children().first().copied().ok_or_else(|| {
            RewriteError::structure("expansion node has no subquery")
        })?;
        let filter = tree[expansion].children().get(1).copied();

        // chained joins: the inner hop resolves first
        if matches!(tree[query].kind, NodeKind::Expansion { .. }) {
            self.resolve_chain(tree, query, active)?;
        }
        let query = tree[expansion].children()[0];

        // pkey-to-pkey not-null collapses to a local not-null, no backend
        // round trip needed
        if filter.is_none() && self.is_pkey_passthrough(tree, query, link) {
            let left = link.left_field.clone().unwrap_or_else(|| {
                self.local.right_field.clone()
            });
            debug!(field = %left, "pkey-to-pkey expansion collapsed to local not-null");
            let not_null = tree.add(
                Node::new(NodeKind::NotNull)
                    .with_field(left)
                    .with_link(self.local.clone()),
            );
            tree.replace(expansion, not_null)?;
            return Ok(not_null);
        }

        // build the target-index plan, visibility filter applied first
        let builder = PlanBuilder::new(self.metadata).with_expansions(self);
        let mut plan = builder.build(tree, query)?;
        if let Some(exclusion) = &self.visibility {
            plan = plan.with_exclusion(exclusion.clone());
        }

        let stream = self.join.join_terms(link, &plan)?;
        if let Some(caches) = self.caches {
            let key = format!(
                "{}/{}/{}",
                link.index_name,
                link.right_field,
                serde_json::to_string(&plan).unwrap_or_default()
            );
            let expected = stream.expected() as u64;
            caches.count_estimates.get_or_compute(key, || expected);
        }

        let left = link.left_field.clone().ok_or_else(|| {
            RewriteError::configuration(format!(
                "link to '{}' has no local join field",
                link.index_name
            ))
        })?;
        let array = tree.add(
            Node::new(NodeKind::ExternalArray { values: stream })
                .with_field(left)
                .with_link(self.local.clone()),
        );

        let replacement = match filter {
            None => array,
            Some(filter) => {
                tree.remove_child(expansion, filter)?;
                let conjunction = tree.add(Node::new(NodeKind::And));
                tree.push_child(conjunction, array)?;
                tree.push_child(conjunction, filter)?;
                conjunction
            }
        };
        tree.replace(expansion, replacement)?;
        Ok(replacement)
    }

    fn is_pkey_passthrough(&self, tree: &Tree, query: NodeId, link: &IndexLink) -> bool {
        if !matches!(tree[query].kind, NodeKind::NotNull) {
            return false;
        }
        let Some(local_pkey) = self.metadata.primary_key_field(&self.local.index_name) else {
            return false;
        };
        let Some(target_pkey) = self.metadata.primary_key_field(&link.index_name) else {
            return false;
        };
        tree[query].fieldname.as_deref() == Some(target_pkey.as_str())
            && link.left_field.as_deref() == Some(local_pkey.as_str())
            && link.right_field == target_pkey
    }
}

impl ExpansionResolution for ExpansionResolver<'_> {
    fn resolve(&self, tree: &mut Tree, expansion: NodeId) -> Result<NodeId, PlanError> {
        let mut active = Vec::new();
        self.resolve_chain(tree, expansion, &mut active)
            .map_err(|e| PlanError::Expansion {
                message: e.to_string(),
            })
    }
}
