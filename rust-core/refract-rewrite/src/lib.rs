// SPDX-License-Identifier: PMPL-1.0-or-later
//! Refract Rewrite
//!
//! The query rewriting pipeline. A parsed AST goes in, a backend-neutral
//! query plan comes out:
//!
//! 1. directive hoisting and aggregate-target validation
//! 2. index link assignment, self-link substitution, expansion injection
//! 3. the merge/rollup fixpoint
//! 4. the generic optimizer passes
//! 5. token analysis
//! 6. generated-expansion conversion and nested grouping
//! 7. plan construction, resolving expansions on the way, visibility wrap
//!
//! One rewrite is single-threaded and synchronous; independent sessions
//! share only read-only metadata and the injected [`RewriteCaches`].

pub mod analyzer;
pub mod assign;
pub mod error;
pub mod optimizer;
pub mod resolver;

use std::sync::Arc;

use refract_ast::{IndexLink, LinkDecl, NodeId, NodeKind, Tree};
use refract_links::{IndexMetadata, RelationshipGraph, RewriteCaches};
use refract_plan::{PlanBuilder, QueryPlan};
use tracing::debug;

pub use analyzer::{AnalyzedToken, TantivyAnalyzer, TokenAnalyzer};
pub use error::RewriteError;
pub use resolver::{
    ExpansionResolver, JoinStrategy, ShardFailure, ShardTerms, StaticTermsJoin, TermExtraction,
    TermExtractionJoin, TermExtractor,
};

/// One rewrite session's entry point.
///
/// Construction wires up the collaborators once: metadata, the token
/// analyzer, the join strategy, an optional visibility filter and the
/// shared caches. `rewrite` may then be called once per parsed tree.
pub struct QueryRewriter<'a> {
    index: String,
    metadata: &'a dyn IndexMetadata,
    analyzer: &'a dyn TokenAnalyzer,
    join: &'a dyn JoinStrategy,
    visibility: Option<QueryPlan>,
    caches: Option<Arc<RewriteCaches>>,
}

impl<'a> QueryRewriter<'a> {
    pub fn new(
        index: impl Into<String>,
        metadata: &'a dyn IndexMetadata,
        analyzer: &'a dyn TokenAnalyzer,
        join: &'a dyn JoinStrategy,
    ) -> Self {
        QueryRewriter {
            index: index.into(),
            metadata,
            analyzer,
            join,
            visibility: None,
            caches: None,
        }
    }

    /// Row-exclusion filter for the current index. It is conjoined with
    /// every expansion extraction query and wrapped around the final plan.
    pub fn with_visibility(mut self, filter: QueryPlan) -> Self {
        self.visibility = Some(filter);
        self
    }

    /// Shared cache service. Entries are computed at most once per key and
    /// never invalidated; staleness is accepted.
    pub fn with_caches(mut self, caches: Arc<RewriteCaches>) -> Self {
        self.caches = Some(caches);
        self
    }

    /// Rewrite the tree rooted at `root` and compile it into a plan.
    pub fn rewrite(&self, tree: &mut Tree, root: NodeId) -> Result<QueryPlan, RewriteError> {
        let pkey = self
            .metadata
            .primary_key_field(&self.index)
            .unwrap_or_else(|| "_id".to_string());
        let local = IndexLink::local(&self.index, &pkey);
        debug!(index = %self.index, nodes = tree.node_count(root), "rewrite started");

        optimizer::pull_directives(tree, root);
        optimizer::validate_aggregate_targets(tree, root, self.metadata)?;

        let graph = self.relationship_graph(tree, root, &local);

        assign::assign_links(tree, root, self.metadata, &local);
        assign::resolve_self_links(tree, root, self.metadata, &local);
        assign::inject_expansions(tree, root, &graph, &local)?;
        assign::merge_rollup_fixpoint(tree, root)?;

        optimizer::validate_with_groups(tree, root, self.metadata)?;
        optimizer::reduce(tree, root);
        optimizer::validate_proximity_fields(tree, root)?;
        optimizer::rollup_groups(tree, root);
        optimizer::merge_literals(tree, root, self.metadata);
        optimizer::merge_arrays(tree, root);

        analyzer::analyze_tokens(tree, root, self.metadata, self.analyzer)?;

        optimizer::convert_generated_expansions(tree, root)?;
        optimizer::reduce(tree, root);
        optimizer::group_nested_siblings(tree, root, self.metadata);
        debug!(nodes = tree.node_count(root), "tree stabilized, building plan");

        let mut expansions = ExpansionResolver::new(self.metadata, self.join, local);
        if let Some(filter) = &self.visibility {
            expansions = expansions.with_visibility(filter.clone());
        }
        if let Some(caches) = &self.caches {
            expansions = expansions.with_caches(caches);
        }
        let builder = PlanBuilder::new(self.metadata).with_expansions(&expansions);
        let mut plan = builder.build(tree, root)?;

        if let Some(filter) = &self.visibility {
            plan = plan.with_exclusion(filter.clone());
        }
        Ok(plan)
    }

    /// Build the relationship graph from the query's `#options`
    /// declarations, substituting the self sentinel first.
    fn relationship_graph(
        &self,
        tree: &Tree,
        root: NodeId,
        local: &IndexLink,
    ) -> RelationshipGraph {
        let mut decls: Vec<LinkDecl> = Vec::new();
        for id in tree.descendants(root) {
            if let NodeKind::Options { links } = &tree[id].kind {
                decls.extend(links.iter().cloned());
            }
        }
        for decl in &mut decls {
            if decl.index_name == refract_ast::link::SELF_SENTINEL {
                decl.index_name = self
                    .metadata
                    .resolve_field(&decl.right_field)
                    .map(|link| link.index_name)
                    .unwrap_or_else(|| local.index_name.clone());
            }
        }
        RelationshipGraph::from_decls(local, &decls)
    }
}
