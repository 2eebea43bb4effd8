// SPDX-License-Identifier: PMPL-1.0-or-later
//! The rewrite error.

use refract_ast::AstError;
use refract_links::LinkError;
use refract_plan::PlanError;
use thiserror::Error;

/// The single error kind surfaced by a rewrite session.
///
/// Every category is fatal: there is no partial or best-effort output, and
/// no retry happens inside the rewriter. Retry policy, if any, belongs to
/// the backend collaborator.
#[derive(Error, Debug)]
pub enum RewriteError {
    /// Static misconfiguration: disconnected relationship graph, ambiguous
    /// aggregate target, missing metadata.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Malformed query: mixed proximity fields, mismatched nested paths.
    #[error("structural error: {0}")]
    Structure(String),

    /// Backend failure reported verbatim, shard reasons aggregated.
    #[error("backend error: {0}")]
    Backend(String),

    /// Construct the plan vocabulary cannot express.
    #[error("unsupported construct: {0}")]
    Unsupported(String),

    #[error("configuration error: {0}")]
    Link(#[from] LinkError),

    #[error("plan construction failed: {0}")]
    Plan(#[from] PlanError),

    #[error("tree operation failed: {0}")]
    Ast(#[from] AstError),
}

impl RewriteError {
    pub fn configuration(message: impl Into<String>) -> Self {
        RewriteError::Configuration(message.into())
    }

    pub fn structure(message: impl Into<String>) -> Self {
        RewriteError::Structure(message.into())
    }

    pub fn backend(message: impl Into<String>) -> Self {
        RewriteError::Backend(message.into())
    }
}
