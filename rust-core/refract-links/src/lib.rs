// SPDX-License-Identifier: PMPL-1.0-or-later
//! Refract Links
//!
//! Everything the rewriter knows about indices that is not the query
//! itself: per-field metadata, the declared relationship graph between
//! indices, and the process-wide caches shared across rewrite sessions.

pub mod cache;
pub mod graph;
pub mod metadata;

use thiserror::Error;

pub use cache::{OnceCache, RewriteCaches, RoutingKey};
pub use graph::{Relationship, RelationshipGraph};
pub use metadata::{FieldType, IndexDef, IndexMetadata, StaticMetadata};

/// Errors raised while resolving index relationships.
///
/// These are configuration errors: a missing `#options` declaration or a
/// reference to an index the graph has never seen. They abort the rewrite.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum LinkError {
    #[error("no relationship path between '{from}' and '{to}'")]
    NoPath { from: String, to: String },

    #[error("index '{0}' does not appear in any declared relationship")]
    UnknownIndex(String),
}
