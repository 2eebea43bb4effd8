// SPDX-License-Identifier: PMPL-1.0-or-later
//! Refract AST
//!
//! Arena-backed abstract syntax tree for the Refract query rewriter.
//! The external parser produces this tree; the rewriter mutates it in place
//! through the arena's explicit replace/adopt operations and the plan
//! builder consumes it exactly once.

pub mod arena;
pub mod link;
pub mod node;

pub use arena::{AstError, Node, NodeId, Tree};
pub use link::{IndexLink, LinkDecl};
pub use node::{
    AggregateKind, FieldList, NodeKind, Operator, TermStream, TermValue,
};
