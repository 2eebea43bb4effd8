// SPDX-License-Identifier: PMPL-1.0-or-later
//! Plan construction errors.

use thiserror::Error;

/// Errors raised while translating the AST into a query plan.
///
/// All of these abort the compilation; there is no partial plan output.
#[derive(Error, Debug)]
pub enum PlanError {
    #[error("range specification '{spec}' is malformed: {reason}")]
    InvalidRange { spec: String, reason: String },

    #[error("nested path '{found}' conflicts with enclosing scope '{expected}'")]
    MismatchedNestedPath { expected: String, found: String },

    #[error("operator '{operator}' is not supported for {kind} predicates")]
    UnsupportedOperator { operator: String, kind: String },

    #[error("{kind} predicate has no field name")]
    MissingField { kind: String },

    #[error("invalid regular expression '{pattern}': {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: Box<regex::Error>,
    },

    #[error("term extraction underflow: expected {expected} values, drained {got}")]
    Underflow { expected: usize, got: usize },

    #[error("external value stream was already consumed")]
    StreamConsumed,

    #[error("{0} nodes cannot be compiled into the plan vocabulary")]
    UnsupportedConstruct(&'static str),

    #[error("expansion resolution failed: {message}")]
    Expansion { message: String },
}
