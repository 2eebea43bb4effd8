// SPDX-License-Identifier: PMPL-1.0-or-later
//! Node variants and leaf values.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::link::LinkDecl;

/// Comparison operator attached to a predicate node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Operator {
    Eq,
    Ne,
    #[default]
    Contains,
    Lt,
    Gt,
    Lte,
    Gte,
    Regex,
    Concept,
    FuzzyConcept,
}

impl Operator {
    /// Operators whose values are literal comparisons rather than analyzed
    /// text. Token analysis skips these.
    pub fn is_verbatim(self) -> bool {
        matches!(self, Operator::Regex | Operator::Concept | Operator::FuzzyConcept)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operator::Eq => "=",
            Operator::Ne => "<>",
            Operator::Contains => ":",
            Operator::Lt => "<",
            Operator::Gt => ">",
            Operator::Lte => "<=",
            Operator::Gte => ">=",
            Operator::Regex => ":~",
            Operator::Concept => ":@",
            Operator::FuzzyConcept => ":@~",
        };
        f.write_str(s)
    }
}

/// Aggregate directive flavors. The aggregation math itself lives in the
/// backend collaborator; the rewriter only validates the target index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateKind {
    Tally,
    RangeAgg,
    SignificantTerms,
    ExtendedStats,
}

/// A named field list from a `#field_lists` directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldList {
    pub name: String,
    pub fields: Vec<String>,
}

/// A scalar produced by term extraction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TermValue {
    Int(i32),
    Long(i64),
    Str(String),
}

impl fmt::Display for TermValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TermValue::Int(v) => write!(f, "{v}"),
            TermValue::Long(v) => write!(f, "{v}"),
            TermValue::Str(v) => f.write_str(v),
        }
    }
}

type TermIter = Box<dyn Iterator<Item = TermValue>>;

/// Lazily-produced, finite, single-pass sequence of extracted term values.
///
/// The stream drains per-shard result buffers as they arrive and is not
/// restartable: [`TermStream::take`] hands the iterator to exactly one
/// consumer. Rewriting a query is single-threaded, so the shared handle is
/// an `Rc` and cloning a subtree shares the stream instead of restarting it.
#[derive(Clone)]
pub struct TermStream {
    inner: Rc<RefCell<Option<TermIter>>>,
    expected: usize,
}

impl TermStream {
    pub fn new(expected: usize, iter: impl Iterator<Item = TermValue> + 'static) -> Self {
        TermStream {
            inner: Rc::new(RefCell::new(Some(Box::new(iter)))),
            expected,
        }
    }

    /// Number of values the extraction reported; draining fewer than this
    /// is an underflow the consumer must surface.
    pub fn expected(&self) -> usize {
        self.expected
    }

    /// Take the underlying iterator. Returns `None` once consumed.
    pub fn take(&self) -> Option<TermIter> {
        self.inner.borrow_mut().take()
    }
}

impl fmt::Debug for TermStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.inner.borrow().is_some() {
            "pending"
        } else {
            "consumed"
        };
        write!(f, "TermStream({} values, {state})", self.expected)
    }
}

/// The tagged union of AST node variants.
///
/// Group nodes hold their members as arena children; leaf predicates carry
/// their value inline. `Bool` has exactly three clause children (`Must`,
/// `Should`, `MustNot`) so that tree passes can treat every variant's
/// children uniformly.
#[derive(Debug, Clone)]
pub enum NodeKind {
    And,
    Or,
    Not,
    /// Conjunctive group whose members must match one instance of a single
    /// nested path.
    With,
    Bool,
    Must,
    Should,
    MustNot,

    Word(String),
    Phrase(String),
    /// Raw numeric text; coerced against field metadata at build time.
    Number(String),
    BoolLit(bool),
    Fuzzy(String),
    Prefix(String),
    Wildcard(String),
    /// Raw JSON range spec (`{"from": .., "to": .., ..}`).
    Range { spec: String },
    Null,
    NotNull,
    /// Literal value set; members are children. `and` controls whether all
    /// members must match.
    Array { and: bool },
    /// Value set materialized from term extraction.
    ExternalArray { values: TermStream },
    Script(String),
    Proximity { distance: u32, ordered: bool },

    /// Subtree evaluated against the index of this node's link. Children
    /// are `[subquery]` or `[subquery, filter]`.
    Expansion { generated: bool },

    Limit { offset: u64, count: u64 },
    Visibility,
    Aggregate { kind: AggregateKind },
    Suggest { text: String },
    Options { links: Vec<LinkDecl> },
    FieldLists { lists: Vec<FieldList> },
}

impl NodeKind {
    /// Boolean-group variants that contain other predicates.
    pub fn is_group(&self) -> bool {
        matches!(
            self,
            NodeKind::And
                | NodeKind::Or
                | NodeKind::Not
                | NodeKind::With
                | NodeKind::Bool
                | NodeKind::Must
                | NodeKind::Should
                | NodeKind::MustNot
        )
    }

    /// Groups with AND semantics for the literal-merge `and` flag. `Not`
    /// and `MustNot` negate each member, so their members combine
    /// disjunctively under the negation.
    pub fn is_conjunctive(&self) -> bool {
        matches!(self, NodeKind::And | NodeKind::With | NodeKind::Must)
    }

    /// Leaf predicate variants that carry a field comparison.
    pub fn is_predicate(&self) -> bool {
        matches!(
            self,
            NodeKind::Word(_)
                | NodeKind::Phrase(_)
                | NodeKind::Number(_)
                | NodeKind::BoolLit(_)
                | NodeKind::Fuzzy(_)
                | NodeKind::Prefix(_)
                | NodeKind::Wildcard(_)
                | NodeKind::Range { .. }
                | NodeKind::Null
                | NodeKind::NotNull
                | NodeKind::Array { .. }
                | NodeKind::ExternalArray { .. }
                | NodeKind::Script(_)
                | NodeKind::Proximity { .. }
        )
    }

    /// String-valued leaves subject to token analysis.
    pub fn is_analyzable_text(&self) -> bool {
        matches!(
            self,
            NodeKind::Word(_)
                | NodeKind::Phrase(_)
                | NodeKind::Fuzzy(_)
                | NodeKind::Prefix(_)
                | NodeKind::Wildcard(_)
        )
    }

    /// Literal leaves eligible for merging into an `Array`.
    pub fn is_literal(&self) -> bool {
        matches!(
            self,
            NodeKind::Word(_) | NodeKind::Number(_) | NodeKind::BoolLit(_)
        )
    }

    /// Directive nodes hoisted to the front of the tree before rewriting.
    pub fn is_directive(&self) -> bool {
        matches!(
            self,
            NodeKind::Limit { .. }
                | NodeKind::Visibility
                | NodeKind::Aggregate { .. }
                | NodeKind::Suggest { .. }
                | NodeKind::Options { .. }
                | NodeKind::FieldLists { .. }
        )
    }

    /// The literal text of a string-valued leaf.
    pub fn value_str(&self) -> Option<&str> {
        match self {
            NodeKind::Word(v)
            | NodeKind::Phrase(v)
            | NodeKind::Fuzzy(v)
            | NodeKind::Prefix(v)
            | NodeKind::Wildcard(v)
            | NodeKind::Number(v)
            | NodeKind::Script(v) => Some(v),
            _ => None,
        }
    }

    /// Variant name for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::And => "And",
            NodeKind::Or => "Or",
            NodeKind::Not => "Not",
            NodeKind::With => "With",
            NodeKind::Bool => "Bool",
            NodeKind::Must => "Must",
            NodeKind::Should => "Should",
            NodeKind::MustNot => "MustNot",
            NodeKind::Word(_) => "Word",
            NodeKind::Phrase(_) => "Phrase",
            NodeKind::Number(_) => "Number",
            NodeKind::BoolLit(_) => "BoolLit",
            NodeKind::Fuzzy(_) => "Fuzzy",
            NodeKind::Prefix(_) => "Prefix",
            NodeKind::Wildcard(_) => "Wildcard",
            NodeKind::Range { .. } => "Range",
            NodeKind::Null => "Null",
            NodeKind::NotNull => "NotNull",
            NodeKind::Array { .. } => "Array",
            NodeKind::ExternalArray { .. } => "ExternalArray",
            NodeKind::Script(_) => "Script",
            NodeKind::Proximity { .. } => "Proximity",
            NodeKind::Expansion { .. } => "Expansion",
            NodeKind::Limit { .. } => "Limit",
            NodeKind::Visibility => "Visibility",
            NodeKind::Aggregate { .. } => "Aggregate",
            NodeKind::Suggest { .. } => "Suggest",
            NodeKind::Options { .. } => "Options",
            NodeKind::FieldLists { .. } => "FieldLists",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_operator_is_contains() {
        assert_eq!(Operator::default(), Operator::Contains);
    }

    #[test]
    fn test_verbatim_operators_skip_analysis() {
        assert!(Operator::Regex.is_verbatim());
        assert!(Operator::Concept.is_verbatim());
        assert!(Operator::FuzzyConcept.is_verbatim());
        assert!(!Operator::Eq.is_verbatim());
        assert!(!Operator::Ne.is_verbatim());
    }

    #[test]
    fn test_term_stream_single_pass() {
        let stream = TermStream::new(3, vec![TermValue::Long(1), TermValue::Long(2), TermValue::Long(3)].into_iter());
        assert_eq!(stream.expected(), 3);

        let iter = stream.take().expect("first take yields the iterator");
        assert_eq!(iter.count(), 3);
        assert!(stream.take().is_none(), "stream is not restartable");
    }

    #[test]
    fn test_term_stream_clone_shares_values() {
        let stream = TermStream::new(1, std::iter::once(TermValue::Str("x".into())));
        let alias = stream.clone();
        assert!(alias.take().is_some());
        assert!(stream.take().is_none());
    }

    #[test]
    fn test_kind_classification() {
        assert!(NodeKind::And.is_group());
        assert!(NodeKind::With.is_conjunctive());
        assert!(!NodeKind::Or.is_conjunctive());
        assert!(NodeKind::Word("a".into()).is_literal());
        assert!(!NodeKind::Phrase("a b".into()).is_literal());
        assert!(NodeKind::Phrase("a b".into()).is_analyzable_text());
        assert!(NodeKind::Limit { offset: 0, count: 10 }.is_directive());
        assert!(NodeKind::Proximity { distance: 2, ordered: true }.is_predicate());
    }
}
