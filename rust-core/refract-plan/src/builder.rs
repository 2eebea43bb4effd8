// SPDX-License-Identifier: PMPL-1.0-or-later
//! Recursive AST-to-plan translation.
//!
//! One dispatch function per node variant, driven by a single `match` over
//! [`NodeKind`]. The builder consumes the rewritten AST exactly once:
//! expansions are resolved through the injected [`ExpansionResolution`]
//! hook as they are encountered, external value streams are drained, and
//! every numeric literal is coerced against field metadata.

use refract_ast::{NodeId, NodeKind, Operator, TermValue, Tree};
use refract_links::{FieldType, IndexMetadata};
use serde_json::json;
use tracing::trace;

use crate::error::PlanError;
use crate::plan::{PlanValue, QueryPlan, TermsExecution};

/// Hook that turns an Expansion node into a locally-evaluable subtree.
///
/// Implemented by the rewriter's expansion resolver; the builder calls it
/// whenever it reaches an Expansion and then compiles the replacement. The
/// replacement may itself be an Expansion (chained joins), in which case
/// the builder resolves again until a leaf predicate is reached.
pub trait ExpansionResolution {
    fn resolve(&self, tree: &mut Tree, expansion: NodeId) -> Result<NodeId, PlanError>;
}

/// AST-to-plan builder.
pub struct PlanBuilder<'a> {
    metadata: &'a dyn IndexMetadata,
    expansions: Option<&'a dyn ExpansionResolution>,
}

impl<'a> PlanBuilder<'a> {
    pub fn new(metadata: &'a dyn IndexMetadata) -> Self {
        PlanBuilder {
            metadata,
            expansions: None,
        }
    }

    /// Attach the expansion resolution hook.
    pub fn with_expansions(mut self, expansions: &'a dyn ExpansionResolution) -> Self {
        self.expansions = Some(expansions);
        self
    }

    /// Compile the subtree rooted at `node`.
    pub fn build(&self, tree: &mut Tree, node: NodeId) -> Result<QueryPlan, PlanError> {
        self.build_node(tree, node, None)
    }

    fn build_node(
        &self,
        tree: &mut Tree,
        id: NodeId,
        scope: Option<&str>,
    ) -> Result<QueryPlan, PlanError> {
        match &tree[id].kind {
            NodeKind::Expansion { .. } => {
                let resolver = self
                    .expansions
                    .ok_or(PlanError::UnsupportedConstruct("unresolved Expansion"))?;
                let replacement = resolver.resolve(tree, id)?;
                self.build_node(tree, replacement, scope)
            }
            NodeKind::With => self.build_with(tree, id, scope),
            _ => {
                // wrap once when every contributing leaf shares one nested
                // path and we are not already inside that scope
                if let Some(path) = self.common_nested_path(tree, id) {
                    if scope != Some(path.as_str()) {
                        trace!(path = %path, "nested-wrapping subtree");
                        let inner = self.dispatch(tree, id, Some(&path))?;
                        return Ok(QueryPlan::nested(path, inner));
                    }
                }
                self.dispatch(tree, id, scope)
            }
        }
    }

    fn dispatch(
        &self,
        tree: &mut Tree,
        id: NodeId,
        scope: Option<&str>,
    ) -> Result<QueryPlan, PlanError> {
        let kind = tree[id].kind.clone();
        match kind {
            NodeKind::And | NodeKind::Must => {
                Ok(collapse_must(self.build_members(tree, id, scope)?))
            }
            NodeKind::Or | NodeKind::Should => {
                Ok(collapse_should(self.build_members(tree, id, scope)?))
            }
            NodeKind::Not | NodeKind::MustNot => {
                Ok(QueryPlan::bool_must_not(self.build_members(tree, id, scope)?))
            }
            NodeKind::Bool => self.build_bool(tree, id, scope),
            NodeKind::With => self.build_with(tree, id, scope),
            NodeKind::Expansion { .. } => self.build_node(tree, id, scope),

            NodeKind::Word(value) => self.build_word(tree, id, &value),
            NodeKind::Phrase(value) => self.build_phrase(tree, id, &value),
            NodeKind::Number(raw) => self.build_number(tree, id, &raw),
            NodeKind::BoolLit(value) => self.build_bool_lit(tree, id, value),
            NodeKind::Fuzzy(value) => self.build_fuzzy(tree, id, &value),
            NodeKind::Prefix(value) => self.build_prefix(tree, id, &value),
            NodeKind::Wildcard(value) => self.build_wildcard(tree, id, &value),
            NodeKind::Range { spec } => self.build_range(tree, id, &spec),
            NodeKind::Null => {
                let (field, boost) = field_of(tree, id, "Null")?;
                Ok(QueryPlan::bool_must_not(vec![exists(&field, boost)]))
            }
            NodeKind::NotNull => {
                let (field, boost) = field_of(tree, id, "NotNull")?;
                Ok(exists(&field, boost))
            }
            NodeKind::Array { and } => self.build_array(tree, id, and),
            NodeKind::ExternalArray { values } => self.build_external_array(tree, id, &values),
            NodeKind::Proximity { distance, ordered } => {
                self.build_proximity(tree, id, distance, ordered)
            }

            NodeKind::Script(_) => Err(PlanError::UnsupportedConstruct("Script")),
            other => Err(PlanError::UnsupportedConstruct(other.name())),
        }
    }

    fn build_members(
        &self,
        tree: &mut Tree,
        id: NodeId,
        scope: Option<&str>,
    ) -> Result<Vec<QueryPlan>, PlanError> {
        let children: Vec<NodeId> = tree[id].children().to_vec();
        let mut plans = Vec::with_capacity(children.len());
        for child in children {
            if tree[child].kind.is_directive() {
                continue;
            }
            plans.push(self.build_node(tree, child, scope)?);
        }
        Ok(plans)
    }

    fn build_bool(
        &self,
        tree: &mut Tree,
        id: NodeId,
        scope: Option<&str>,
    ) -> Result<QueryPlan, PlanError> {
        let clauses: Vec<NodeId> = tree[id].children().to_vec();
        let (mut must, mut should, mut must_not) = (Vec::new(), Vec::new(), Vec::new());
        for clause in clauses {
            let is_must = matches!(tree[clause].kind, NodeKind::Must);
            let is_should = matches!(tree[clause].kind, NodeKind::Should);
            let is_must_not = matches!(tree[clause].kind, NodeKind::MustNot);
            if is_must || is_should || is_must_not {
                let members = self.build_members(tree, clause, scope)?;
                if is_must {
                    must.extend(members);
                } else if is_should {
                    should.extend(members);
                } else {
                    must_not.extend(members);
                }
            } else {
                // a bare child counts as a must clause
                must.push(self.build_node(tree, clause, scope)?);
            }
        }
        Ok(QueryPlan::Bool {
            must,
            should,
            must_not,
        })
    }

    fn build_with(
        &self,
        tree: &mut Tree,
        id: NodeId,
        scope: Option<&str>,
    ) -> Result<QueryPlan, PlanError> {
        let path = self.validate_with_path(tree, id)?;
        if scope == Some(path.as_str()) {
            // already inside this nested scope; never double-wrap
            return Ok(collapse_must(self.build_members(tree, id, scope)?));
        }
        let inner = collapse_must(self.build_members(tree, id, Some(&path))?);
        Ok(QueryPlan::nested(path, inner))
    }

    /// All leaves of a `With` group must share one nested path.
    fn validate_with_path(&self, tree: &Tree, id: NodeId) -> Result<String, PlanError> {
        let mut paths = Vec::new();
        self.collect_leaf_paths(tree, id, &mut paths);
        let mut expected: Option<String> = None;
        for path in paths {
            let found = path.unwrap_or_else(|| "<not nested>".to_string());
            match &expected {
                None => expected = Some(found),
                Some(p) if *p == found => {}
                Some(p) => {
                    return Err(PlanError::MismatchedNestedPath {
                        expected: p.clone(),
                        found,
                    });
                }
            }
        }
        match expected {
            Some(path) if path != "<not nested>" => Ok(path),
            other => Err(PlanError::MismatchedNestedPath {
                expected: other.unwrap_or_else(|| "<empty>".to_string()),
                found: "<not nested>".to_string(),
            }),
        }
    }

    fn common_nested_path(&self, tree: &Tree, id: NodeId) -> Option<String> {
        let mut paths = Vec::new();
        self.collect_leaf_paths(tree, id, &mut paths);
        let mut iter = paths.into_iter();
        let first = iter.next()??;
        for path in iter {
            if path.as_deref() != Some(first.as_str()) {
                return None;
            }
        }
        Some(first)
    }

    fn collect_leaf_paths(&self, tree: &Tree, id: NodeId, out: &mut Vec<Option<String>>) {
        let node = &tree[id];
        if let NodeKind::Expansion { .. } = node.kind {
            // resolves to a predicate on the local join field
            out.push(None);
            return;
        }
        if node.kind.is_predicate() {
            out.push(
                node.fieldname
                    .as_deref()
                    .and_then(|f| self.metadata.nested_path(f)),
            );
            return;
        }
        for &child in node.children() {
            self.collect_leaf_paths(tree, child, out);
        }
    }

    // ------------------------------------------------------------------
    // Leaf predicates
    // ------------------------------------------------------------------

    fn build_word(&self, tree: &Tree, id: NodeId, value: &str) -> Result<QueryPlan, PlanError> {
        let (field, boost) = field_of(tree, id, "Word")?;
        let operator = tree[id].operator;
        match operator {
            Operator::Eq | Operator::Contains => Ok(QueryPlan::Term {
                value: self.coerce(&field, value),
                field,
                boost,
            }),
            Operator::Ne => Ok(QueryPlan::bool_must_not(vec![QueryPlan::Term {
                value: self.coerce(&field, value),
                field,
                boost,
            }])),
            Operator::Lt | Operator::Gt | Operator::Lte | Operator::Gte => {
                Ok(self.comparison_range(&field, value, operator, boost))
            }
            Operator::Regex => self.build_regexp(&field, value, boost),
            Operator::Concept => Ok(QueryPlan::concept(field, value, false)),
            Operator::FuzzyConcept => Ok(QueryPlan::concept(field, value, true)),
        }
    }

    fn build_phrase(&self, tree: &Tree, id: NodeId, value: &str) -> Result<QueryPlan, PlanError> {
        let (field, boost) = field_of(tree, id, "Phrase")?;
        // untokenized fields match phrases verbatim
        let positive = if self.metadata.search_analyzer(&field).as_deref() == Some("exact") {
            QueryPlan::Term {
                field: field.clone(),
                value: json!(value),
                boost,
            }
        } else {
            QueryPlan::MatchPhrase {
                field: field.clone(),
                value: value.to_string(),
                slop: 0,
                boost,
            }
        };
        let operator = tree[id].operator;
        match operator {
            Operator::Eq | Operator::Contains => Ok(positive),
            Operator::Ne => Ok(QueryPlan::bool_must_not(vec![positive])),
            Operator::Lt | Operator::Gt | Operator::Lte | Operator::Gte => {
                Ok(self.comparison_range(&field, value, operator, boost))
            }
            Operator::Regex => self.build_regexp(&field, value, boost),
            Operator::Concept => Ok(QueryPlan::concept(field, value, false)),
            Operator::FuzzyConcept => Ok(QueryPlan::concept(field, value, true)),
        }
    }

    fn build_number(&self, tree: &Tree, id: NodeId, raw: &str) -> Result<QueryPlan, PlanError> {
        let (field, boost) = field_of(tree, id, "Number")?;
        let operator = tree[id].operator;
        match operator {
            Operator::Eq | Operator::Contains => Ok(QueryPlan::Term {
                value: self.coerce(&field, raw),
                field,
                boost,
            }),
            Operator::Ne => Ok(QueryPlan::bool_must_not(vec![QueryPlan::Term {
                value: self.coerce(&field, raw),
                field,
                boost,
            }])),
            Operator::Lt | Operator::Gt | Operator::Lte | Operator::Gte => {
                Ok(self.comparison_range(&field, raw, operator, boost))
            }
            _ => Err(PlanError::UnsupportedOperator {
                operator: operator.to_string(),
                kind: "Number".into(),
            }),
        }
    }

    fn build_bool_lit(&self, tree: &Tree, id: NodeId, value: bool) -> Result<QueryPlan, PlanError> {
        let (field, boost) = field_of(tree, id, "BoolLit")?;
        let term = QueryPlan::Term {
            field,
            value: json!(value),
            boost,
        };
        let operator = tree[id].operator;
        match operator {
            Operator::Eq | Operator::Contains => Ok(term),
            Operator::Ne => Ok(QueryPlan::bool_must_not(vec![term])),
            _ => Err(PlanError::UnsupportedOperator {
                operator: operator.to_string(),
                kind: "BoolLit".into(),
            }),
        }
    }

    fn build_fuzzy(&self, tree: &Tree, id: NodeId, value: &str) -> Result<QueryPlan, PlanError> {
        let (field, boost) = field_of(tree, id, "Fuzzy")?;
        let fuzzy = QueryPlan::Fuzzy {
            field,
            value: value.to_string(),
            prefix_length: 0,
            boost,
        };
        match tree[id].operator {
            Operator::Eq | Operator::Contains => Ok(fuzzy),
            Operator::Ne => Ok(QueryPlan::bool_must_not(vec![fuzzy])),
            operator => Err(PlanError::UnsupportedOperator {
                operator: operator.to_string(),
                kind: "Fuzzy".into(),
            }),
        }
    }

    fn build_prefix(&self, tree: &Tree, id: NodeId, value: &str) -> Result<QueryPlan, PlanError> {
        let (field, boost) = field_of(tree, id, "Prefix")?;
        let prefix = QueryPlan::Prefix {
            field,
            value: value.to_string(),
            boost,
        };
        match tree[id].operator {
            Operator::Eq | Operator::Contains => Ok(prefix),
            Operator::Ne => Ok(QueryPlan::bool_must_not(vec![prefix])),
            operator => Err(PlanError::UnsupportedOperator {
                operator: operator.to_string(),
                kind: "Prefix".into(),
            }),
        }
    }

    fn build_wildcard(&self, tree: &Tree, id: NodeId, value: &str) -> Result<QueryPlan, PlanError> {
        let (field, boost) = field_of(tree, id, "Wildcard")?;
        let positive = match prefix_eligible(value) {
            Some(stem) => QueryPlan::Prefix {
                field,
                value: stem.to_string(),
                boost,
            },
            None => QueryPlan::Wildcard {
                field,
                value: value.to_string(),
                boost,
            },
        };
        match tree[id].operator {
            Operator::Eq | Operator::Contains => Ok(positive),
            Operator::Ne => Ok(QueryPlan::bool_must_not(vec![positive])),
            operator => Err(PlanError::UnsupportedOperator {
                operator: operator.to_string(),
                kind: "Wildcard".into(),
            }),
        }
    }

    fn build_regexp(&self, field: &str, pattern: &str, boost: f32) -> Result<QueryPlan, PlanError> {
        // reject unbuildable patterns here instead of at the backend
        if let Err(source) = regex::Regex::new(pattern) {
            return Err(PlanError::InvalidRegex {
                pattern: pattern.to_string(),
                source: Box::new(source),
            });
        }
        Ok(QueryPlan::Regexp {
            field: field.to_string(),
            value: pattern.to_string(),
            boost,
        })
    }

    fn build_range(&self, tree: &Tree, id: NodeId, spec: &str) -> Result<QueryPlan, PlanError> {
        let (field, boost) = field_of(tree, id, "Range")?;
        let parsed: RangeSpec =
            serde_json::from_str(spec).map_err(|e| PlanError::InvalidRange {
                spec: spec.to_string(),
                reason: e.to_string(),
            })?;
        if parsed.from.is_none() && parsed.to.is_none() {
            return Err(PlanError::InvalidRange {
                spec: spec.to_string(),
                reason: "missing both bounds".into(),
            });
        }
        let range = QueryPlan::Range {
            from: parsed.from.map(|v| self.coerce_json(&field, v)),
            to: parsed.to.map(|v| self.coerce_json(&field, v)),
            include_lower: parsed.include_lower,
            include_upper: parsed.include_upper,
            field,
            boost,
        };
        match tree[id].operator {
            Operator::Ne => Ok(QueryPlan::bool_must_not(vec![range])),
            _ => Ok(range),
        }
    }

    fn build_array(&self, tree: &Tree, id: NodeId, and: bool) -> Result<QueryPlan, PlanError> {
        let (field, boost) = field_of(tree, id, "Array")?;
        let mut values = Vec::with_capacity(tree[id].children().len());
        for &member in tree[id].children() {
            let value = match &tree[member].kind {
                NodeKind::Word(v) | NodeKind::Number(v) => self.coerce(&field, v),
                NodeKind::BoolLit(b) => json!(b),
                _ => return Err(PlanError::UnsupportedConstruct("non-literal array member")),
            };
            values.push(value);
        }
        let minimum_should_match = if and { values.len() as u32 } else { 1 };
        let terms = QueryPlan::Terms {
            field,
            values,
            execution: if and {
                TermsExecution::And
            } else {
                TermsExecution::Plain
            },
            minimum_should_match: Some(minimum_should_match),
            boost,
        };
        match tree[id].operator {
            Operator::Ne => Ok(QueryPlan::bool_must_not(vec![terms])),
            _ => Ok(terms),
        }
    }

    fn build_external_array(
        &self,
        tree: &Tree,
        id: NodeId,
        values: &refract_ast::TermStream,
    ) -> Result<QueryPlan, PlanError> {
        let (field, boost) = field_of(tree, id, "ExternalArray")?;
        let iter = values.take().ok_or(PlanError::StreamConsumed)?;
        let collected: Vec<PlanValue> = iter
            .map(|v| match v {
                TermValue::Int(i) => json!(i),
                TermValue::Long(l) => json!(l),
                TermValue::Str(s) => json!(s),
            })
            .collect();
        if collected.len() < values.expected() {
            return Err(PlanError::Underflow {
                expected: values.expected(),
                got: collected.len(),
            });
        }
        // large externally-sourced sets are served as a cached any-match
        // terms filter, so no minimum-should-match applies
        let terms = QueryPlan::Terms {
            field,
            values: collected,
            execution: TermsExecution::Plain,
            minimum_should_match: None,
            boost,
        };
        match tree[id].operator {
            Operator::Ne => Ok(QueryPlan::bool_must_not(vec![terms])),
            _ => Ok(terms),
        }
    }

    fn build_proximity(
        &self,
        tree: &Tree,
        id: NodeId,
        distance: u32,
        ordered: bool,
    ) -> Result<QueryPlan, PlanError> {
        let (field, _) = field_of(tree, id, "Proximity")?;
        let mut clauses = Vec::with_capacity(tree[id].children().len());
        for &child in tree[id].children() {
            clauses.push(self.build_span(tree, child, &field)?);
        }
        Ok(QueryPlan::SpanNear {
            clauses,
            slop: distance,
            in_order: ordered,
        })
    }

    fn build_span(&self, tree: &Tree, id: NodeId, group_field: &str) -> Result<QueryPlan, PlanError> {
        let node = &tree[id];
        let field = node
            .fieldname
            .clone()
            .unwrap_or_else(|| group_field.to_string());
        let boost = node.boost;
        match &node.kind {
            NodeKind::Word(value) => {
                if node.operator == Operator::Regex {
                    let regexp = self.build_regexp(&field, value, boost)?;
                    return Ok(QueryPlan::SpanMultiTerm {
                        inner: Box::new(regexp),
                    });
                }
                Ok(QueryPlan::Term {
                    field,
                    value: json!(value),
                    boost,
                })
            }
            NodeKind::Prefix(value) => Ok(QueryPlan::SpanMultiTerm {
                inner: Box::new(QueryPlan::Prefix {
                    field,
                    value: value.clone(),
                    boost,
                }),
            }),
            NodeKind::Wildcard(value) => {
                let inner = match prefix_eligible(value) {
                    Some(stem) => QueryPlan::Prefix {
                        field,
                        value: stem.to_string(),
                        boost,
                    },
                    None => QueryPlan::Wildcard {
                        field,
                        value: value.clone(),
                        boost,
                    },
                };
                Ok(QueryPlan::SpanMultiTerm {
                    inner: Box::new(inner),
                })
            }
            NodeKind::Fuzzy(value) => Ok(QueryPlan::SpanMultiTerm {
                inner: Box::new(QueryPlan::Fuzzy {
                    field,
                    value: value.clone(),
                    prefix_length: 0,
                    boost,
                }),
            }),
            NodeKind::Phrase(value) => {
                // a phrase inside a span group is an exact ordered run
                let clauses = value
                    .split_whitespace()
                    .map(|word| QueryPlan::Term {
                        field: field.clone(),
                        value: json!(word),
                        boost,
                    })
                    .collect();
                Ok(QueryPlan::SpanNear {
                    clauses,
                    slop: 0,
                    in_order: true,
                })
            }
            NodeKind::Or => {
                let children: Vec<NodeId> = node.children().to_vec();
                let mut clauses = Vec::with_capacity(children.len());
                for child in children {
                    clauses.push(self.build_span(tree, child, &field)?);
                }
                Ok(QueryPlan::SpanOr { clauses })
            }
            NodeKind::Proximity { distance, ordered } => {
                let (distance, ordered) = (*distance, *ordered);
                let children: Vec<NodeId> = node.children().to_vec();
                let mut clauses = Vec::with_capacity(children.len());
                for child in children {
                    clauses.push(self.build_span(tree, child, &field)?);
                }
                Ok(QueryPlan::SpanNear {
                    clauses,
                    slop: distance,
                    in_order: ordered,
                })
            }
            other => Err(PlanError::UnsupportedConstruct(other.name())),
        }
    }

    // ------------------------------------------------------------------
    // Value coercion
    // ------------------------------------------------------------------

    fn comparison_range(
        &self,
        field: &str,
        raw: &str,
        operator: Operator,
        boost: f32,
    ) -> QueryPlan {
        let value = self.coerce(field, raw);
        let (from, to, include_lower, include_upper) = match operator {
            Operator::Lt => (None, Some(value), true, false),
            Operator::Lte => (None, Some(value), true, true),
            Operator::Gt => (Some(value), None, false, true),
            _ => (Some(value), None, true, true), // Gte
        };
        QueryPlan::Range {
            field: field.to_string(),
            from,
            to,
            include_lower,
            include_upper,
            boost,
        }
    }

    /// Coerce a raw literal to the field's declared type. Unknown fields
    /// cascade int → long → float → double before falling back to text.
    fn coerce(&self, field: &str, raw: &str) -> PlanValue {
        match self.metadata.field_type(field) {
            FieldType::Integer => raw
                .parse::<i32>()
                .map(|v| json!(v))
                .unwrap_or_else(|_| json!(raw)),
            FieldType::Long => raw
                .parse::<i64>()
                .map(|v| json!(v))
                .unwrap_or_else(|_| json!(raw)),
            FieldType::Float => parse_finite_f32(raw)
                .map(|v| json!(v))
                .unwrap_or_else(|| json!(raw)),
            FieldType::Double => parse_finite_f64(raw)
                .map(|v| json!(v))
                .unwrap_or_else(|| json!(raw)),
            FieldType::Text => json!(raw),
            FieldType::Unknown => {
                if let Ok(v) = raw.parse::<i32>() {
                    json!(v)
                } else if let Ok(v) = raw.parse::<i64>() {
                    json!(v)
                } else if let Some(v) = parse_finite_f32(raw) {
                    json!(v)
                } else if let Some(v) = parse_finite_f64(raw) {
                    json!(v)
                } else {
                    json!(raw)
                }
            }
        }
    }

    /// Range bounds arrive as JSON; string bounds on numeric fields are
    /// re-coerced, everything else passes through.
    fn coerce_json(&self, field: &str, value: PlanValue) -> PlanValue {
        match value {
            PlanValue::String(s) => self.coerce(field, &s),
            other => other,
        }
    }
}

#[derive(serde::Deserialize)]
struct RangeSpec {
    #[serde(default)]
    from: Option<PlanValue>,
    #[serde(default)]
    to: Option<PlanValue>,
    #[serde(default = "default_true")]
    include_lower: bool,
    #[serde(default = "default_true")]
    include_upper: bool,
}

fn default_true() -> bool {
    true
}

fn field_of(tree: &Tree, id: NodeId, kind: &str) -> Result<(String, f32), PlanError> {
    let node = &tree[id];
    let field = node.fieldname.clone().ok_or_else(|| PlanError::MissingField {
        kind: kind.to_string(),
    })?;
    Ok((field, node.boost))
}

fn exists(field: &str, boost: f32) -> QueryPlan {
    QueryPlan::Wildcard {
        field: field.to_string(),
        value: "*".to_string(),
        boost,
    }
}

fn parse_finite_f32(raw: &str) -> Option<f32> {
    raw.parse::<f32>().ok().filter(|v| v.is_finite())
}

fn parse_finite_f64(raw: &str) -> Option<f64> {
    raw.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// `bob*` is a prefix query; anything with `?` or an interior `*` is not.
fn prefix_eligible(value: &str) -> Option<&str> {
    if value.len() > 1
        && value.ends_with('*')
        && value.matches('*').count() == 1
        && !value.contains('?')
    {
        Some(&value[..value.len() - 1])
    } else {
        None
    }
}

fn collapse_must(mut clauses: Vec<QueryPlan>) -> QueryPlan {
    if clauses.len() == 1 {
        clauses.remove(0)
    } else {
        QueryPlan::bool_must(clauses)
    }
}

fn collapse_should(mut clauses: Vec<QueryPlan>) -> QueryPlan {
    if clauses.len() == 1 {
        clauses.remove(0)
    } else {
        QueryPlan::bool_should(clauses)
    }
}
