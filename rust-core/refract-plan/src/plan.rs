// SPDX-License-Identifier: PMPL-1.0-or-later
//! Backend-neutral query-plan tree.
//!
//! Node kinds map one-to-one onto the primitives every full-text backend
//! exposes; the backend serializer renders them into its native syntax.

use serde::{Deserialize, Serialize};

/// Scalar plan value: coerced numbers, strings and booleans.
pub type PlanValue = serde_json::Value;

/// How a [`QueryPlan::Terms`] set matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TermsExecution {
    /// Any member may match (disjunctive set).
    Plain,
    /// Every member must match (conjunctive set).
    And,
}

/// Fixed parameters for concept ("more-like-this") queries.
pub const CONCEPT_MAX_QUERY_TERMS: u32 = 80;
pub const CONCEPT_MIN_WORD_LEN: u32 = 3;
pub const CONCEPT_MIN_TERM_FREQ: u32 = 1;

/// Stop words excluded from concept term selection.
pub const CONCEPT_STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "if", "in", "into", "is", "it",
    "no", "not", "of", "on", "or", "such", "that", "the", "their", "then", "there", "these",
    "they", "this", "to", "was", "will", "with",
];

/// One node of the compiled query plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryPlan {
    Term {
        field: String,
        value: PlanValue,
        boost: f32,
    },
    Terms {
        field: String,
        values: Vec<PlanValue>,
        execution: TermsExecution,
        /// Present for literal value sets (terms-query form); absent for
        /// large external sets served as a cached terms filter.
        minimum_should_match: Option<u32>,
        boost: f32,
    },
    Range {
        field: String,
        from: Option<PlanValue>,
        to: Option<PlanValue>,
        include_lower: bool,
        include_upper: bool,
        boost: f32,
    },
    Wildcard {
        field: String,
        value: String,
        boost: f32,
    },
    Prefix {
        field: String,
        value: String,
        boost: f32,
    },
    Regexp {
        field: String,
        value: String,
        boost: f32,
    },
    Fuzzy {
        field: String,
        value: String,
        prefix_length: u32,
        boost: f32,
    },
    MatchPhrase {
        field: String,
        value: String,
        slop: u32,
        boost: f32,
    },
    SpanNear {
        clauses: Vec<QueryPlan>,
        slop: u32,
        in_order: bool,
    },
    SpanOr {
        clauses: Vec<QueryPlan>,
    },
    SpanMultiTerm {
        inner: Box<QueryPlan>,
    },
    Bool {
        must: Vec<QueryPlan>,
        should: Vec<QueryPlan>,
        must_not: Vec<QueryPlan>,
    },
    Nested {
        path: String,
        query: Box<QueryPlan>,
    },
    ConceptLike {
        field: String,
        value: String,
        max_query_terms: u32,
        min_word_len: u32,
        min_term_freq: u32,
        stop_words: Vec<String>,
        fuzzy: bool,
    },
}

impl QueryPlan {
    pub fn bool_must(clauses: Vec<QueryPlan>) -> QueryPlan {
        QueryPlan::Bool {
            must: clauses,
            should: Vec::new(),
            must_not: Vec::new(),
        }
    }

    pub fn bool_should(clauses: Vec<QueryPlan>) -> QueryPlan {
        QueryPlan::Bool {
            must: Vec::new(),
            should: clauses,
            must_not: Vec::new(),
        }
    }

    pub fn bool_must_not(clauses: Vec<QueryPlan>) -> QueryPlan {
        QueryPlan::Bool {
            must: Vec::new(),
            should: Vec::new(),
            must_not: clauses,
        }
    }

    pub fn nested(path: impl Into<String>, query: QueryPlan) -> QueryPlan {
        QueryPlan::Nested {
            path: path.into(),
            query: Box::new(query),
        }
    }

    /// Combine this plan with a row-exclusion filter: matching rows must
    /// satisfy the query and must not match the filter.
    pub fn with_exclusion(self, filter: QueryPlan) -> QueryPlan {
        QueryPlan::Bool {
            must: vec![self],
            should: Vec::new(),
            must_not: vec![filter],
        }
    }

    /// The concept query emitted for CONCEPT / FUZZY_CONCEPT operators.
    pub fn concept(field: impl Into<String>, value: impl Into<String>, fuzzy: bool) -> QueryPlan {
        QueryPlan::ConceptLike {
            field: field.into(),
            value: value.into(),
            max_query_terms: CONCEPT_MAX_QUERY_TERMS,
            min_word_len: CONCEPT_MIN_WORD_LEN,
            min_term_freq: CONCEPT_MIN_TERM_FREQ,
            stop_words: CONCEPT_STOP_WORDS.iter().map(|s| s.to_string()).collect(),
            fuzzy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plan_json_roundtrip() {
        let plan = QueryPlan::Bool {
            must: vec![QueryPlan::Term {
                field: "tag".into(),
                value: json!("rust"),
                boost: 1.0,
            }],
            should: vec![QueryPlan::Range {
                field: "score".into(),
                from: Some(json!(10)),
                to: None,
                include_lower: true,
                include_upper: true,
                boost: 2.0,
            }],
            must_not: vec![],
        };

        let encoded = serde_json::to_string(&plan).unwrap();
        let decoded: QueryPlan = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, plan);
    }

    #[test]
    fn test_terms_execution_serialization() {
        let json = serde_json::to_string(&TermsExecution::And).unwrap();
        assert_eq!(json, "\"and\"");
        let json = serde_json::to_string(&TermsExecution::Plain).unwrap();
        assert_eq!(json, "\"plain\"");
    }

    #[test]
    fn test_exclusion_wrap() {
        let plan = QueryPlan::Term {
            field: "f".into(),
            value: json!("v"),
            boost: 1.0,
        };
        let filter = QueryPlan::Term {
            field: "_hidden".into(),
            value: json!(true),
            boost: 1.0,
        };

        match plan.clone().with_exclusion(filter) {
            QueryPlan::Bool {
                must,
                should,
                must_not,
            } => {
                assert_eq!(must, vec![plan]);
                assert!(should.is_empty());
                assert_eq!(must_not.len(), 1);
            }
            other => panic!("expected Bool wrapper, got {other:?}"),
        }
    }

    #[test]
    fn test_concept_defaults() {
        match QueryPlan::concept("body", "query engines", true) {
            QueryPlan::ConceptLike {
                max_query_terms,
                min_word_len,
                min_term_freq,
                stop_words,
                fuzzy,
                ..
            } => {
                assert_eq!(max_query_terms, 80);
                assert_eq!(min_word_len, 3);
                assert_eq!(min_term_freq, 1);
                assert!(stop_words.contains(&"the".to_string()));
                assert!(fuzzy);
            }
            other => panic!("expected ConceptLike, got {other:?}"),
        }
    }
}
