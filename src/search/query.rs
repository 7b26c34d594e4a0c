//! Query tree intermediate representation and its engine JSON encoding

use super::extractor::RangeFilter;
use super::permission::PermissionFilter;
use serde_json::{json, Map, Value};

/// Fields searched by the free-text clause
pub const TEXT_FIELDS: &[&str] = &["embedded.*"];

/// Boolean clause slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occur {
    Must,
    MustNot,
    Should,
    Filter,
}

impl Occur {
    pub fn key(self) -> &'static str {
        match self {
            Occur::Must => "must",
            Occur::MustNot => "must_not",
            Occur::Should => "should",
            Occur::Filter => "filter",
        }
    }

    /// The opposite polarity slot
    pub fn other(self) -> Occur {
        match self {
            Occur::Must => Occur::MustNot,
            Occur::MustNot => Occur::Must,
            other => other,
        }
    }
}

/// Boolean node
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoolQuery {
    pub must: Vec<QueryNode>,
    pub must_not: Vec<QueryNode>,
    pub should: Vec<QueryNode>,
    pub filter: Vec<QueryNode>,
    pub minimum_should_match: Option<u32>,
}

impl BoolQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single-clause boolean
    pub fn with(occur: Occur, clause: QueryNode) -> Self {
        let mut query = Self::default();
        query.slot_mut(occur).push(clause);
        query
    }

    /// OR of `clauses` (at least one must match)
    pub fn any_of(clauses: Vec<QueryNode>) -> Self {
        Self {
            should: clauses,
            minimum_should_match: Some(1),
            ..Default::default()
        }
    }

    pub fn slot(&self, occur: Occur) -> &Vec<QueryNode> {
        match occur {
            Occur::Must => &self.must,
            Occur::MustNot => &self.must_not,
            Occur::Should => &self.should,
            Occur::Filter => &self.filter,
        }
    }

    pub fn slot_mut(&mut self, occur: Occur) -> &mut Vec<QueryNode> {
        match occur {
            Occur::Must => &mut self.must,
            Occur::MustNot => &mut self.must_not,
            Occur::Should => &mut self.should,
            Occur::Filter => &mut self.filter,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.must.is_empty()
            && self.must_not.is_empty()
            && self.should.is_empty()
            && self.filter.is_empty()
    }

    pub fn to_json(&self) -> Value {
        let mut body = Map::new();
        for occur in [Occur::Must, Occur::MustNot, Occur::Should, Occur::Filter] {
            let clauses = self.slot(occur);
            if !clauses.is_empty() {
                body.insert(
                    occur.key().to_string(),
                    Value::Array(clauses.iter().map(QueryNode::to_json).collect()),
                );
            }
        }
        if let Some(min) = self.minimum_should_match {
            body.insert("minimum_should_match".to_string(), json!(min));
        }
        json!({ "bool": body })
    }
}

/// One node of the compiled query tree
#[derive(Debug, Clone, PartialEq)]
pub enum QueryNode {
    Bool(BoolQuery),
    /// Any of `values` on a flat keyword field
    Terms { field: String, values: Vec<String> },
    /// Exact value match, used inside nested scopes
    Match { field: String, value: String },
    Range(RangeFilter),
    Exists { field: String },
    /// Document has no value for `field`. `nested_path` is set for nested fields,
    /// where absence has to be checked through the nested scope.
    Missing {
        field: String,
        nested_path: Option<String>,
    },
    Nested { path: String, query: Box<QueryNode> },
    /// The caller's permission filter. Never merged with other clauses.
    Permission(PermissionFilter),
    /// Visibility exclusion seeded for every search (hidden statuses and
    /// internal types). Facets never drop it.
    Baseline(Box<QueryNode>),
    Text { query: String },
    MatchAll,
}

impl QueryNode {
    pub fn nested(path: impl Into<String>, query: BoolQuery) -> Self {
        QueryNode::Nested {
            path: path.into(),
            query: Box::new(QueryNode::Bool(query)),
        }
    }

    /// Physical field a leaf node targets
    pub fn field(&self) -> Option<&str> {
        match self {
            QueryNode::Terms { field, .. }
            | QueryNode::Match { field, .. }
            | QueryNode::Exists { field }
            | QueryNode::Missing { field, .. } => Some(field),
            QueryNode::Range(range) => Some(&range.query_field),
            _ => None,
        }
    }

    /// Whether any leaf below this node satisfies `pred` on its field
    pub fn references(&self, pred: &dyn Fn(&str) -> bool) -> bool {
        match self {
            QueryNode::Bool(b) => [&b.must, &b.must_not, &b.should, &b.filter]
                .into_iter()
                .flatten()
                .any(|n| n.references(pred)),
            QueryNode::Nested { query, .. } | QueryNode::Baseline(query) => query.references(pred),
            other => other.field().map(pred).unwrap_or(false),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            QueryNode::Bool(b) => b.to_json(),
            QueryNode::Terms { field, values } => json!({ "terms": { field.as_str(): values } }),
            QueryNode::Match { field, value } => json!({ "match": { field.as_str(): value } }),
            QueryNode::Range(range) => {
                let mut bounds = Map::new();
                if let Some(gte) = &range.gte {
                    bounds.insert("gte".to_string(), gte.to_json());
                }
                if let Some(lte) = &range.lte {
                    bounds.insert("lte".to_string(), lte.to_json());
                }
                if let Some(format) = &range.date_format {
                    bounds.insert("format".to_string(), json!(format));
                }
                json!({ "range": { range.query_field.as_str(): bounds } })
            }
            QueryNode::Exists { field } => json!({ "exists": { "field": field } }),
            QueryNode::Missing { field, nested_path } => {
                let exists = json!({ "exists": { "field": field } });
                let existence = match nested_path {
                    Some(path) => json!({ "nested": { "path": path, "query": exists } }),
                    None => exists,
                };
                json!({ "bool": { "must_not": [existence] } })
            }
            QueryNode::Nested { path, query } => {
                json!({ "nested": { "path": path, "query": query.to_json() } })
            }
            QueryNode::Permission(permission) => permission.to_json(),
            QueryNode::Baseline(inner) => inner.to_json(),
            QueryNode::Text { query } => json!({
                "simple_query_string": {
                    "query": query,
                    "fields": TEXT_FIELDS,
                    "default_operator": "AND"
                }
            }),
            QueryNode::MatchAll => json!({ "match_all": {} }),
        }
    }
}
