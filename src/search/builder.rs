//! Boolean query construction from extracted filters.
//!
//! Output shape of a single search:
//!
//! ```text
//! bool
//! ├── must:   [ text clause ]                      (only with `q`)
//! └── filter: [ bool
//!               ├── must:     [ permission, terms..., nested..., range... ]
//!               └── must_not: [ terms..., presence groups... ] ]
//! ```
//!
//! Term filters on fields below one nested path share a single `nested` node
//! in `must`: positive terms go under its inner `must`, negated terms under its
//! inner `must_not`, so all of them constrain the same nested object. Range
//! filters on a nested path get their own `nested` node and are never folded
//! into a term node.

use super::error::{SearchError, SearchResult};
use super::extractor::{ExtractedFilters, FieldFilter, Presence, RangeFilter};
use super::normalizer::LINK_SUFFIX;
use super::query::{BoolQuery, Occur, QueryNode};
use crate::schema::{IndexMapping, TypeRegistry};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeSet;
use tracing::debug;

/// Boolean filter plus the optional free-text clause
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub filter: BoolQuery,
    pub text: Option<QueryNode>,
}

impl CompiledQuery {
    /// Full query node sent to the engine
    pub fn to_node(&self) -> QueryNode {
        let mut outer = BoolQuery::new();
        if let Some(text) = &self.text {
            outer.must.push(text.clone());
        }
        outer.filter.push(QueryNode::Bool(self.filter.clone()));
        QueryNode::Bool(outer)
    }
}

/// Builds query trees against one index mapping
pub struct QueryBuilder<'a> {
    mapping: &'a IndexMapping,
}

impl<'a> QueryBuilder<'a> {
    pub fn new(mapping: &'a IndexMapping) -> Self {
        Self { mapping }
    }

    pub fn build(&self, filters: &ExtractedFilters) -> SearchResult<CompiledQuery> {
        let mut filter = BoolQuery::new();
        filter
            .must
            .push(QueryNode::Permission(filters.permission.clone()));

        for field in &filters.baseline {
            let mut seeded = BoolQuery::new();
            self.add_field_filter(&mut seeded, field)?;
            for occur in [Occur::Must, Occur::MustNot] {
                let clauses = std::mem::take(seeded.slot_mut(occur));
                filter.slot_mut(occur).extend(
                    clauses
                        .into_iter()
                        .map(|clause| QueryNode::Baseline(Box::new(clause))),
                );
            }
        }

        for field in &filters.fields {
            self.add_field_filter(&mut filter, field)?;
        }

        for range in &filters.ranges {
            self.add_range(&mut filter, range)?;
        }

        let text = filters
            .text
            .as_ref()
            .map(|query| QueryNode::Text { query: query.clone() });

        Ok(CompiledQuery { filter, text })
    }

    /// One clause per term set: `terms` on flat fields, `match` (or an OR of
    /// matches) inside nested scopes
    fn term_clause(&self, field: &str, terms: &BTreeSet<String>, nested: bool) -> Option<QueryNode> {
        if terms.is_empty() {
            return None;
        }

        if !nested {
            return Some(QueryNode::Terms {
                field: field.to_string(),
                values: terms.iter().cloned().collect(),
            });
        }

        let mut matches: Vec<QueryNode> = terms
            .iter()
            .map(|term| QueryNode::Match {
                field: field.to_string(),
                value: term.clone(),
            })
            .collect();

        if matches.len() == 1 {
            matches.pop()
        } else {
            Some(QueryNode::Bool(BoolQuery::any_of(matches)))
        }
    }

    fn add_field_filter(&self, filter: &mut BoolQuery, field: &FieldFilter) -> SearchResult<()> {
        let nested_path = self.mapping.nested_path(&field.query_field);
        let missing = QueryNode::Missing {
            field: field.query_field.clone(),
            nested_path: nested_path.map(str::to_string),
        };

        let positive = self.term_clause(&field.query_field, &field.must_terms, nested_path.is_some());
        let negative =
            self.term_clause(&field.query_field, &field.must_not_terms, nested_path.is_some());

        match (positive, field.presence) {
            (positive, Presence::RequireMissing) => {
                let mut options: Vec<QueryNode> = positive
                    .map(|clause| wrap_nested(nested_path, Occur::Must, clause))
                    .into_iter()
                    .collect();
                options.push(missing.clone());
                filter.must.push(QueryNode::Bool(BoolQuery::any_of(options)));
            }
            (Some(clause), _) => self.place(filter, Occur::Must, nested_path, clause)?,
            (None, _) => {}
        }

        match (negative, field.presence, nested_path) {
            (negative, Presence::ExcludeMissing, None) => {
                let mut options: Vec<QueryNode> = negative.into_iter().collect();
                options.push(missing);
                filter.must_not.push(QueryNode::Bool(BoolQuery::any_of(options)));
            }
            (negative, Presence::ExcludeMissing, Some(path)) => {
                filter.must_not.push(missing);
                if let Some(clause) = negative {
                    self.place(filter, Occur::MustNot, Some(path), clause)?;
                }
            }
            (Some(clause), _, _) => self.place(filter, Occur::MustNot, nested_path, clause)?,
            (None, _, _) => {}
        }

        Ok(())
    }

    fn place(
        &self,
        filter: &mut BoolQuery,
        occur: Occur,
        nested_path: Option<&str>,
        clause: QueryNode,
    ) -> SearchResult<()> {
        match nested_path {
            None => {
                filter.slot_mut(occur).push(clause);
                Ok(())
            }
            Some(path) => merge_nested(&mut filter.must, path, occur, clause),
        }
    }

    fn add_range(&self, filter: &mut BoolQuery, range: &RangeFilter) -> SearchResult<()> {
        if range.gte.is_none() && range.lte.is_none() {
            return Ok(());
        }

        let clause = QueryNode::Range(range.clone());
        match self.mapping.nested_path(&range.query_field) {
            None => filter.must.push(clause),
            Some(path) => merge_nested_range(&mut filter.must, path, clause)?,
        }
        Ok(())
    }
}

fn wrap_nested(path: Option<&str>, occur: Occur, clause: QueryNode) -> QueryNode {
    match path {
        Some(path) => QueryNode::nested(path, BoolQuery::with(occur, clause)),
        None => clause,
    }
}

/// A nested node that only holds range clauses
fn is_range_scope(query: &QueryNode) -> bool {
    match query {
        QueryNode::Bool(inner) => {
            !inner.must.is_empty()
                && inner.must_not.is_empty()
                && inner.should.is_empty()
                && inner.must.iter().all(|n| matches!(n, QueryNode::Range(_)))
        }
        _ => false,
    }
}

/// Fold `clause` into the existing `nested` node for `path` in `slot`, or
/// create one. The clause lands under the inner `occur` key, which may differ
/// from the keys already present in that node.
pub fn merge_nested(
    slot: &mut Vec<QueryNode>,
    path: &str,
    occur: Occur,
    clause: QueryNode,
) -> SearchResult<()> {
    for node in slot.iter_mut() {
        let QueryNode::Nested {
            path: existing,
            query,
        } = node
        else {
            continue;
        };
        if existing != path || is_range_scope(query) {
            continue;
        }

        let QueryNode::Bool(inner) = query.as_mut() else {
            return Err(SearchError::InvalidState(format!(
                "nested node for {} has a non-boolean body",
                path
            )));
        };

        if inner.slot(occur).is_empty() && !inner.slot(occur.other()).is_empty() {
            debug!(
                path = %path,
                key = occur.key(),
                "Attaching clause under second key of existing nested node"
            );
        }
        inner.slot_mut(occur).push(clause);
        return Ok(());
    }

    slot.push(QueryNode::nested(path, BoolQuery::with(occur, clause)));
    Ok(())
}

fn merge_nested_range(slot: &mut Vec<QueryNode>, path: &str, clause: QueryNode) -> SearchResult<()> {
    for node in slot.iter_mut() {
        if let QueryNode::Nested {
            path: existing,
            query,
        } = node
        {
            if existing == path && is_range_scope(query) {
                if let QueryNode::Bool(inner) = query.as_mut() {
                    inner.must.push(clause);
                    return Ok(());
                }
            }
        }
    }

    slot.push(QueryNode::nested(path, BoolQuery::with(Occur::Must, clause)));
    Ok(())
}

/// One sort key
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SortClause {
    pub field: String,
    pub order: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unmapped_type: Option<String>,
}

impl SortClause {
    pub fn to_json(&self) -> Value {
        let mut spec = Map::new();
        spec.insert("order".to_string(), json!(self.order));
        if let Some(unmapped) = &self.unmapped_type {
            spec.insert("unmapped_type".to_string(), json!(unmapped));
            spec.insert("missing".to_string(), json!("_last"));
        }
        json!({ self.field.as_str(): spec })
    }
}

/// Engine sort clauses for the `sort` parameters.
///
/// Without explicit sort, text searches sort by relevance and plain browsing by
/// creation date, newest first.
pub fn build_sort(
    sort_params: &[&str],
    registry: &TypeRegistry,
    types: &[String],
    has_text: bool,
) -> Vec<SortClause> {
    let mut clauses = Vec::new();

    for token in sort_params.iter().filter(|t| !t.is_empty()) {
        let (field, order) = match token.strip_prefix('-') {
            Some(field) => (field, "desc"),
            None => (*token, "asc"),
        };

        if field == "_score" {
            clauses.push(SortClause {
                field: field.to_string(),
                order: order.to_string(),
                unmapped_type: None,
            });
            continue;
        }

        let schema_field = field.strip_suffix(LINK_SUFFIX).unwrap_or(field);
        let clause = match registry.property(types, schema_field) {
            Some(p) if p.is_link() => SortClause {
                field: format!("embedded.{}.raw", field),
                order: order.to_string(),
                unmapped_type: Some("keyword".to_string()),
            },
            Some(p) if p.is_numeric() => SortClause {
                field: format!("embedded.{}", field),
                order: order.to_string(),
                unmapped_type: Some("double".to_string()),
            },
            Some(p) if p.is_date() => SortClause {
                field: format!("embedded.{}", field),
                order: order.to_string(),
                unmapped_type: Some("date".to_string()),
            },
            _ => SortClause {
                field: format!("embedded.{}.raw", field),
                order: order.to_string(),
                unmapped_type: Some("keyword".to_string()),
            },
        };
        clauses.push(clause);
    }

    if clauses.is_empty() {
        if has_text {
            clauses.push(SortClause {
                field: "_score".to_string(),
                order: "desc".to_string(),
                unmapped_type: None,
            });
        } else {
            clauses.push(SortClause {
                field: "embedded.date_created".to_string(),
                order: "desc".to_string(),
                unmapped_type: Some("date".to_string()),
            });
        }
    }

    clauses
}
