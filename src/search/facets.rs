//! Facet derivation, aggregation requests and aggregation result parsing

use super::builder::CompiledQuery;
use super::extractor::{range_field, term_field};
use super::normalizer::NormalizedQuery;
use super::params::{is_reserved, NO_VALUE};
use super::query::{BoolQuery, QueryNode};
use crate::schema::{IndexMapping, RangeBucket, TypeRegistry};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeSet;

/// Name of the outer aggregation that ignores the main query and result window
pub const GLOBAL_AGG: &str = "all_items";
pub const PRIMARY_AGG: &str = "primary_agg";
pub const REVERSE_NESTED_AGG: &str = "primary_agg_reverse_nested";
pub const SUB_TERMS_AGG: &str = "sub_terms";

pub const TYPE_FACET: &str = "type";
const TYPE_FACET_TITLE: &str = "Data Type";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationType {
    Terms,
    Nested,
    Stats,
    Range,
}

/// One facet to compute for a request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FacetSpec {
    pub field: String,
    pub title: String,
    pub order: i64,
    pub aggregation_type: AggregationType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grouping_key: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ranges: Vec<RangeBucket>,
}

impl FacetSpec {
    fn terms(field: impl Into<String>, title: impl Into<String>, order: i64) -> Self {
        Self {
            field: field.into(),
            title: title.into(),
            order,
            aggregation_type: AggregationType::Terms,
            grouping_key: None,
            ranges: Vec::new(),
        }
    }

    /// Whether a physical query field belongs to this facet
    pub fn covers(&self, query_field: &str) -> bool {
        query_field == term_field(&self.field) || query_field == range_field(&self.field)
    }

    fn physical_field(&self) -> String {
        match self.aggregation_type {
            AggregationType::Stats | AggregationType::Range => range_field(&self.field),
            AggregationType::Terms | AggregationType::Nested => term_field(&self.field),
        }
    }
}

fn parse_aggregation_type(name: Option<&str>) -> AggregationType {
    match name.map(str::to_ascii_lowercase).as_deref() {
        Some("stats") => AggregationType::Stats,
        Some("range") => AggregationType::Range,
        _ => AggregationType::Terms,
    }
}

/// Schema-declared facets shared by every requested type
fn schema_facets(registry: &TypeRegistry, types: &[String]) -> Vec<FacetSpec> {
    let schemas: Vec<_> = types.iter().filter_map(|t| registry.get(t)).collect();
    let Some(first) = schemas.first() else {
        return Vec::new();
    };

    let common: BTreeSet<&String> = first
        .facets
        .keys()
        .filter(|field| schemas.iter().all(|s| s.facets.contains_key(*field)))
        .collect();

    let mut facets: Vec<FacetSpec> = first
        .facets
        .iter()
        .filter(|(field, config)| common.contains(field) && !config.disabled)
        .map(|(field, config)| {
            let title = config
                .title
                .clone()
                .or_else(|| registry.property(types, field).and_then(|p| p.title.clone()))
                .unwrap_or_else(|| field.clone());
            FacetSpec {
                field: field.clone(),
                title,
                order: config.order.unwrap_or(i64::MAX),
                aggregation_type: parse_aggregation_type(config.aggregation_type.as_deref()),
                grouping_key: config.grouping.clone(),
                ranges: config.ranges.clone(),
            }
        })
        .collect();

    facets.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.field.cmp(&b.field)));
    facets
}

/// Facet for a field named in the request rather than in the schema
fn ad_hoc_facet(registry: &TypeRegistry, types: &[String], key: &str) -> FacetSpec {
    let base = key.strip_suffix('!').unwrap_or(key);
    let range_base = base
        .strip_suffix(".from")
        .or_else(|| base.strip_suffix(".to"))
        .filter(|field| {
            registry
                .property(types, field)
                .map(|p| p.is_rangeable())
                .unwrap_or(false)
        });

    let field = range_base.unwrap_or(base);
    let property = registry.property(types, field);
    let title = property
        .and_then(|p| p.title.clone())
        .unwrap_or_else(|| field.to_string());

    let mut facet = FacetSpec::terms(field, title, i64::MAX);
    if range_base.is_some() || property.map(|p| p.is_rangeable()).unwrap_or(false) {
        facet.aggregation_type = AggregationType::Stats;
    }
    facet
}

/// Ordered facets for a request.
///
/// The type facet comes first, then schema facets, then any filtered or
/// `additional_facet` fields that the schema does not already declare. Terms
/// facets on nested fields are promoted to nested aggregations.
pub fn derive_facets(
    registry: &TypeRegistry,
    normalized: &NormalizedQuery,
    mapping: &IndexMapping,
) -> Vec<FacetSpec> {
    let types = &normalized.types;
    let mut facets = vec![FacetSpec::terms(TYPE_FACET, TYPE_FACET_TITLE, i64::MIN)];

    for facet in schema_facets(registry, types) {
        if facet.field != TYPE_FACET {
            facets.push(facet);
        }
    }

    let filter_keys = normalized
        .params
        .iter()
        .map(|(key, _)| key)
        .filter(|key| *key != "type" && !is_reserved(key));
    let additional = normalized.params.get_all("additional_facet");

    for key in filter_keys.chain(additional) {
        let facet = ad_hoc_facet(registry, types, key);
        if !facets.iter().any(|f| f.field == facet.field) {
            facets.push(facet);
        }
    }

    for facet in &mut facets {
        if facet.aggregation_type == AggregationType::Terms
            && mapping.is_nested(&term_field(&facet.field))
        {
            facet.aggregation_type = AggregationType::Nested;
        }
    }

    facets
}

fn prune_clause(clause: &QueryNode, excluded: &dyn Fn(&str) -> bool) -> Option<QueryNode> {
    match clause {
        QueryNode::Permission(_) | QueryNode::Baseline(_) => Some(clause.clone()),
        QueryNode::Nested { path, query } => match query.as_ref() {
            QueryNode::Bool(inner) => {
                let pruned = prune_bool(inner, excluded);
                if pruned.is_empty() {
                    None
                } else {
                    Some(QueryNode::nested(path.clone(), pruned))
                }
            }
            other if other.references(excluded) => None,
            _ => Some(clause.clone()),
        },
        other if other.references(excluded) => None,
        other => Some(other.clone()),
    }
}

fn prune_bool(query: &BoolQuery, excluded: &dyn Fn(&str) -> bool) -> BoolQuery {
    let keep = |clauses: &[QueryNode]| -> Vec<QueryNode> {
        clauses
            .iter()
            .filter_map(|clause| prune_clause(clause, excluded))
            .collect()
    };

    BoolQuery {
        must: keep(&query.must),
        must_not: keep(&query.must_not),
        should: query.should.clone(),
        filter: keep(&query.filter),
        minimum_should_match: query.minimum_should_match,
    }
}

/// Copy of `filter` without any clause on the facet's own field.
///
/// Presence groups that mention the field are removed whole; nested nodes lose
/// only the matching clauses and disappear when nothing is left. The type facet
/// keeps every clause.
pub fn exclude_facet_field(filter: &BoolQuery, facet: &FacetSpec) -> BoolQuery {
    if facet.field == TYPE_FACET {
        return filter.clone();
    }
    prune_bool(filter, &|field: &str| facet.covers(field))
}

/// What each facet's filter bucket is scoped to
#[derive(Debug, Clone, Copy)]
pub enum FacetScope<'a> {
    /// Every facet drops its own field's filters
    SelfExcluding(&'a CompiledQuery),
    /// Every facet uses the same query unchanged
    Fixed(&'a QueryNode),
}

fn terms_agg(field: &str, size: usize) -> Value {
    json!({ "terms": { "field": field, "size": size, "missing": NO_VALUE } })
}

fn primary_aggregation(facet: &FacetSpec, mapping: &IndexMapping, size: usize) -> Value {
    let field = facet.physical_field();

    match facet.aggregation_type {
        AggregationType::Terms => match &facet.grouping_key {
            Some(group) => {
                let mut agg = terms_agg(&term_field(group), size);
                agg["aggs"] = json!({ SUB_TERMS_AGG: terms_agg(&field, size) });
                agg
            }
            None => terms_agg(&field, size),
        },
        AggregationType::Nested => {
            let path = mapping.nested_path(&field).unwrap_or_default();
            let mut inner = terms_agg(&field, size);
            inner["aggs"] = json!({ REVERSE_NESTED_AGG: { "reverse_nested": {} } });
            json!({
                "nested": { "path": path },
                "aggs": { PRIMARY_AGG: inner }
            })
        }
        AggregationType::Stats => {
            let stats = json!({ "stats": { "field": field } });
            match mapping.nested_path(&field) {
                Some(path) => json!({
                    "nested": { "path": path },
                    "aggs": { PRIMARY_AGG: stats }
                }),
                None => stats,
            }
        }
        AggregationType::Range => {
            let ranges: Vec<Value> = facet
                .ranges
                .iter()
                .map(|bucket| {
                    let mut range = Map::new();
                    if let Some(from) = bucket.from {
                        range.insert("from".to_string(), json!(from));
                    }
                    if let Some(to) = bucket.to {
                        range.insert("to".to_string(), json!(to));
                    }
                    if let Some(label) = &bucket.label {
                        range.insert("key".to_string(), json!(label));
                    }
                    Value::Object(range)
                })
                .collect();
            json!({ "range": { "field": field, "ranges": ranges } })
        }
    }
}

/// The `aggs` section of a search body
pub fn build_aggregations(
    facets: &[FacetSpec],
    scope: FacetScope<'_>,
    mapping: &IndexMapping,
    facet_size: usize,
) -> Value {
    let mut per_facet = Map::new();

    for facet in facets {
        let filter = match scope {
            FacetScope::SelfExcluding(compiled) => CompiledQuery {
                filter: exclude_facet_field(&compiled.filter, facet),
                text: compiled.text.clone(),
            }
            .to_node()
            .to_json(),
            FacetScope::Fixed(query) => query.to_json(),
        };

        per_facet.insert(
            facet.field.clone(),
            json!({
                "filter": filter,
                "aggs": { PRIMARY_AGG: primary_aggregation(facet, mapping, facet_size) }
            }),
        );
    }

    json!({ GLOBAL_AGG: { "global": {}, "aggs": per_facet } })
}

/// Attach schema-declared and caller-supplied aggregations next to the facets
pub fn add_summary_aggregations(
    aggs: &mut Value,
    registry: &TypeRegistry,
    types: &[String],
    custom: Option<&Map<String, Value>>,
) {
    let Some(target) = aggs.as_object_mut() else {
        return;
    };

    for schema in types.iter().filter_map(|t| registry.get(t)) {
        for (name, agg) in &schema.aggregations {
            target.entry(name.clone()).or_insert_with(|| agg.clone());
        }
    }

    if let Some(custom) = custom {
        for (name, agg) in custom {
            if name != GLOBAL_AGG {
                target.insert(name.clone(), agg.clone());
            }
        }
    }
}

/// One bucket of a terms facet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacetTerm {
    pub key: String,
    pub doc_count: u64,
    /// Bucket members for grouped facets
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub terms: Vec<FacetTerm>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FacetStats {
    pub count: u64,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub avg: Option<f64>,
    pub sum: Option<f64>,
}

/// Formatted facet returned to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacetResult {
    pub field: String,
    pub title: String,
    pub total: u64,
    pub aggregation_type: AggregationType,
    pub terms: Vec<FacetTerm>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<FacetStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grouping_key: Option<String>,
}

fn bucket_key(bucket: &Value) -> String {
    match bucket.get("key_as_string").or_else(|| bucket.get("key")) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

fn count(value: &Value) -> u64 {
    value.get("doc_count").and_then(Value::as_u64).unwrap_or(0)
}

fn buckets(agg: &Value) -> impl Iterator<Item = &Value> {
    agg.get("buckets")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

fn parse_terms(agg: &Value) -> Vec<FacetTerm> {
    buckets(agg)
        .map(|bucket| FacetTerm {
            key: bucket_key(bucket),
            doc_count: count(bucket),
            terms: bucket.get(SUB_TERMS_AGG).map(parse_terms).unwrap_or_default(),
        })
        .collect()
}

/// Nested bucket counts replaced by root-document counts, re-sorted descending
fn parse_nested_terms(agg: &Value) -> Vec<FacetTerm> {
    let inner = agg.get(PRIMARY_AGG).unwrap_or(agg);
    let mut terms: Vec<FacetTerm> = buckets(inner)
        .map(|bucket| FacetTerm {
            key: bucket_key(bucket),
            doc_count: bucket
                .get(REVERSE_NESTED_AGG)
                .map(count)
                .unwrap_or_else(|| count(bucket)),
            terms: Vec::new(),
        })
        .collect();
    terms.sort_by(|a, b| b.doc_count.cmp(&a.doc_count));
    terms
}

fn parse_stats(agg: &Value) -> FacetStats {
    let stats = agg.get(PRIMARY_AGG).unwrap_or(agg);
    FacetStats {
        count: stats.get("count").and_then(Value::as_u64).unwrap_or(0),
        min: stats.get("min").and_then(Value::as_f64),
        max: stats.get("max").and_then(Value::as_f64),
        avg: stats.get("avg").and_then(Value::as_f64),
        sum: stats.get("sum").and_then(Value::as_f64),
    }
}

/// Turn the engine's `aggregations` section into client facets.
///
/// Facets without any matching document are dropped unless the caller filters
/// on them; the type facet is always returned.
pub fn parse_facet_results(
    facets: &[FacetSpec],
    aggregations: &Value,
    active_fields: &BTreeSet<String>,
) -> Vec<FacetResult> {
    let Some(global) = aggregations.get(GLOBAL_AGG) else {
        return Vec::new();
    };

    facets
        .iter()
        .filter_map(|facet| {
            let bucket = global.get(&facet.field)?;
            let total = count(bucket);
            let primary = bucket.get(PRIMARY_AGG).unwrap_or(&Value::Null);

            let (terms, stats) = match facet.aggregation_type {
                AggregationType::Terms | AggregationType::Range => (parse_terms(primary), None),
                AggregationType::Nested => (parse_nested_terms(primary), None),
                AggregationType::Stats => (Vec::new(), Some(parse_stats(primary))),
            };

            let keep = total > 0 || facet.field == TYPE_FACET || active_fields.contains(&facet.field);
            keep.then(|| FacetResult {
                field: facet.field.clone(),
                title: facet.title.clone(),
                total,
                aggregation_type: facet.aggregation_type,
                terms,
                stats,
                grouping_key: facet.grouping_key.clone(),
            })
        })
        .collect()
}
