//! Shared fixtures: an in-memory search engine and a small schema set.
//!
//! The engine evaluates the subset of the query DSL the compiler emits
//! (`bool`, `terms`, `match`, `range`, `exists`, `nested`, `match_all`,
//! `simple_query_string`) and the facet aggregations under `all_items`, so
//! integration tests can assert on real hit sets instead of request shapes.

#![allow(dead_code)]

use async_trait::async_trait;
use facet_query::schema::{SchemaCache, StaticSchemaProvider, TypeSchema};
use facet_query::search::{
    QueryCompiler, SearchConfig, SearchEngine, SearchError, SearchResult, SearchService,
};
use serde_json::{json, Map, Value};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One request the engine received
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub indices: String,
    pub body: Value,
    pub preference: Option<String>,
}

#[derive(Default)]
pub struct InMemoryEngine {
    docs: Mutex<Vec<(String, String, Value)>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl InMemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, index: &str, id: &str, source: Value) {
        self.docs
            .lock()
            .unwrap()
            .push((index.to_string(), id.to_string(), source));
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    fn documents(&self, indices: &str) -> Vec<(String, String, Value)> {
        let wanted: Vec<&str> = indices.split(',').collect();
        self.docs
            .lock()
            .unwrap()
            .iter()
            .filter(|(index, _, _)| wanted.contains(&index.as_str()))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl SearchEngine for InMemoryEngine {
    async fn search(
        &self,
        indices: &str,
        body: &Value,
        preference: Option<&str>,
    ) -> SearchResult<Value> {
        self.calls.lock().unwrap().push(RecordedCall {
            indices: indices.to_string(),
            body: body.clone(),
            preference: preference.map(str::to_string),
        });

        let docs = self.documents(indices);
        let query = body.get("query").cloned().unwrap_or(json!({"match_all": {}}));

        let mut matched: Vec<&(String, String, Value)> =
            docs.iter().filter(|(_, _, src)| matches(&query, src)).collect();

        if let Some(sort) = body.get("sort").and_then(Value::as_array) {
            matched.sort_by(|a, b| compare_sorted(sort, &a.2, &b.2));
        }

        let from = body.get("from").and_then(Value::as_u64).unwrap_or(0) as usize;
        let size = body.get("size").and_then(Value::as_u64).unwrap_or(10) as usize;
        let hits: Vec<Value> = matched
            .iter()
            .skip(from)
            .take(size)
            .map(|(index, id, src)| json!({"_index": index, "_id": id, "_source": src}))
            .collect();

        let mut response = json!({
            "hits": {"total": {"value": matched.len(), "relation": "eq"}, "hits": hits}
        });

        if let Some(aggs) = body.get("aggs").and_then(Value::as_object) {
            let mut out = Map::new();
            if let Some(global) = aggs.get("all_items") {
                out.insert("all_items".to_string(), global_agg(global, &docs));
            }
            response["aggregations"] = Value::Object(out);
        }

        Ok(response)
    }
}

/// Engine that fails every request after the first `ok` ones
pub struct FailingEngine {
    inner: InMemoryEngine,
    ok: usize,
}

impl FailingEngine {
    pub fn new(inner: InMemoryEngine, ok: usize) -> Self {
        Self { inner, ok }
    }
}

#[async_trait]
impl SearchEngine for FailingEngine {
    async fn search(
        &self,
        indices: &str,
        body: &Value,
        preference: Option<&str>,
    ) -> SearchResult<Value> {
        if self.inner.calls().len() >= self.ok {
            return Err(SearchError::Backend("engine unavailable".to_string()));
        }
        self.inner.search(indices, body, preference).await
    }
}

fn strip_raw(field: &str) -> &str {
    field.strip_suffix(".raw").unwrap_or(field)
}

/// Every leaf value at a dotted path, flattening arrays
pub fn values_at(source: &Value, field: &str) -> Vec<Value> {
    let mut current = vec![source.clone()];
    for part in strip_raw(field).split('.') {
        let mut next = Vec::new();
        for value in current {
            match value {
                Value::Object(map) => {
                    if let Some(child) = map.get(part) {
                        next.push(child.clone());
                    }
                }
                Value::Array(items) => {
                    for item in items {
                        if let Some(child) = item.get(part) {
                            next.push(child.clone());
                        }
                    }
                }
                _ => {}
            }
        }
        current = next;
    }

    current
        .into_iter()
        .flat_map(|v| match v {
            Value::Array(items) => items,
            other => vec![other],
        })
        .filter(|v| !v.is_null())
        .collect()
}

fn as_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn nested_elements(source: &Value, path: &str) -> Vec<Value> {
    values_at(source, path)
}

/// `source` with the nested array at `path` replaced by one element
fn with_single(source: &Value, path: &str, element: &Value) -> Value {
    let mut copy = source.clone();
    let mut cursor = &mut copy;
    let parts: Vec<&str> = path.split('.').collect();
    for (i, part) in parts.iter().enumerate() {
        if i == parts.len() - 1 {
            cursor[*part] = element.clone();
        } else {
            cursor = &mut cursor[*part];
        }
    }
    copy
}

fn clauses<'a>(body: &'a Map<String, Value>, key: &str) -> Vec<&'a Value> {
    match body.get(key) {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(single @ Value::Object(_)) => vec![single],
        _ => Vec::new(),
    }
}

fn compare_number(value: &Value, bound: &Value) -> Option<Ordering> {
    match (value.as_f64(), bound.as_f64()) {
        (Some(a), Some(b)) => a.partial_cmp(&b),
        _ => Some(as_key(value).cmp(&as_key(bound))),
    }
}

pub fn matches(query: &Value, source: &Value) -> bool {
    let Some((kind, body)) = query.as_object().and_then(|q| q.iter().next()) else {
        return true;
    };

    match kind.as_str() {
        "match_all" => true,
        "bool" => {
            let Some(body) = body.as_object() else {
                return true;
            };
            let must = clauses(body, "must");
            let filter = clauses(body, "filter");
            let must_not = clauses(body, "must_not");
            let should = clauses(body, "should");

            if !must.iter().chain(filter.iter()).all(|q| matches(q, source)) {
                return false;
            }
            if must_not.iter().any(|q| matches(q, source)) {
                return false;
            }
            let min_should = body
                .get("minimum_should_match")
                .and_then(Value::as_u64)
                .unwrap_or(if must.is_empty() && filter.is_empty() { 1 } else { 0 });
            if !should.is_empty() && min_should > 0 {
                let hits = should.iter().filter(|q| matches(q, source)).count() as u64;
                return hits >= min_should;
            }
            true
        }
        "terms" => body.as_object().is_some_and(|terms| {
            terms.iter().all(|(field, wanted)| {
                let wanted: BTreeSet<String> = wanted
                    .as_array()
                    .into_iter()
                    .flatten()
                    .map(as_key)
                    .collect();
                values_at(source, field)
                    .iter()
                    .any(|v| wanted.contains(&as_key(v)))
            })
        }),
        "match" => body.as_object().is_some_and(|m| {
            m.iter().all(|(field, wanted)| {
                values_at(source, field)
                    .iter()
                    .any(|v| as_key(v) == as_key(wanted))
            })
        }),
        "exists" => body
            .get("field")
            .and_then(Value::as_str)
            .is_some_and(|field| !values_at(source, field).is_empty()),
        "range" => body.as_object().is_some_and(|ranges| {
            ranges.iter().all(|(field, bounds)| {
                values_at(source, field).iter().any(|v| {
                    let lower = bounds
                        .get("gte")
                        .map_or(true, |b| compare_number(v, b) != Some(Ordering::Less));
                    let upper = bounds
                        .get("lte")
                        .map_or(true, |b| compare_number(v, b) != Some(Ordering::Greater));
                    lower && upper
                })
            })
        }),
        "nested" => {
            let path = body.get("path").and_then(Value::as_str).unwrap_or_default();
            let inner = body.get("query").cloned().unwrap_or(json!({"match_all": {}}));
            nested_elements(source, path)
                .iter()
                .any(|element| matches(&inner, &with_single(source, path, element)))
        }
        "simple_query_string" => {
            let needle = body
                .get("query")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_lowercase();
            let embedded = source.get("embedded").cloned().unwrap_or(Value::Null);
            needle
                .split_whitespace()
                .all(|word| text_contains(&embedded, word))
        }
        _ => false,
    }
}

fn text_contains(value: &Value, word: &str) -> bool {
    match value {
        Value::String(s) => s.to_lowercase().contains(word),
        Value::Array(items) => items.iter().any(|v| text_contains(v, word)),
        Value::Object(map) => map.values().any(|v| text_contains(v, word)),
        _ => false,
    }
}

fn compare_sorted(sort: &[Value], a: &Value, b: &Value) -> Ordering {
    for clause in sort {
        let Some((field, spec)) = clause.as_object().and_then(|c| c.iter().next()) else {
            continue;
        };
        if field == "_score" {
            continue;
        }
        let descending = spec.get("order").and_then(Value::as_str) == Some("desc");
        let left = values_at(a, field).first().map(as_key);
        let right = values_at(b, field).first().map(as_key);
        let ordering = match (left, right) {
            (Some(l), Some(r)) if descending => r.cmp(&l),
            (Some(l), Some(r)) => l.cmp(&r),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn sorted_buckets(counts: BTreeMap<String, u64>, size: usize) -> Vec<(String, u64)> {
    let mut buckets: Vec<(String, u64)> = counts.into_iter().collect();
    buckets.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    buckets.truncate(size);
    buckets
}

fn terms_buckets(agg: &Value, docs: &[&Value]) -> Value {
    let terms = &agg["terms"];
    let field = terms["field"].as_str().unwrap_or_default();
    let size = terms["size"].as_u64().unwrap_or(10) as usize;
    let missing = terms.get("missing").and_then(Value::as_str);

    let mut counts: BTreeMap<String, u64> = BTreeMap::new();
    for doc in docs {
        let values: BTreeSet<String> = values_at(doc, field).iter().map(as_key).collect();
        if values.is_empty() {
            if let Some(missing) = missing {
                *counts.entry(missing.to_string()).or_default() += 1;
            }
        }
        for value in values {
            *counts.entry(value).or_default() += 1;
        }
    }

    let buckets: Vec<Value> = sorted_buckets(counts, size)
        .into_iter()
        .map(|(key, doc_count)| json!({"key": key, "doc_count": doc_count}))
        .collect();
    json!({ "buckets": buckets })
}

fn nested_terms(agg: &Value, docs: &[&Value]) -> Value {
    let path = agg["nested"]["path"].as_str().unwrap_or_default();
    let inner = &agg["aggs"]["primary_agg"]["terms"];
    let field = inner["field"].as_str().unwrap_or_default();
    let size = inner["size"].as_u64().unwrap_or(10) as usize;
    let missing = inner.get("missing").and_then(Value::as_str);

    let mut nested_counts: BTreeMap<String, u64> = BTreeMap::new();
    let mut root_counts: BTreeMap<String, u64> = BTreeMap::new();
    let mut elements = 0u64;

    for doc in docs {
        let mut seen = BTreeSet::new();
        for element in nested_elements(doc, path) {
            elements += 1;
            let view = with_single(doc, path, &element);
            let mut values: Vec<String> = values_at(&view, field).iter().map(as_key).collect();
            if values.is_empty() {
                values.extend(missing.map(str::to_string));
            }
            for value in values {
                *nested_counts.entry(value.clone()).or_default() += 1;
                seen.insert(value);
            }
        }
        for value in seen {
            *root_counts.entry(value).or_default() += 1;
        }
    }

    let buckets: Vec<Value> = sorted_buckets(nested_counts, size)
        .into_iter()
        .map(|(key, doc_count)| {
            let roots = root_counts.get(&key).copied().unwrap_or(0);
            json!({
                "key": key,
                "doc_count": doc_count,
                "primary_agg_reverse_nested": {"doc_count": roots}
            })
        })
        .collect();

    json!({
        "doc_count": elements,
        "primary_agg": {"buckets": buckets}
    })
}

fn stats(agg: &Value, docs: &[&Value]) -> Value {
    let field = agg["stats"]["field"].as_str().unwrap_or_default();
    let numbers: Vec<f64> = docs
        .iter()
        .flat_map(|doc| values_at(doc, field))
        .filter_map(|v| v.as_f64())
        .collect();
    if numbers.is_empty() {
        return json!({"count": 0, "min": null, "max": null, "avg": null, "sum": null});
    }
    let sum: f64 = numbers.iter().sum();
    json!({
        "count": numbers.len(),
        "min": numbers.iter().cloned().fold(f64::INFINITY, f64::min),
        "max": numbers.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
        "avg": sum / numbers.len() as f64,
        "sum": sum,
    })
}

fn global_agg(global: &Value, docs: &[(String, String, Value)]) -> Value {
    let mut out = Map::new();
    out.insert("doc_count".to_string(), json!(docs.len()));

    if let Some(per_facet) = global.get("aggs").and_then(Value::as_object) {
        for (name, facet) in per_facet {
            let filter = facet.get("filter").cloned().unwrap_or(json!({"match_all": {}}));
            let scoped: Vec<&Value> = docs
                .iter()
                .map(|(_, _, src)| src)
                .filter(|src| matches(&filter, src))
                .collect();

            let primary = &facet["aggs"]["primary_agg"];
            let result = if primary.get("terms").is_some() {
                terms_buckets(primary, &scoped)
            } else if primary.get("nested").is_some() {
                if primary["aggs"]["primary_agg"].get("stats").is_some() {
                    json!({"primary_agg": stats(&primary["aggs"]["primary_agg"], &scoped)})
                } else {
                    nested_terms(primary, &scoped)
                }
            } else if primary.get("stats").is_some() {
                stats(primary, &scoped)
            } else {
                json!({"buckets": []})
            };

            out.insert(
                name.clone(),
                json!({"doc_count": scoped.len(), "primary_agg": result}),
            );
        }
    }

    Value::Object(out)
}

/// Document source shaped like the index stores it
pub fn doc(
    item_type: &str,
    uuid: &str,
    status: &str,
    principals: &[&str],
    extra: Value,
) -> Value {
    let mut embedded = json!({
        "@type": [item_type, "Item"],
        "@id": format!("/{}/{}/", item_type.to_lowercase(), uuid),
        "uuid": uuid,
        "status": status,
        "display_title": uuid,
    });
    if let (Some(target), Some(extra)) = (embedded.as_object_mut(), extra.as_object()) {
        for (key, value) in extra {
            target.insert(key.clone(), value.clone());
        }
    }
    json!({
        "embedded": embedded,
        "principals_allowed": {"view": principals},
    })
}

pub fn sample_schema() -> TypeSchema {
    serde_json::from_value(json!({
        "name": "Sample",
        "properties": {
            "status": {"type": "string", "title": "Status"},
            "tissue": {"type": "string", "title": "Tissue"},
            "age": {"type": "integer", "title": "Age"},
            "date_created": {"type": "string", "format": "date-time"},
            "files": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "file_type": {"type": "string"},
                        "status": {"type": "string"}
                    }
                }
            }
        },
        "facets": {
            "status": {"title": "Status", "order": 1},
            "tissue": {"title": "Tissue", "order": 2},
            "files.file_type": {"title": "File Type", "order": 3}
        },
        "columns": {
            "display_title": {"title": "Title"},
            "tissue": {"title": "Tissue"}
        }
    }))
    .expect("valid sample schema")
}

pub fn sample_mapping() -> Value {
    json!({
        "sample": {
            "mappings": {
                "properties": {
                    "embedded": {
                        "properties": {
                            "files": {"type": "nested"}
                        }
                    }
                }
            }
        }
    })
}

pub fn config() -> SearchConfig {
    SearchConfig::default()
}

pub fn service_with(engine: Arc<dyn SearchEngine>, config: SearchConfig) -> SearchService {
    let provider = StaticSchemaProvider::new(vec![sample_schema()])
        .with_mapping("sample", sample_mapping());
    let schemas = SchemaCache::new(Arc::new(provider), 16, Duration::from_secs(60));
    SearchService::new(QueryCompiler::new(schemas, config), engine)
}

pub fn service(engine: Arc<InMemoryEngine>) -> SearchService {
    service_with(engine, config())
}
