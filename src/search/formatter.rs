//! Client-facing result pages

use super::builder::SortClause;
use super::extractor::AppliedFilter;
use super::facets::FacetResult;
use super::params::QueryParams;
use crate::schema::{ColumnConfig, TypeRegistry};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

pub const SEARCH_PATH: &str = "/search/";

const DEFAULT_COLUMN: &str = "display_title";

/// Which rendering of each document to return
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frame {
    #[default]
    Embedded,
    Object,
    Raw,
}

impl FromStr for Frame {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "embedded" | "" => Ok(Frame::Embedded),
            "object" => Ok(Frame::Object),
            "raw" => Ok(Frame::Raw),
            other => Err(format!("Unknown frame '{}'", other)),
        }
    }
}

impl Frame {
    /// `_source` subtree served for this frame
    pub fn source_path(self) -> Option<&'static str> {
        match self {
            Frame::Embedded => Some("embedded"),
            Frame::Object => Some("object"),
            Frame::Raw => None,
        }
    }
}

/// Document body of one engine hit for the requested frame
pub fn project_hit(hit: &Value, frame: Frame) -> Value {
    let source = hit.get("_source").cloned().unwrap_or(Value::Null);

    match frame.source_path() {
        Some(path) => source.get(path).cloned().unwrap_or(Value::Null),
        None => {
            let mut raw = match source {
                Value::Object(map) => map,
                _ => Map::new(),
            };
            if let Some(id) = hit.get("_id") {
                raw.insert("_id".to_string(), id.clone());
            }
            Value::Object(raw)
        }
    }
}

/// One formatted result page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    #[serde(rename = "@id")]
    pub id: String,
    #[serde(rename = "@type")]
    pub types: Vec<String>,
    pub title: String,
    pub total: u64,
    #[serde(rename = "@graph")]
    pub graph: Vec<Value>,
    pub facets: Vec<FacetResult>,
    pub sort: Map<String, Value>,
    pub columns: BTreeMap<String, ColumnConfig>,
    pub filters: Vec<AppliedFilter>,
    pub clear_filters: String,
    pub notification: String,
}

/// Inputs to [`format_page`]
pub struct PageContent<'a> {
    pub registry: &'a TypeRegistry,
    pub types: &'a [String],
    pub query_string: &'a str,
    pub frame: Frame,
    pub total: u64,
    pub hits: &'a [Value],
    pub facets: Vec<FacetResult>,
    pub sort: &'a [SortClause],
    pub filters: &'a [AppliedFilter],
}

/// Columns shared by every searched type; `display_title` when none are declared
pub fn columns_for(registry: &TypeRegistry, types: &[String]) -> BTreeMap<String, ColumnConfig> {
    let schemas: Vec<_> = types.iter().filter_map(|t| registry.get(t)).collect();

    let mut columns: BTreeMap<String, ColumnConfig> = match schemas.split_first() {
        Some((first, rest)) => first
            .columns
            .iter()
            .filter(|(name, _)| rest.iter().all(|s| s.columns.contains_key(*name)))
            .map(|(name, config)| (name.clone(), config.clone()))
            .collect(),
        None => BTreeMap::new(),
    };

    if columns.is_empty() {
        columns.insert(
            DEFAULT_COLUMN.to_string(),
            ColumnConfig {
                title: "Title".to_string(),
                order: None,
            },
        );
    }
    columns
}

/// Facet fields the caller currently filters on
pub fn active_facet_fields(filters: &[AppliedFilter]) -> BTreeSet<String> {
    filters
        .iter()
        .map(|f| {
            let field = f.field.strip_suffix('!').unwrap_or(&f.field);
            let field = field
                .strip_suffix(".from")
                .or_else(|| field.strip_suffix(".to"))
                .unwrap_or(field);
            field.to_string()
        })
        .collect()
}

fn clear_filters_link(types: &[String]) -> String {
    let mut params = QueryParams::new();
    for t in types {
        params.push("type", t.clone());
    }
    format!("{}?{}", SEARCH_PATH, params.to_query_string())
}

fn result_types(types: &[String]) -> Vec<String> {
    let mut result: Vec<String> = match types {
        [only] => vec![format!("{}SearchResults", only)],
        _ => Vec::new(),
    };
    result.push("Search".to_string());
    result
}

pub fn format_page(content: PageContent<'_>) -> SearchResponse {
    let mut sort = Map::new();
    for clause in content.sort {
        let mut spec = Map::new();
        spec.insert("order".to_string(), json!(clause.order));
        if let Some(unmapped) = &clause.unmapped_type {
            spec.insert("unmapped_type".to_string(), json!(unmapped));
        }
        sort.insert(clause.field.clone(), Value::Object(spec));
    }

    let notification = if content.total > 0 {
        "Success"
    } else {
        "No results found"
    };

    SearchResponse {
        id: format!("{}?{}", SEARCH_PATH, content.query_string),
        types: result_types(content.types),
        title: "Search".to_string(),
        total: content.total,
        graph: content
            .hits
            .iter()
            .map(|hit| project_hit(hit, content.frame))
            .collect(),
        facets: content.facets,
        sort,
        columns: columns_for(content.registry, content.types),
        filters: content.filters.to_vec(),
        clear_filters: clear_filters_link(content.types),
        notification: notification.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::TypeSchema;

    fn hit() -> Value {
        json!({
            "_id": "abc",
            "_source": {
                "embedded": {"uuid": "abc", "status": "active", "lab": {"display_title": "Lab A"}},
                "object": {"uuid": "abc", "lab": "/labs/a/"}
            }
        })
    }

    #[test]
    fn test_frame_projection() {
        assert_eq!(project_hit(&hit(), Frame::Embedded)["lab"]["display_title"], json!("Lab A"));
        assert_eq!(project_hit(&hit(), Frame::Object)["lab"], json!("/labs/a/"));

        let raw = project_hit(&hit(), Frame::Raw);
        assert_eq!(raw["_id"], json!("abc"));
        assert!(raw["embedded"].is_object());
    }

    #[test]
    fn test_frame_parsing() {
        assert_eq!("object".parse::<Frame>().unwrap(), Frame::Object);
        assert_eq!("".parse::<Frame>().unwrap(), Frame::Embedded);
        assert!("page".parse::<Frame>().is_err());
    }

    #[test]
    fn test_columns_intersection_and_default() {
        let sample: TypeSchema = serde_json::from_value(json!({
            "name": "Sample",
            "columns": {"accession": {"title": "Accession"}, "tissue": {"title": "Tissue"}}
        }))
        .unwrap();
        let lab: TypeSchema = serde_json::from_value(json!({
            "name": "Lab",
            "columns": {"accession": {"title": "Accession"}}
        }))
        .unwrap();
        let registry = TypeRegistry::new(vec![sample, lab]);

        let single = columns_for(&registry, &["Sample".to_string()]);
        assert_eq!(single.len(), 2);

        let both = columns_for(&registry, &["Sample".to_string(), "Lab".to_string()]);
        assert_eq!(both.keys().collect::<Vec<_>>(), vec!["accession"]);

        let root = columns_for(&registry, &["Item".to_string()]);
        assert!(root.contains_key("display_title"));
    }

    #[test]
    fn test_active_fields_strip_modifiers() {
        let filters = vec![
            AppliedFilter { field: "tissue!".into(), term: "x".into(), remove: "?".into() },
            AppliedFilter { field: "age.from".into(), term: "1".into(), remove: "?".into() },
        ];
        let active = active_facet_fields(&filters);
        assert!(active.contains("tissue"));
        assert!(active.contains("age"));
    }

    #[test]
    fn test_page_envelope() {
        let registry = TypeRegistry::new(vec![TypeSchema {
            name: "Sample".to_string(),
            ..Default::default()
        }]);
        let types = vec!["Sample".to_string()];
        let sort = vec![SortClause {
            field: "embedded.date_created".to_string(),
            order: "desc".to_string(),
            unmapped_type: Some("date".to_string()),
        }];

        let page = format_page(PageContent {
            registry: &registry,
            types: &types,
            query_string: "type=Sample&status=active",
            frame: Frame::Embedded,
            total: 1,
            hits: &[hit()],
            facets: Vec::new(),
            sort: &sort,
            filters: &[],
        });

        assert_eq!(page.id, "/search/?type=Sample&status=active");
        assert_eq!(page.types, vec!["SampleSearchResults", "Search"]);
        assert_eq!(page.clear_filters, "/search/?type=Sample");
        assert_eq!(page.notification, "Success");
        assert_eq!(page.graph[0]["status"], json!("active"));
        assert_eq!(page.sort["embedded.date_created"]["order"], json!("desc"));

        let json = serde_json::to_value(&page).unwrap();
        assert!(json["@graph"].is_array());
        assert_eq!(json["@id"], json!("/search/?type=Sample&status=active"));
    }
}
