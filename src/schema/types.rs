//! Type schemas and the type registry

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Name of the abstract root type every document belongs to
pub const ROOT_TYPE: &str = "Item";

/// One property of a type schema
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PropertySchema {
    /// JSON schema type (`string`, `number`, `integer`, `array`, `object`, ...)
    #[serde(rename = "type", default)]
    pub kind: Option<String>,

    #[serde(default)]
    pub format: Option<String>,

    #[serde(default)]
    pub title: Option<String>,

    #[serde(rename = "enum", default, skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<Value>,

    #[serde(default)]
    pub pattern: Option<String>,

    /// Target type(s) when this property references another document
    #[serde(rename = "linkTo", default)]
    pub link_to: Option<Value>,

    #[serde(default)]
    pub items: Option<Box<PropertySchema>>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, PropertySchema>,
}

impl PropertySchema {
    pub fn is_link(&self) -> bool {
        self.link_to.is_some()
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self.kind.as_deref(), Some("number") | Some("integer"))
    }

    pub fn is_date(&self) -> bool {
        matches!(self.format.as_deref(), Some("date") | Some("date-time"))
    }

    /// Numeric and date properties accept range bounds
    pub fn is_rangeable(&self) -> bool {
        self.is_numeric() || self.is_date()
    }

    /// The schema actually describing values: array items for arrays, self otherwise
    pub fn leaf(&self) -> &PropertySchema {
        self.items.as_deref().unwrap_or(self)
    }
}

/// Bucket bounds for a schema-declared range facet
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RangeBucket {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Facet declaration inside a type schema
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FacetConfig {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub order: Option<i64>,
    /// `terms` (default), `stats` or `range`
    #[serde(default)]
    pub aggregation_type: Option<String>,
    #[serde(default)]
    pub grouping: Option<String>,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub ranges: Vec<RangeBucket>,
}

/// Column declaration inside a type schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnConfig {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<i64>,
}

/// Schema of one document type
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TypeSchema {
    /// Canonical type name, e.g. `FileFormat`
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub properties: BTreeMap<String, PropertySchema>,

    #[serde(default)]
    pub facets: BTreeMap<String, FacetConfig>,

    #[serde(default)]
    pub columns: BTreeMap<String, ColumnConfig>,

    /// Extra aggregations attached to summary (size 0) requests
    #[serde(default)]
    pub aggregations: BTreeMap<String, Value>,

    /// Concrete types below an abstract type
    #[serde(default)]
    pub subtypes: Vec<String>,

    #[serde(rename = "abstract", default)]
    pub is_abstract: bool,
}

impl TypeSchema {
    /// Resolve a dotted field path, stepping through array items and object properties
    pub fn property(&self, path: &str) -> Option<&PropertySchema> {
        lookup_property(&self.properties, path)
    }
}

/// Walk a dotted path through a property tree
pub fn lookup_property<'a>(
    properties: &'a BTreeMap<String, PropertySchema>,
    path: &str,
) -> Option<&'a PropertySchema> {
    let mut current = properties;
    let mut segments = path.split('.').peekable();

    while let Some(segment) = segments.next() {
        let leaf = current.get(segment)?.leaf();
        if segments.peek().is_none() {
            return Some(leaf);
        }
        current = &leaf.properties;
    }

    None
}

/// Registry of every known type, keyed by canonical name with lookup aliases
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: BTreeMap<String, Arc<TypeSchema>>,
    aliases: HashMap<String, String>,
}

impl TypeRegistry {
    pub fn new(schemas: Vec<TypeSchema>) -> Self {
        let mut registry = Self::default();
        for schema in schemas {
            registry.insert(schema);
        }

        if !registry.types.contains_key(ROOT_TYPE) {
            let subtypes = registry.concrete_names();
            registry.insert(TypeSchema {
                name: ROOT_TYPE.to_string(),
                title: Some("Item".to_string()),
                subtypes,
                is_abstract: true,
                ..Default::default()
            });
        }

        registry
    }

    fn insert(&mut self, schema: TypeSchema) {
        let name = schema.name.clone();
        self.aliases.insert(name.to_lowercase(), name.clone());
        self.aliases.insert(super::snake_case(&name), name.clone());
        self.types.insert(name, Arc::new(schema));
    }

    fn concrete_names(&self) -> Vec<String> {
        self.types
            .values()
            .filter(|t| !t.is_abstract)
            .map(|t| t.name.clone())
            .collect()
    }

    /// Canonical name for a requested type, matching case-insensitively or by index name
    pub fn resolve(&self, name: &str) -> Option<&str> {
        self.aliases
            .get(&name.to_lowercase())
            .map(|canonical| canonical.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<TypeSchema>> {
        self.types.get(name)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Concrete types covered by a (possibly abstract) type, in registry order
    pub fn concrete_types(&self, name: &str) -> Vec<String> {
        match self.types.get(name) {
            Some(schema) if schema.is_abstract => schema
                .subtypes
                .iter()
                .flat_map(|sub| self.concrete_types(sub))
                .collect(),
            Some(schema) => vec![schema.name.clone()],
            None => Vec::new(),
        }
    }

    /// Property schema of `path` for the first of `types` that declares it
    pub fn property(&self, types: &[String], path: &str) -> Option<&PropertySchema> {
        types
            .iter()
            .flat_map(|t| self.concrete_types(t))
            .filter_map(|t| self.types.get(&t))
            .find_map(|schema| schema.property(path))
    }
}
