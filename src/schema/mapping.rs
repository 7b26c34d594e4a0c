//! Physical index mapping: which field paths are nested

use serde_json::Value;
use std::collections::BTreeSet;

/// Nested-path view of one or more index mappings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexMapping {
    nested_paths: BTreeSet<String>,
}

impl IndexMapping {
    /// Parse an engine mapping document.
    ///
    /// Accepts the `GET /{index}/_mapping` shape (`{index: {mappings: {properties}}}`),
    /// a bare `{mappings: {...}}` or a bare `{properties: {...}}`.
    pub fn from_json(value: &Value) -> Self {
        let mut mapping = Self::default();

        if let Some(properties) = value.get("properties") {
            mapping.collect(properties, "");
        } else if let Some(mappings) = value.get("mappings") {
            mapping.merge(&Self::from_json(mappings));
        } else if let Some(object) = value.as_object() {
            for index in object.values() {
                if index.get("mappings").is_some() || index.get("properties").is_some() {
                    mapping.merge(&Self::from_json(index));
                }
            }
        }

        mapping
    }

    /// Build directly from known nested paths
    pub fn with_nested_paths<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            nested_paths: paths.into_iter().map(Into::into).collect(),
        }
    }

    fn collect(&mut self, properties: &Value, prefix: &str) {
        let Some(fields) = properties.as_object() else {
            return;
        };

        for (name, field) in fields {
            let path = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{}.{}", prefix, name)
            };

            if field.get("type").and_then(Value::as_str) == Some("nested") {
                self.nested_paths.insert(path.clone());
            }

            if let Some(children) = field.get("properties") {
                self.collect(children, &path);
            }
        }
    }

    pub fn merge(&mut self, other: &IndexMapping) {
        self.nested_paths
            .extend(other.nested_paths.iter().cloned());
    }

    /// Innermost nested path containing `field`, if any
    pub fn nested_path(&self, field: &str) -> Option<&str> {
        self.nested_paths
            .iter()
            .filter(|path| {
                field.len() > path.len()
                    && field.starts_with(path.as_str())
                    && field.as_bytes()[path.len()] == b'.'
            })
            .max_by_key(|path| path.len())
            .map(String::as_str)
    }

    pub fn is_nested(&self, field: &str) -> bool {
        self.nested_path(field).is_some()
    }

    pub fn nested_paths(&self) -> impl Iterator<Item = &str> {
        self.nested_paths.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parses_index_mapping_response() {
        let response = json!({
            "sample": {
                "mappings": {
                    "properties": {
                        "embedded": {
                            "properties": {
                                "status": {"type": "keyword"},
                                "files": {
                                    "type": "nested",
                                    "properties": {
                                        "status": {"type": "keyword"},
                                        "replicates": {
                                            "type": "nested",
                                            "properties": {"id": {"type": "keyword"}}
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
            }
        });

        let mapping = IndexMapping::from_json(&response);
        assert_eq!(
            mapping.nested_path("embedded.files.status.raw"),
            Some("embedded.files")
        );
        assert_eq!(
            mapping.nested_path("embedded.files.replicates.id.raw"),
            Some("embedded.files.replicates")
        );
        assert_eq!(mapping.nested_path("embedded.status.raw"), None);
        assert_eq!(mapping.nested_path("embedded.filesize"), None);
    }

    #[test]
    fn test_merge_combines_paths() {
        let mut a = IndexMapping::with_nested_paths(["embedded.files"]);
        let b = IndexMapping::with_nested_paths(["embedded.experiments"]);
        a.merge(&b);
        assert!(a.is_nested("embedded.experiments.accession.raw"));
        assert!(a.is_nested("embedded.files.uuid.raw"));
    }
}
