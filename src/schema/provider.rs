//! Schema and mapping providers

use super::types::TypeSchema;
use crate::search::{SearchError, SearchResult};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

/// Source of type schemas and physical index mappings
#[async_trait]
pub trait SchemaProvider: Send + Sync {
    /// Every registered type schema
    async fn type_schemas(&self) -> SearchResult<Vec<TypeSchema>>;

    /// Raw mapping document of one index
    async fn mapping(&self, index: &str) -> SearchResult<Value>;
}

/// Turn a `{name: schema}` profiles document into named schemas
pub fn schemas_from_profiles(profiles: Value) -> SearchResult<Vec<TypeSchema>> {
    let profiles: BTreeMap<String, Value> = serde_json::from_value(profiles)
        .map_err(|e| SearchError::Schema(format!("Malformed profiles document: {}", e)))?;

    profiles
        .into_iter()
        .filter(|(name, _)| !name.starts_with('_'))
        .map(|(name, body)| {
            let mut schema: TypeSchema = serde_json::from_value(body)
                .map_err(|e| SearchError::Schema(format!("Malformed schema for {}: {}", name, e)))?;
            schema.name = name;
            Ok(schema)
        })
        .collect()
}

/// Fetches schemas from the profiles endpoint and mappings from the search engine
#[derive(Clone)]
pub struct HttpSchemaProvider {
    client: Client,
    profiles_url: String,
    engine_url: String,
}

impl HttpSchemaProvider {
    pub fn new(
        profiles_url: impl Into<String>,
        engine_url: impl Into<String>,
        timeout_secs: u64,
    ) -> SearchResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| SearchError::Schema(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            profiles_url: profiles_url.into().trim_end_matches('/').to_string(),
            engine_url: engine_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn get_json(&self, url: &str) -> SearchResult<Value> {
        let response = self.client.get(url).send().await?;
        let status = response.status();

        if !status.is_success() {
            warn!(url = %url, status = status.as_u16(), "Schema provider returned error status");
            return Err(SearchError::Schema(format!(
                "GET {} returned status {}",
                url, status
            )));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl SchemaProvider for HttpSchemaProvider {
    async fn type_schemas(&self) -> SearchResult<Vec<TypeSchema>> {
        let url = format!("{}/profiles/", self.profiles_url);
        debug!(url = %url, "Fetching type schemas");
        schemas_from_profiles(self.get_json(&url).await?)
    }

    async fn mapping(&self, index: &str) -> SearchResult<Value> {
        let url = format!("{}/{}/_mapping", self.engine_url, index);
        debug!(url = %url, "Fetching index mapping");
        self.get_json(&url).await
    }
}

/// Reads `profiles/*.json` and `mappings/<index>.json` below a directory
#[derive(Debug, Clone)]
pub struct DirectorySchemaProvider {
    root: PathBuf,
}

impl DirectorySchemaProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    async fn read_json(path: &PathBuf) -> SearchResult<Value> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| SearchError::Schema(format!("{}: {}", path.display(), e)))?;
        serde_json::from_str(&raw)
            .map_err(|e| SearchError::Schema(format!("{}: {}", path.display(), e)))
    }
}

#[async_trait]
impl SchemaProvider for DirectorySchemaProvider {
    async fn type_schemas(&self) -> SearchResult<Vec<TypeSchema>> {
        let dir = self.root.join("profiles");
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| SearchError::Schema(format!("{}: {}", dir.display(), e)))?;

        let mut profiles = serde_json::Map::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| SearchError::Schema(e.to_string()))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                continue;
            };
            profiles.insert(name, Self::read_json(&path).await?);
        }

        schemas_from_profiles(Value::Object(profiles))
    }

    async fn mapping(&self, index: &str) -> SearchResult<Value> {
        let path = self.root.join("mappings").join(format!("{}.json", index));
        if !path.exists() {
            return Ok(Value::Object(serde_json::Map::new()));
        }
        Self::read_json(&path).await
    }
}

/// In-memory provider for embedding and tests
#[derive(Debug, Clone, Default)]
pub struct StaticSchemaProvider {
    schemas: Vec<TypeSchema>,
    mappings: HashMap<String, Value>,
}

impl StaticSchemaProvider {
    pub fn new(schemas: Vec<TypeSchema>) -> Self {
        Self {
            schemas,
            mappings: HashMap::new(),
        }
    }

    pub fn with_mapping(mut self, index: impl Into<String>, mapping: Value) -> Self {
        self.mappings.insert(index.into(), mapping);
        self
    }
}

#[async_trait]
impl SchemaProvider for StaticSchemaProvider {
    async fn type_schemas(&self) -> SearchResult<Vec<TypeSchema>> {
        Ok(self.schemas.clone())
    }

    async fn mapping(&self, index: &str) -> SearchResult<Value> {
        Ok(self
            .mappings
            .get(index)
            .cloned()
            .unwrap_or_else(|| Value::Object(serde_json::Map::new())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_profiles_document_names_schemas() {
        let schemas = schemas_from_profiles(json!({
            "Sample": {"properties": {"status": {"type": "string"}}},
            "_subtypes": {}
        }))
        .unwrap();

        assert_eq!(schemas.len(), 1);
        assert_eq!(schemas[0].name, "Sample");
        assert!(schemas[0].properties.contains_key("status"));
    }

    #[tokio::test]
    async fn test_directory_provider_reads_profiles_and_mappings() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("profiles")).unwrap();
        std::fs::create_dir_all(dir.path().join("mappings")).unwrap();
        std::fs::write(
            dir.path().join("profiles/Sample.json"),
            r#"{"properties": {"status": {"type": "string"}}}"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join("mappings/sample.json"),
            r#"{"properties": {"embedded": {"properties": {"files": {"type": "nested"}}}}}"#,
        )
        .unwrap();

        let provider = DirectorySchemaProvider::new(dir.path());
        let schemas = provider.type_schemas().await.unwrap();
        assert_eq!(schemas[0].name, "Sample");

        let mapping = provider.mapping("sample").await.unwrap();
        assert!(mapping.get("properties").is_some());

        let missing = provider.mapping("other").await.unwrap();
        assert_eq!(missing, json!({}));
    }

    #[tokio::test]
    async fn test_http_provider_reports_error_status() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/profiles/")
            .with_status(500)
            .create_async()
            .await;

        let provider = HttpSchemaProvider::new(server.url(), server.url(), 5).unwrap();
        let err = provider.type_schemas().await.unwrap_err();
        assert!(matches!(err, SearchError::Schema(_)));
        mock.assert_async().await;
    }
}
