use super::mapping::IndexMapping;
use super::provider::SchemaProvider;
use super::types::TypeRegistry;
use crate::search::SearchResult;
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Immutable schema view used for one request
#[derive(Debug, Clone)]
pub struct SchemaSnapshot {
    pub registry: Arc<TypeRegistry>,
    pub mapping: Arc<IndexMapping>,
}

impl SchemaSnapshot {
    pub fn new(registry: TypeRegistry, mapping: IndexMapping) -> Self {
        Self {
            registry: Arc::new(registry),
            mapping: Arc::new(mapping),
        }
    }
}

/// Read-through cache in front of a [`SchemaProvider`].
///
/// Constructed once per process and handed to the components that need schema
/// data. Entries are replaced wholesale, so readers always see a consistent
/// registry or mapping.
#[derive(Clone)]
pub struct SchemaCache {
    provider: Arc<dyn SchemaProvider>,
    registry: Cache<(), Arc<TypeRegistry>>,
    mappings: Cache<String, Arc<IndexMapping>>,
}

impl SchemaCache {
    pub fn new(provider: Arc<dyn SchemaProvider>, max_capacity: u64, ttl: Duration) -> Self {
        Self {
            provider,
            registry: Cache::builder().max_capacity(1).time_to_live(ttl).build(),
            mappings: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    pub async fn registry(&self) -> SearchResult<Arc<TypeRegistry>> {
        if let Some(registry) = self.registry.get(&()).await {
            return Ok(registry);
        }

        let schemas = self.provider.type_schemas().await?;
        let registry = Arc::new(TypeRegistry::new(schemas));
        debug!(types = registry.len(), "Loaded type registry");
        self.registry.insert((), registry.clone()).await;
        Ok(registry)
    }

    pub async fn mapping(&self, index: &str) -> SearchResult<Arc<IndexMapping>> {
        if let Some(mapping) = self.mappings.get(index).await {
            return Ok(mapping);
        }

        let raw = self.provider.mapping(index).await?;
        let mapping = Arc::new(IndexMapping::from_json(&raw));
        debug!(
            index = %index,
            nested_paths = mapping.nested_paths().count(),
            "Loaded index mapping"
        );
        self.mappings.insert(index.to_string(), mapping.clone()).await;
        Ok(mapping)
    }

    /// Union of the nested paths of every index in `indices`
    pub async fn merged_mapping(&self, indices: &[String]) -> SearchResult<IndexMapping> {
        let mut merged = IndexMapping::default();
        for index in indices {
            merged.merge(&*self.mapping(index).await?);
        }
        Ok(merged)
    }

    /// Registry plus the merged mapping of every index in `indices`
    pub async fn snapshot(&self, indices: &[String]) -> SearchResult<SchemaSnapshot> {
        let registry = self.registry().await?;
        let mapping = self.merged_mapping(indices).await?;

        Ok(SchemaSnapshot {
            registry,
            mapping: Arc::new(mapping),
        })
    }

    /// Drop everything; the next request reloads from the provider
    pub async fn invalidate_all(&self) {
        self.registry.invalidate_all();
        self.mappings.invalidate_all();
    }
}
