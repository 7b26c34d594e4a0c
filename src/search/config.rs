//! Search configuration

use serde::{Deserialize, Serialize};

/// Search service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Base URL of the search engine
    #[serde(default = "default_engine_url")]
    pub engine_url: String,

    /// Prefix prepended to every index name
    #[serde(default)]
    pub index_prefix: Option<String>,

    /// Page size when the request does not specify `limit`
    #[serde(default = "default_limit")]
    pub default_limit: usize,

    /// Upper clamp for bounded page sizes
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,

    /// Chunk size used by exhaustive ("limit=all") fetches
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Maximum number of buckets per terms facet
    #[serde(default = "default_facet_size")]
    pub facet_size: usize,

    /// Search engine request timeout (seconds)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Statuses hidden unless the caller asks for them
    #[serde(default = "default_excluded_statuses")]
    pub excluded_statuses: Vec<String>,

    /// Operational types hidden unless explicitly requested
    #[serde(default = "default_internal_types")]
    pub internal_types: Vec<String>,

    /// Cookie carrying the search session token
    #[serde(default = "default_session_cookie")]
    pub session_cookie: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            engine_url: default_engine_url(),
            index_prefix: None,
            default_limit: default_limit(),
            max_limit: default_max_limit(),
            chunk_size: default_chunk_size(),
            facet_size: default_facet_size(),
            timeout_secs: default_timeout_secs(),
            excluded_statuses: default_excluded_statuses(),
            internal_types: default_internal_types(),
            session_cookie: default_session_cookie(),
        }
    }
}

impl SearchConfig {
    /// Physical index name for a canonical type name
    pub fn index_name(&self, type_name: &str) -> String {
        let snake = crate::schema::snake_case(type_name);
        match &self.index_prefix {
            Some(prefix) => format!("{}{}", prefix, snake),
            None => snake,
        }
    }
}

/// Builder for SearchConfig
pub struct SearchConfigBuilder {
    config: SearchConfig,
}

impl SearchConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: SearchConfig::default(),
        }
    }

    pub fn engine_url(mut self, url: impl Into<String>) -> Self {
        self.config.engine_url = url.into();
        self
    }

    pub fn index_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.index_prefix = Some(prefix.into());
        self
    }

    pub fn default_limit(mut self, limit: usize) -> Self {
        self.config.default_limit = limit;
        self
    }

    pub fn max_limit(mut self, limit: usize) -> Self {
        self.config.max_limit = limit;
        self
    }

    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size.max(1);
        self
    }

    pub fn facet_size(mut self, size: usize) -> Self {
        self.config.facet_size = size;
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.timeout_secs = secs;
        self
    }

    pub fn excluded_statuses(mut self, statuses: Vec<String>) -> Self {
        self.config.excluded_statuses = statuses;
        self
    }

    pub fn internal_types(mut self, types: Vec<String>) -> Self {
        self.config.internal_types = types;
        self
    }

    pub fn build(self) -> SearchConfig {
        self.config
    }
}

impl Default for SearchConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn default_engine_url() -> String {
    "http://localhost:9200".to_string()
}

fn default_limit() -> usize {
    25
}

fn default_max_limit() -> usize {
    10_000
}

fn default_chunk_size() -> usize {
    100
}

fn default_facet_size() -> usize {
    100
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_excluded_statuses() -> Vec<String> {
    vec!["deleted".to_string(), "replaced".to_string()]
}

fn default_internal_types() -> Vec<String> {
    vec!["TrackingItem".to_string(), "OntologyTerm".to_string()]
}

fn default_session_cookie() -> String {
    "searchSessionID".to_string()
}
