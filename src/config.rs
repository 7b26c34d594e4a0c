use crate::search::SearchConfig;
use serde::{Deserialize, Serialize};

/// Settings for the `facet-query` server, layered from the embedded
/// `config/default.toml`, an optional `CONFIG_PATH` file and
/// `FACET_QUERY__<SECTION>__<KEY>` environment variables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    /// Engine endpoint, paging and visibility defaults
    pub search: SearchConfig,
    pub schema: SchemaConfig,
    pub observability: ObservabilityConfig,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let config_path =
            std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config/local.toml".to_string());

        config::Config::builder()
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            .add_source(config::File::with_name(&config_path).required(false))
            .add_source(
                config::Environment::with_prefix("FACET_QUERY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Reject settings the compiler cannot work with
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        let search = &self.search;
        if search.chunk_size == 0 {
            return Err(config::ConfigError::Message(
                "search.chunk_size must be positive".to_string(),
            ));
        }
        if search.default_limit > search.max_limit {
            return Err(config::ConfigError::Message(format!(
                "search.default_limit {} exceeds search.max_limit {}",
                search.default_limit, search.max_limit
            )));
        }
        if self.schema.cache_capacity == 0 {
            return Err(config::ConfigError::Message(
                "schema.cache_capacity must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Listening socket
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub http_port: u16,
    /// Seconds before an in-flight request is abandoned
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            http_port: 8080,
            request_timeout_secs: 30,
        }
    }
}

/// Where type schemas and index mappings come from, and how long they are kept
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaConfig {
    /// Base URL serving `/profiles/`
    pub profiles_url: String,
    /// Read `profiles.json` and `mappings/*.json` from disk instead
    pub directory: Option<String>,
    pub cache_capacity: u64,
    pub cache_ttl_secs: u64,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            profiles_url: "http://localhost:6543".to_string(),
            directory: None,
            cache_capacity: 256,
            cache_ttl_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Level for the `facet_query` target when `RUST_LOG` is unset
    pub log_level: String,
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}
