//! Search engine client

use super::error::{SearchError, SearchResult};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error};

/// Executes query documents against a set of indices
#[async_trait]
pub trait SearchEngine: Send + Sync {
    /// Run `body` against the comma-joined `indices`.
    ///
    /// `preference` pins shard selection so paging within one browse session
    /// sees a stable ordering.
    async fn search(&self, indices: &str, body: &Value, preference: Option<&str>)
        -> SearchResult<Value>;
}

/// Elasticsearch-compatible engine over HTTP
#[derive(Clone)]
pub struct HttpSearchEngine {
    client: Client,
    base_url: String,
}

impl HttpSearchEngine {
    pub fn new(base_url: impl Into<String>, timeout_secs: u64) -> SearchResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| SearchError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl SearchEngine for HttpSearchEngine {
    async fn search(
        &self,
        indices: &str,
        body: &Value,
        preference: Option<&str>,
    ) -> SearchResult<Value> {
        let url = format!("{}/{}/_search", self.base_url, indices);
        let mut request = self.client.post(&url).json(body);
        if let Some(preference) = preference {
            request = request.query(&[("preference", preference)]);
        }

        debug!(url = %url, preference = ?preference, "Executing search");

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                let err = SearchError::from(e);
                error!(url = %url, error = %err, query = %body, "Search request failed");
                return Err(err);
            }
        };

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            error!(
                url = %url,
                status = status.as_u16(),
                detail = %detail,
                query = %body,
                "Search engine rejected query"
            );
            return Err(SearchError::Backend(format!(
                "engine returned status {}",
                status.as_u16()
            )));
        }

        response.json().await.map_err(|e| {
            error!(url = %url, error = %e, "Malformed search engine response");
            SearchError::Backend(format!("malformed engine response: {}", e))
        })
    }
}

/// The parts of an engine response the executor needs
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineResponse {
    pub total: u64,
    pub hits: Vec<Value>,
    pub aggregations: Value,
}

impl EngineResponse {
    /// Accepts both `hits.total: N` and `hits.total: {value: N}`
    pub fn from_json(mut raw: Value) -> SearchResult<Self> {
        let hits = raw
            .get_mut("hits")
            .map(Value::take)
            .ok_or_else(|| SearchError::Backend("response has no hits section".to_string()))?;

        let total = match hits.get("total") {
            Some(Value::Number(n)) => n.as_u64(),
            Some(Value::Object(obj)) => obj.get("value").and_then(Value::as_u64),
            _ => None,
        }
        .ok_or_else(|| SearchError::Backend("response has no hit total".to_string()))?;

        let hits = match hits.get("hits") {
            Some(Value::Array(list)) => list.clone(),
            _ => Vec::new(),
        };

        let aggregations = raw
            .get_mut("aggregations")
            .map(Value::take)
            .unwrap_or(Value::Null);

        Ok(Self {
            total,
            hits,
            aggregations,
        })
    }
}
