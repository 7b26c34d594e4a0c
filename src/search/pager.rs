//! Result windows: bounded pages and the exhaustive hit stream

use super::config::SearchConfig;
use super::engine::{EngineResponse, SearchEngine};
use super::error::{SearchError, SearchResult};
use super::params::QueryParams;
use futures::stream::{self, Stream};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, warn};

pub const LIMIT_ALL: &str = "all";

/// Requested window size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSize {
    Count(usize),
    /// Every matching document, only valid for raw hit sequences
    All,
}

/// Validated paging request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub from: usize,
    pub size: PageSize,
}

fn non_negative(key: &str, value: i64) -> SearchResult<usize> {
    usize::try_from(value)
        .map_err(|_| SearchError::BadRequest(format!("{} must not be negative (got {})", key, value)))
}

impl PageRequest {
    /// Build from an offset and a limit that may be `"all"`.
    ///
    /// `generator` is true when the caller consumes a raw hit sequence instead of
    /// a formatted page; `limit=all` is rejected otherwise. Numeric limits are
    /// clamped to `max_limit`.
    pub fn new(
        from: Option<i64>,
        limit: Option<&str>,
        generator: bool,
        config: &SearchConfig,
    ) -> SearchResult<Self> {
        let from = match from {
            Some(from) => non_negative("from", from)?,
            None => 0,
        };

        let size = match limit.map(str::trim) {
            None | Some("") => PageSize::Count(config.default_limit),
            Some(value) if value.eq_ignore_ascii_case(LIMIT_ALL) => {
                if !generator {
                    return Err(SearchError::BadRequest(
                        "limit=all is only supported when requesting a raw result sequence"
                            .to_string(),
                    ));
                }
                PageSize::All
            }
            Some(value) => {
                let parsed: i64 = value.parse().map_err(|_| {
                    SearchError::BadRequest(format!("Invalid limit '{}'", value))
                })?;
                let count = non_negative("limit", parsed)?;
                if count > config.max_limit {
                    warn!(requested = count, max = config.max_limit, "Clamping limit");
                }
                PageSize::Count(count.min(config.max_limit))
            }
        };

        Ok(Self { from, size })
    }

    /// Paging from the reserved `from` and `limit` parameters
    pub fn from_params(
        params: &QueryParams,
        generator: bool,
        config: &SearchConfig,
    ) -> SearchResult<Self> {
        let from = params
            .get("from")
            .map(|value| {
                value
                    .trim()
                    .parse::<i64>()
                    .map_err(|_| SearchError::BadRequest(format!("Invalid from '{}'", value)))
            })
            .transpose()?;

        Self::new(from, params.get("limit"), generator, config)
    }

    pub fn is_exhaustive(&self) -> bool {
        self.size == PageSize::All
    }

    /// Number of hits requested for a bounded window
    pub fn limit(&self) -> usize {
        match self.size {
            PageSize::Count(count) => count,
            PageSize::All => 0,
        }
    }
}

/// Forward-only sequence over every hit of a query.
///
/// Opening the stream runs the first chunk with aggregations to learn the
/// total. Each following chunk is requested only after the previous one has
/// been consumed, so at most one chunk is held in memory. The stream cannot be
/// rewound, and it ends for good after the first failed fetch.
pub struct HitStream {
    engine: Arc<dyn SearchEngine>,
    indices: String,
    body: Value,
    chunk_size: usize,
    total: u64,
    aggregations: Value,
    buffer: VecDeque<Value>,
    chunks_fetched: usize,
    chunks_remaining: usize,
    finished: bool,
}

impl HitStream {
    /// Run the first chunk and prepare the remaining `ceil(total / C) - 1` fetches
    pub async fn open(
        engine: Arc<dyn SearchEngine>,
        indices: impl Into<String>,
        mut body: Value,
        chunk_size: usize,
    ) -> SearchResult<Self> {
        let indices = indices.into();
        let chunk_size = chunk_size.max(1);

        body["from"] = Value::from(0);
        body["size"] = Value::from(chunk_size);

        let first = EngineResponse::from_json(engine.search(&indices, &body, None).await?)?;

        if let Some(obj) = body.as_object_mut() {
            obj.remove("aggs");
        }

        let chunks_total = (first.total as usize).div_ceil(chunk_size);
        debug!(
            indices = %indices,
            total = first.total,
            chunk_size,
            chunks = chunks_total,
            "Opened hit stream"
        );

        Ok(Self {
            engine,
            indices,
            body,
            chunk_size,
            total: first.total,
            aggregations: first.aggregations,
            buffer: first.hits.into(),
            chunks_fetched: 1,
            chunks_remaining: chunks_total.saturating_sub(1),
            finished: false,
        })
    }

    /// Total matches reported by the first chunk
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Aggregations returned with the first chunk
    pub fn aggregations(&self) -> &Value {
        &self.aggregations
    }

    /// Engine requests issued so far, including the first chunk
    pub fn chunks_fetched(&self) -> usize {
        self.chunks_fetched
    }

    async fn fetch_next_chunk(&mut self) -> SearchResult<()> {
        let from = self.chunks_fetched * self.chunk_size;
        self.body["from"] = Value::from(from);

        debug!(indices = %self.indices, from, "Fetching next chunk");
        let raw = self.engine.search(&self.indices, &self.body, None).await?;
        let chunk = EngineResponse::from_json(raw)?;

        self.chunks_fetched += 1;
        self.chunks_remaining -= 1;
        self.buffer.extend(chunk.hits);
        Ok(())
    }

    /// Next hit, fetching a chunk only when the buffer has drained
    pub async fn next(&mut self) -> Option<SearchResult<Value>> {
        loop {
            if let Some(hit) = self.buffer.pop_front() {
                return Some(Ok(hit));
            }
            if self.finished || self.chunks_remaining == 0 {
                return None;
            }

            if let Err(e) = self.fetch_next_chunk().await {
                self.finished = true;
                return Some(Err(e));
            }

            if self.buffer.is_empty() {
                warn!(
                    indices = %self.indices,
                    chunks_fetched = self.chunks_fetched,
                    "Engine returned an empty chunk before the reported total"
                );
                self.finished = true;
            }
        }
    }

    /// Adapt into a `futures` stream
    pub fn into_stream(self) -> impl Stream<Item = SearchResult<Value>> + Send {
        stream::unfold(self, |mut hits| async move {
            hits.next().await.map(|item| (item, hits))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::config::SearchConfigBuilder;

    fn config() -> SearchConfig {
        SearchConfigBuilder::new()
            .default_limit(25)
            .max_limit(500)
            .build()
    }

    #[test]
    fn test_defaults_and_clamp() {
        let page = PageRequest::new(None, None, false, &config()).unwrap();
        assert_eq!(page, PageRequest { from: 0, size: PageSize::Count(25) });

        let page = PageRequest::new(Some(10), Some("9000"), false, &config()).unwrap();
        assert_eq!(page.size, PageSize::Count(500));
        assert_eq!(page.from, 10);
    }

    #[test]
    fn test_negative_values_are_rejected() {
        assert!(matches!(
            PageRequest::new(Some(-1), None, false, &config()),
            Err(SearchError::BadRequest(_))
        ));
        assert!(matches!(
            PageRequest::new(None, Some("-5"), false, &config()),
            Err(SearchError::BadRequest(_))
        ));
    }

    #[test]
    fn test_limit_all_requires_generator() {
        assert!(PageRequest::new(None, Some("all"), false, &config()).is_err());
        let page = PageRequest::new(None, Some("all"), true, &config()).unwrap();
        assert!(page.is_exhaustive());
    }

    #[test]
    fn test_from_params() {
        let params = QueryParams::parse("type=Sample&from=50&limit=10").unwrap();
        let page = PageRequest::from_params(&params, false, &config()).unwrap();
        assert_eq!(page, PageRequest { from: 50, size: PageSize::Count(10) });

        let params = QueryParams::parse("from=abc").unwrap();
        assert!(PageRequest::from_params(&params, false, &config()).is_err());
    }
}
