//! Faceted, permission-scoped search over a nested document index
//!
//! Every search runs through the same pipeline:
//!
//! ```text
//! raw params ──► normalize ──► extract filters ──► build bool query
//!                                   │                    │
//!                                   ▼                    ▼
//!                           derive facets ──► aggregations (self-excluding)
//!                                                        │
//!                                                        ▼
//!                        permission guard ──► engine ──► page | hit stream
//! ```
//!
//! - **Normalization** resolves type names, adds the `.display_title` suffix to
//!   link fields and produces one canonical query string.
//! - **Extraction** splits parameters into term filters, range filters and the
//!   free-text query, after seeding the permission, type and status filters.
//! - **Building** turns filters into a [`QueryNode`] tree, sharing one `nested`
//!   node per nested path.
//! - **Facets** are computed under a `global` aggregation so counts ignore the
//!   result window; each facet drops the filters on its own field.
//! - **Compound searches** compile several filter blocks and join them with OR
//!   or AND.
//!
//! Compilation is pure and synchronous over an immutable schema snapshot; only
//! schema loading and engine calls await.
//!
//! # Example
//!
//! ```no_run
//! use facet_query::schema::{SchemaCache, StaticSchemaProvider};
//! use facet_query::search::{
//!     HttpSearchEngine, QueryCompiler, QueryParams, SearchConfig, SearchOutput, SearchRequest,
//!     SearchService,
//! };
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SearchConfig::default();
//!     let schemas = SchemaCache::new(
//!         Arc::new(StaticSchemaProvider::new(vec![])),
//!         100,
//!         Duration::from_secs(300),
//!     );
//!     let engine = Arc::new(HttpSearchEngine::new(&config.engine_url, config.timeout_secs)?);
//!     let service = SearchService::new(QueryCompiler::new(schemas, config), engine);
//!
//!     let params = QueryParams::parse("type=Sample&status=released&limit=10")?;
//!     let request = SearchRequest::new(vec!["system.Everyone".to_string()], params);
//!
//!     if let SearchOutput::Page { response, .. } = service.search(request).await? {
//!         println!("Found {} documents", response.total);
//!     }
//!
//!     Ok(())
//! }
//! ```

mod builder;
mod compound;
mod config;
mod engine;
mod error;
mod extractor;
mod facets;
mod formatter;
mod normalizer;
mod pager;
mod params;
mod permission;
mod query;
mod service;
mod session;

pub use builder::{build_sort, merge_nested, CompiledQuery, QueryBuilder, SortClause};
pub use compound::{CompoundPlan, CompoundSearchRequest, FilterBlock, FilterSet, Flag, Limit};
pub use config::{SearchConfig, SearchConfigBuilder};
pub use engine::{EngineResponse, HttpSearchEngine, SearchEngine};
pub use error::{SearchError, SearchResult};
pub use extractor::{
    extract_filters, range_field, term_field, AppliedFilter, ExtractedFilters, FieldFilter,
    Presence, RangeFilter, RangeValue, DATE_FORMAT, STATUS_FIELD, TYPE_FIELD,
};
pub use facets::{
    add_summary_aggregations, build_aggregations, derive_facets, exclude_facet_field,
    parse_facet_results, AggregationType, FacetResult, FacetScope, FacetSpec, FacetStats,
    FacetTerm, GLOBAL_AGG, PRIMARY_AGG, REVERSE_NESTED_AGG,
};
pub use formatter::{
    active_facet_fields, columns_for, format_page, project_hit, Frame, PageContent,
    SearchResponse, SEARCH_PATH,
};
pub use normalizer::{normalize, suffix_link_field, NormalizedQuery, LINK_SUFFIX};
pub use pager::{HitStream, PageRequest, PageSize, LIMIT_ALL};
pub use params::{is_reserved, QueryParams, NO_VALUE, RESERVED_KEYS};
pub use permission::{verify_permissions, PermissionFilter, PERMISSION_FIELD};
pub use query::{BoolQuery, Occur, QueryNode, TEXT_FIELDS};
pub use service::{ExecutionPlan, QueryCompiler, SearchOutput, SearchRequest, SearchService, EVERYONE};
pub use session::{SearchSession, SessionDecision};
