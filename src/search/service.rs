//! Query compilation and execution

use super::builder::{build_sort, QueryBuilder, SortClause};
use super::compound::{CompoundPlan, CompoundSearchRequest, FilterSet};
use super::config::SearchConfig;
use super::engine::{EngineResponse, SearchEngine};
use super::error::{SearchError, SearchResult};
use super::extractor::{extract_filters, AppliedFilter};
use super::facets::{
    add_summary_aggregations, build_aggregations, derive_facets, parse_facet_results, FacetScope,
    FacetSpec,
};
use super::formatter::{active_facet_fields, format_page, project_hit, Frame, PageContent, SearchResponse};
use super::normalizer::{normalize, NormalizedQuery};
use super::pager::{HitStream, PageRequest};
use super::params::QueryParams;
use super::permission::verify_permissions;
use super::query::{BoolQuery, QueryNode};
use super::session::{SearchSession, SessionDecision};
use crate::schema::{IndexMapping, SchemaCache, TypeRegistry};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument};

/// Principal used when the caller carries no effective principals
pub const EVERYONE: &str = "system.Everyone";

/// A search as handed over by the routing and auth layer
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub principals: Vec<String>,
    pub params: QueryParams,
    pub forced_types: Option<Vec<String>>,
    pub session: Option<SearchSession>,
    /// Raw hit sequence instead of a formatted page
    pub generator: bool,
    /// Issued by another component rather than a browsing client
    pub internal: bool,
    pub custom_aggregations: Option<Map<String, Value>>,
}

impl SearchRequest {
    pub fn new(principals: Vec<String>, params: QueryParams) -> Self {
        let principals = if principals.is_empty() {
            vec![EVERYONE.to_string()]
        } else {
            principals
        };

        Self {
            principals,
            params,
            forced_types: None,
            session: None,
            generator: false,
            internal: false,
            custom_aggregations: None,
        }
    }

    pub fn with_forced_types(mut self, types: Vec<String>) -> Self {
        self.forced_types = Some(types);
        self
    }

    pub fn with_session(mut self, session: Option<SearchSession>) -> Self {
        self.session = session;
        self
    }

    pub fn with_generator(mut self, generator: bool) -> Self {
        self.generator = generator;
        self
    }

    pub fn internal(mut self) -> Self {
        self.internal = true;
        self
    }

    pub fn frame(&self) -> SearchResult<Frame> {
        self.params
            .get("frame")
            .unwrap_or_default()
            .parse()
            .map_err(SearchError::BadRequest)
    }
}

/// Everything needed to run one compiled search.
///
/// The permission guard has already accepted `query` by the time a plan
/// exists.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    pub indices: Vec<String>,
    pub types: Vec<String>,
    pub query_string: String,
    pub query: QueryNode,
    pub facets: Vec<FacetSpec>,
    pub aggregations: Value,
    pub sort: Vec<SortClause>,
    pub filters: Vec<AppliedFilter>,
    pub registry: Arc<TypeRegistry>,
}

impl ExecutionPlan {
    pub fn index_list(&self) -> String {
        self.indices.join(",")
    }

    /// Engine request body for one window
    pub fn body(
        &self,
        from: usize,
        size: usize,
        with_aggregations: bool,
        custom: Option<&Map<String, Value>>,
    ) -> Value {
        let mut body = json!({
            "query": self.query.to_json(),
            "sort": self.sort.iter().map(SortClause::to_json).collect::<Vec<_>>(),
            "from": from,
            "size": size,
            "track_total_hits": true,
        });

        if with_aggregations {
            let mut aggs = self.aggregations.clone();
            if size == 0 {
                add_summary_aggregations(&mut aggs, &self.registry, &self.types, custom);
            }
            body["aggs"] = aggs;
        }

        body
    }
}

/// Turns raw parameters and compound bodies into guarded execution plans
#[derive(Clone)]
pub struct QueryCompiler {
    schemas: SchemaCache,
    config: SearchConfig,
}

impl QueryCompiler {
    pub fn new(schemas: SchemaCache, config: SearchConfig) -> Self {
        Self { schemas, config }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn schemas(&self) -> &SchemaCache {
        &self.schemas
    }

    /// Physical indices for the concrete types below `types`, in order
    pub fn indices(&self, registry: &TypeRegistry, types: &[String]) -> Vec<String> {
        let mut indices: Vec<String> = Vec::new();
        for name in types {
            let concrete = registry.concrete_types(name);
            let names = if concrete.is_empty() {
                vec![name.clone()]
            } else {
                concrete
            };
            for concrete in names {
                let index = self.config.index_name(&concrete);
                if !indices.contains(&index) {
                    indices.push(index);
                }
            }
        }
        indices
    }

    /// Compile a regular search
    #[instrument(skip(self, params, principals), fields(query = %params.to_query_string()))]
    pub async fn compile(
        &self,
        params: &QueryParams,
        forced_types: Option<&[String]>,
        principals: &[String],
    ) -> SearchResult<ExecutionPlan> {
        let registry = self.schemas.registry().await?;
        let normalized = normalize(params, forced_types, &registry)?;
        let indices = self.indices(&registry, &normalized.types);
        let mapping = self.schemas.merged_mapping(&indices).await?;

        let plan = self.compile_single(registry, &mapping, normalized, indices, principals)?;
        verify_permissions(&plan.query, principals)?;
        Ok(plan)
    }

    fn compile_single(
        &self,
        registry: Arc<TypeRegistry>,
        mapping: &IndexMapping,
        normalized: NormalizedQuery,
        indices: Vec<String>,
        principals: &[String],
    ) -> SearchResult<ExecutionPlan> {
        let filters = extract_filters(&normalized, &registry, principals, &self.config)?;
        let compiled = QueryBuilder::new(mapping).build(&filters)?;
        let facets = derive_facets(&registry, &normalized, mapping);
        let aggregations = build_aggregations(
            &facets,
            FacetScope::SelfExcluding(&compiled),
            mapping,
            self.config.facet_size,
        );
        let sort_params = normalized.params.get_all("sort");
        let sort = build_sort(
            &sort_params,
            &registry,
            &normalized.types,
            compiled.text.is_some(),
        );

        Ok(ExecutionPlan {
            indices,
            types: normalized.types,
            query_string: normalized.query_string,
            query: compiled.to_node(),
            facets,
            aggregations,
            sort,
            filters: filters.applied,
            registry,
        })
    }

    /// Compile a compound search.
    ///
    /// Zero or one filter block compiles like a regular search. Several blocks
    /// are compiled against one schema snapshot and joined with OR, or AND
    /// when the filter set intersects; every facet is then scoped to the
    /// joined query.
    #[instrument(skip(self, filter_set, principals), fields(search_type = %filter_set.search_type()))]
    pub async fn compile_compound(
        &self,
        filter_set: &FilterSet,
        principals: &[String],
    ) -> SearchResult<ExecutionPlan> {
        let forced = vec![filter_set.search_type().to_string()];

        let (blocks, intersect) = match filter_set.plan()? {
            CompoundPlan::Single(params) => {
                return self.compile(&params, Some(forced.as_slice()), principals).await;
            }
            CompoundPlan::Blocks { blocks, intersect } => (blocks, intersect),
        };

        let registry = self.schemas.registry().await?;
        let normalized = blocks
            .iter()
            .map(|params| normalize(params, Some(forced.as_slice()), &registry))
            .collect::<SearchResult<Vec<_>>>()?;

        let Some(indices) = normalized
            .first()
            .map(|first| self.indices(&registry, &first.types))
        else {
            return Err(SearchError::InvalidState(
                "compound plan without blocks".to_string(),
            ));
        };
        let mapping = self.schemas.merged_mapping(&indices).await?;

        let compiled = normalized
            .into_iter()
            .map(|block| {
                self.compile_single(registry.clone(), &mapping, block, indices.clone(), principals)
            })
            .collect::<SearchResult<Vec<_>>>()?;
        let first = &compiled[0];

        let mut facets: Vec<FacetSpec> = Vec::new();
        for facet in compiled.iter().flat_map(|plan| plan.facets.iter()) {
            if !facets.iter().any(|f| f.field == facet.field) {
                facets.push(facet.clone());
            }
        }

        let branches: Vec<QueryNode> = compiled.iter().map(|plan| plan.query.clone()).collect();
        let query = if intersect {
            QueryNode::Bool(BoolQuery {
                must: branches,
                ..Default::default()
            })
        } else {
            QueryNode::Bool(BoolQuery::any_of(branches))
        };

        verify_permissions(&query, principals)?;

        let aggregations = build_aggregations(
            &facets,
            FacetScope::Fixed(&query),
            &mapping,
            self.config.facet_size,
        );

        debug!(
            blocks = compiled.len(),
            intersect,
            "Compiled compound search"
        );

        Ok(ExecutionPlan {
            indices: first.indices.clone(),
            types: first.types.clone(),
            query_string: first
                .types
                .iter()
                .map(|t| ("type".to_string(), t.clone()))
                .collect::<QueryParams>()
                .to_query_string(),
            query,
            facets,
            aggregations,
            sort: first.sort.clone(),
            filters: Vec::new(),
            registry,
        })
    }
}

/// Result of executing a search
pub enum SearchOutput {
    /// Formatted page plus the session the response should carry
    Page {
        response: Box<SearchResponse>,
        session: SessionDecision,
    },
    /// Raw documents of a bounded window
    Hits(Vec<Value>),
    /// Every matching document, fetched lazily
    Stream { hits: HitStream, frame: Frame },
}

/// Compiles and runs searches against the engine
#[derive(Clone)]
pub struct SearchService {
    compiler: QueryCompiler,
    engine: Arc<dyn SearchEngine>,
}

impl SearchService {
    pub fn new(compiler: QueryCompiler, engine: Arc<dyn SearchEngine>) -> Self {
        Self { compiler, engine }
    }

    pub fn compiler(&self) -> &QueryCompiler {
        &self.compiler
    }

    fn config(&self) -> &SearchConfig {
        self.compiler.config()
    }

    /// Run a regular search
    pub async fn search(&self, request: SearchRequest) -> SearchResult<SearchOutput> {
        let page = PageRequest::from_params(&request.params, request.generator, self.config())?;
        let frame = request.frame()?;
        let plan = self
            .compiler
            .compile(
                &request.params,
                request.forced_types.as_deref(),
                &request.principals,
            )
            .await?;

        self.execute(&plan, page, frame, &request).await
    }

    /// Run a compound search
    pub async fn compound_search(
        &self,
        principals: Vec<String>,
        body: &CompoundSearchRequest,
    ) -> SearchResult<SearchOutput> {
        let filter_set = FilterSet::from_request(body)?;
        let limit = body.limit.as_ref().map(|l| l.as_param());
        let page = PageRequest::new(body.from, limit.as_deref(), body.return_generator, self.config())?;

        let request = SearchRequest::new(principals, QueryParams::new())
            .with_generator(body.return_generator)
            .internal();
        let plan = self
            .compiler
            .compile_compound(&filter_set, &request.principals)
            .await?;

        self.execute(&plan, page, Frame::Embedded, &request).await
    }

    /// Exhaustive hit sequence for a compiled plan
    pub async fn search_all(&self, plan: &ExecutionPlan) -> SearchResult<HitStream> {
        let chunk_size = self.config().chunk_size;
        let body = plan.body(0, chunk_size, true, None);
        HitStream::open(self.engine.clone(), plan.index_list(), body, chunk_size).await
    }

    async fn execute(
        &self,
        plan: &ExecutionPlan,
        page: PageRequest,
        frame: Frame,
        request: &SearchRequest,
    ) -> SearchResult<SearchOutput> {
        if page.is_exhaustive() {
            info!(indices = %plan.index_list(), "Starting exhaustive search");
            let hits = self.search_all(plan).await?;
            return Ok(SearchOutput::Stream { hits, frame });
        }

        // Raw hit windows never set a cookie, so they run without a session
        let session = if request.generator {
            SessionDecision::default()
        } else {
            SearchSession::resolve(request.session.clone(), &page, request.internal)
        };
        let body = plan.body(
            page.from,
            page.limit(),
            !request.generator,
            request.custom_aggregations.as_ref(),
        );

        let started = Instant::now();
        let raw = self
            .engine
            .search(
                &plan.index_list(),
                &body,
                session.session.as_ref().map(SearchSession::token),
            )
            .await?;
        let response = EngineResponse::from_json(raw)?;

        info!(
            indices = %plan.index_list(),
            total = response.total,
            returned = response.hits.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Search executed"
        );

        if request.generator {
            let hits = response
                .hits
                .iter()
                .map(|hit| project_hit(hit, frame))
                .collect();
            return Ok(SearchOutput::Hits(hits));
        }

        let facets = parse_facet_results(
            &plan.facets,
            &response.aggregations,
            &active_facet_fields(&plan.filters),
        );

        let formatted = format_page(PageContent {
            registry: &plan.registry,
            types: &plan.types,
            query_string: &plan.query_string,
            frame,
            total: response.total,
            hits: &response.hits,
            facets,
            sort: &plan.sort,
            filters: &plan.filters,
        });

        Ok(SearchOutput::Page {
            response: Box::new(formatted),
            session,
        })
    }
}
