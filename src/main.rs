use facet_query::{
    api::{build_router, AppState},
    config::Config,
    schema::{DirectorySchemaProvider, HttpSchemaProvider, SchemaCache, SchemaProvider},
    search::{HttpSearchEngine, QueryCompiler, SearchService},
    AppError,
};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "facet_query={},tower_http=info",
            config.observability.log_level
        )
        .into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    if config.observability.json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> facet_query::Result<()> {
    // Load configuration
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) if std::env::var_os("CONFIG_PATH").is_some() => return Err(e.into()),
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            eprintln!("Using default configuration");
            Config::default()
        }
    };

    config.validate()?;
    init_tracing(&config);

    tracing::info!("Starting facet-query v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(engine = %config.search.engine_url, "Search engine configured");

    // Schema provider and cache
    let provider: Arc<dyn SchemaProvider> = match &config.schema.directory {
        Some(dir) if !std::path::Path::new(dir).is_dir() => {
            return Err(AppError::Configuration(format!(
                "schema directory {} does not exist",
                dir
            )));
        }
        Some(dir) => {
            tracing::info!(directory = %dir, "Loading schemas from directory");
            Arc::new(DirectorySchemaProvider::new(dir))
        }
        None => {
            tracing::info!(profiles = %config.schema.profiles_url, "Loading schemas over HTTP");
            Arc::new(HttpSchemaProvider::new(
                &config.schema.profiles_url,
                &config.search.engine_url,
                config.search.timeout_secs,
            )?)
        }
    };
    let schemas = SchemaCache::new(
        provider,
        config.schema.cache_capacity,
        Duration::from_secs(config.schema.cache_ttl_secs),
    );

    // Search engine client
    let engine = Arc::new(HttpSearchEngine::new(
        &config.search.engine_url,
        config.search.timeout_secs,
    )?);

    let service = Arc::new(SearchService::new(
        QueryCompiler::new(schemas, config.search.clone()),
        engine,
    ));

    let app = build_router(AppState::new(service));

    let addr = format!("{}:{}", config.server.host, config.server.http_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("HTTP server listening on {}", addr);

    tokio::select! {
        result = axum::serve(listener, app) => {
            if let Err(e) = result {
                tracing::error!("HTTP server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    tracing::info!("Shutting down gracefully...");
    Ok(())
}
