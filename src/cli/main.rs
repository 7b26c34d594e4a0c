use anyhow::Context;
use clap::{Parser, Subcommand};
use facet_query::schema::{DirectorySchemaProvider, SchemaCache};
use facet_query::search::{
    CompoundSearchRequest, FilterSet, QueryCompiler, QueryParams, SearchConfig, EVERYONE,
};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

const PRINCIPALS_HEADER: &str = "x-effective-principals";

#[derive(Parser)]
#[command(name = "fq-cli")]
#[command(about = "Faceted search query CLI", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    endpoint: String,

    /// Effective principals sent with each request
    #[arg(short, long = "principal", global = true)]
    principals: Vec<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a search
    Search {
        /// Item type to search
        #[arg(short, long = "type")]
        item_type: Option<String>,

        /// Extra query string, e.g. `status=released&tissue=liver`
        #[arg(short, long, default_value = "")]
        query: String,

        /// Page size or `all`
        #[arg(short, long)]
        limit: Option<String>,
    },

    /// Run a compound search from a JSON request body
    Compound {
        #[arg(short, long)]
        file: String,
    },

    /// Print the engine request a search compiles to, without contacting any server
    Compile {
        /// Directory holding `profiles/*.json` and `mappings/*.json`
        #[arg(short, long)]
        schemas: String,

        /// Query string to compile
        #[arg(short, long, conflicts_with = "file")]
        query: Option<String>,

        /// Compound request body to compile
        #[arg(short, long)]
        file: Option<String>,
    },

    /// Check server health
    Health,
}

fn principals_header(principals: &[String]) -> String {
    if principals.is_empty() {
        EVERYONE.to_string()
    } else {
        principals.join(",")
    }
}

async fn print_response(response: reqwest::Response) -> anyhow::Result<()> {
    let status = response.status();
    let text = response.text().await?;

    match serde_json::from_str::<serde_json::Value>(&text) {
        Ok(body) => println!("{}", serde_json::to_string_pretty(&body)?),
        // ndjson and plain bodies print as-is
        Err(_) => print!("{}", text),
    }

    if !status.is_success() {
        anyhow::bail!("server returned status {}", status);
    }
    Ok(())
}

fn read_compound(path: &str) -> anyhow::Result<CompoundSearchRequest> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path))
}

async fn compile(
    schemas: &str,
    query: Option<String>,
    file: Option<String>,
    principals: &[String],
) -> anyhow::Result<serde_json::Value> {
    let config = SearchConfig::default();
    let cache = SchemaCache::new(
        Arc::new(DirectorySchemaProvider::new(schemas)),
        16,
        Duration::from_secs(60),
    );
    let compiler = QueryCompiler::new(cache, config.clone());

    let plan = match file {
        Some(path) => {
            let request = read_compound(&path)?;
            compiler
                .compile_compound(&FilterSet::from_request(&request)?, principals)
                .await?
        }
        None => {
            let params = QueryParams::parse(query.as_deref().unwrap_or_default())?;
            compiler.compile(&params, None, principals).await?
        }
    };

    Ok(serde_json::json!({
        "indices": plan.indices,
        "query_string": plan.query_string,
        "body": plan.body(0, config.default_limit, true, None),
    }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let client = Client::new();
    let principals = principals_header(&cli.principals);

    match cli.command {
        Commands::Search {
            item_type,
            query,
            limit,
        } => {
            let mut params = QueryParams::parse(&query)?;
            if let Some(item_type) = item_type {
                params.push("type", item_type);
            }
            if let Some(limit) = limit {
                params.push("limit", limit);
            }

            let response = client
                .get(format!("{}/search/?{}", cli.endpoint, params.to_query_string()))
                .header(PRINCIPALS_HEADER, principals)
                .send()
                .await?;
            print_response(response).await?;
        }

        Commands::Compound { file } => {
            let request = read_compound(&file)?;
            let response = client
                .post(format!("{}/compound_search", cli.endpoint))
                .header(PRINCIPALS_HEADER, principals)
                .json(&request)
                .send()
                .await?;
            print_response(response).await?;
        }

        Commands::Compile {
            schemas,
            query,
            file,
        } => {
            let principals: Vec<String> = if cli.principals.is_empty() {
                vec![EVERYONE.to_string()]
            } else {
                cli.principals
            };
            let compiled = compile(&schemas, query, file, &principals).await?;
            println!("{}", serde_json::to_string_pretty(&compiled)?);
        }

        Commands::Health => {
            let response = client.get(format!("{}/health", cli.endpoint)).send().await?;
            print_response(response).await?;
        }
    }

    Ok(())
}
