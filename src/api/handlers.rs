use crate::api::AppState;
use crate::error::Result;
use crate::search::{
    project_hit, CompoundSearchRequest, Frame, HitStream, QueryParams, SearchOutput,
    SearchRequest, SearchResult, SearchSession,
};
use crate::error::AppError;
use axum::{
    body::Body,
    extract::{Path, RawQuery, State},
    http::{header, HeaderMap, HeaderValue, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use futures::StreamExt;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};
use validator::Validate;

/// Header carrying the caller's effective principals, comma separated
pub const PRINCIPALS_HEADER: &str = "x-effective-principals";

const NDJSON: &str = "application/x-ndjson";

/// Health check endpoint
pub async fn health_check() -> Result<Json<HealthResponse>> {
    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    }))
}

/// Unknown routes answer with the JSON error body
pub async fn not_found(uri: Uri) -> AppError {
    AppError::NotFound(uri.path().to_string())
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Effective principals in header order; empty when the header is absent
pub fn principals_from_headers(headers: &HeaderMap) -> Vec<String> {
    headers
        .get(PRINCIPALS_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn session_from_headers(headers: &HeaderMap, cookie_name: &str) -> Option<SearchSession> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(|cookie| SearchSession::from_cookie_header(cookie, cookie_name))
}

fn ndjson_line(doc: &Value) -> SearchResult<Vec<u8>> {
    let mut line = serde_json::to_vec(doc)?;
    line.push(b'\n');
    Ok(line)
}

fn ndjson_response(body: Body) -> Response {
    (StatusCode::OK, [(header::CONTENT_TYPE, NDJSON)], body).into_response()
}

fn stream_response(hits: HitStream, frame: Frame) -> Response {
    let total = hits.total();
    let lines = hits
        .into_stream()
        .map(move |item| item.and_then(|hit| ndjson_line(&project_hit(&hit, frame))));

    debug!(total, "Streaming all hits");
    ndjson_response(Body::from_stream(lines))
}

fn output_response(output: SearchOutput, cookie_name: &str) -> Result<Response> {
    match output {
        SearchOutput::Page { response, session } => {
            let mut http = Json(*response).into_response();
            if let (true, Some(session)) = (session.set_cookie, session.session) {
                match HeaderValue::from_str(&session.set_cookie_header(cookie_name)) {
                    Ok(value) => {
                        http.headers_mut().insert(header::SET_COOKIE, value);
                    }
                    Err(e) => warn!(error = %e, "Could not encode session cookie"),
                }
            }
            Ok(http)
        }
        SearchOutput::Hits(hits) => {
            let mut body = Vec::new();
            for hit in &hits {
                body.extend(ndjson_line(hit)?);
            }
            Ok(ndjson_response(Body::from(body)))
        }
        SearchOutput::Stream { hits, frame } => Ok(stream_response(hits, frame)),
    }
}

fn search_request(state: &AppState, headers: &HeaderMap, query: Option<String>) -> Result<SearchRequest> {
    let params = QueryParams::parse(query.as_deref().unwrap_or_default())?;
    let generator = params
        .get("format")
        .map(|f| f.eq_ignore_ascii_case("ndjson"))
        .unwrap_or(false);

    Ok(SearchRequest::new(principals_from_headers(headers), params)
        .with_session(session_from_headers(headers, &state.session_cookie))
        .with_generator(generator))
}

/// `GET /search?...`
pub async fn search(
    State(state): State<AppState>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
) -> Result<Response> {
    let request = search_request(&state, &headers, query)?;
    let output = state.service.search(request).await?;
    output_response(output, &state.session_cookie)
}

/// `GET /collections/:type/search?...`, scoped to one type
pub async fn collection_search(
    State(state): State<AppState>,
    Path(type_name): Path<String>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
) -> Result<Response> {
    let request =
        search_request(&state, &headers, query)?.with_forced_types(vec![type_name]);
    let output = state.service.search(request).await?;
    output_response(output, &state.session_cookie)
}

/// `POST /compound_search`
pub async fn compound_search(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CompoundSearchRequest>,
) -> Result<Response> {
    request.validate()?;

    let output = state
        .service
        .compound_search(principals_from_headers(&headers), &request)
        .await?;
    output_response(output, &state.session_cookie)
}
