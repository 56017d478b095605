//! HTTP interface.
//!
//! Every handler answers with a well-formed JSON payload (or plain `OK` for
//! `/health`); failures never escape as empty bodies.

use crate::config::Services;
use crate::error::DiscoveryError;
use crate::orchestrator::{OrchestratorOptions, QueryInput, DEFAULT_MAX_RESULTS};
use crate::paper::Paper;
use crate::rankings::MinTier;
use crate::summary::{SummaryRequest, SUMMARY_FAILED};
use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

type SharedState = Arc<Services>;

/// Build the application router
pub fn build_router(services: Services) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/sources", get(sources_handler))
        .route("/papers", get(papers_handler))
        .route("/extract-phrases", post(extract_phrases_handler))
        .route("/summary", post(summary_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(services))
}

/// Serve until the listener fails
pub async fn serve(listener: tokio::net::TcpListener, services: Services) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(addr = %addr, "HTTP server listening");
    }
    axum::serve(listener, build_router(services)).await
}

/// Health check endpoint
async fn health_handler() -> &'static str {
    "OK"
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SourceInfo {
    name: &'static str,
    display_name: &'static str,
    is_api: bool,
}

async fn sources_handler(State(state): State<SharedState>) -> Json<Vec<SourceInfo>> {
    Json(
        state
            .registry
            .iter()
            .map(|s| SourceInfo {
                name: s.name,
                display_name: s.display_name,
                is_api: s.is_api(),
            })
            .collect(),
    )
}

/// `/papers` query string; every field is optional and leniently parsed
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PapersQuery {
    query: Option<String>,
    sources: Option<String>,
    max_results: Option<String>,
    #[serde(rename = "minSJR")]
    min_sjr: Option<String>,
}

impl PapersQuery {
    fn options(&self) -> OrchestratorOptions {
        let sources: Vec<String> = self
            .sources
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        OrchestratorOptions {
            sources: (!sources.is_empty()).then_some(sources),
            max_results: self
                .max_results
                .as_deref()
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(DEFAULT_MAX_RESULTS),
            min_tier: self.min_sjr.as_deref().map(MinTier::parse).unwrap_or_default(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Serialize)]
struct PapersResponse {
    data: Vec<Paper>,
}

async fn papers_handler(
    State(state): State<SharedState>,
    Query(params): Query<PapersQuery>,
) -> Json<PapersResponse> {
    let Some(query) = params.query.as_deref().map(str::trim).filter(|q| !q.is_empty()) else {
        return Json(PapersResponse { data: Vec::new() });
    };

    let options = params.options();
    info!(query = %query, sources = ?options.sources, max_results = options.max_results, "Papers request");

    let outcome = state
        .orchestrator
        .run_once(QueryInput::Phrases(vec![query.to_string()]), &options)
        .await;

    match outcome.into_result() {
        Ok(data) => Json(PapersResponse { data }),
        Err(e) => {
            error!(error = %e, "Papers request failed");
            Json(PapersResponse { data: Vec::new() })
        }
    }
}

#[derive(Debug, Deserialize)]
struct ExtractRequest {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct ExtractResponse {
    phrases: Vec<String>,
    count: usize,
}

fn error_response(status: StatusCode, message: &str, details: Option<String>) -> Response {
    let body = match details {
        Some(details) => json!({ "error": message, "details": details }),
        None => json!({ "error": message }),
    };
    (status, Json(body)).into_response()
}

async fn extract_phrases_handler(
    State(state): State<SharedState>,
    body: Result<Json<ExtractRequest>, JsonRejection>,
) -> Response {
    let content = match body {
        Ok(Json(req)) => req.content.unwrap_or_default(),
        Err(rejection) => {
            return error_response(StatusCode::BAD_REQUEST, "Invalid request body", Some(rejection.body_text()))
        }
    };

    match state.extractor.extract(&content).await {
        Ok(phrases) => {
            let phrases: Vec<String> = phrases.into_iter().map(|p| p.text).collect();
            Json(ExtractResponse {
                count: phrases.len(),
                phrases,
            })
            .into_response()
        }
        Err(DiscoveryError::InvalidRequest(message)) => {
            error_response(StatusCode::BAD_REQUEST, &message, None)
        }
        Err(e) => {
            error!(error = %e, "Phrase extraction failed");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to extract phrases",
                Some(e.to_string()),
            )
        }
    }
}

async fn summary_handler(
    State(state): State<SharedState>,
    body: Result<Json<SummaryRequest>, JsonRejection>,
) -> Response {
    let request = match body {
        Ok(Json(req)) => req,
        Err(rejection) => {
            return error_response(StatusCode::BAD_REQUEST, "Invalid request body", Some(rejection.body_text()))
        }
    };

    match state.summarizer.summarize(&request).await {
        Ok(summary) => Json(json!({ "summary": summary })).into_response(),
        Err(DiscoveryError::InvalidRequest(message)) => {
            error_response(StatusCode::BAD_REQUEST, &message, None)
        }
        Err(e) => {
            error!(error = %e, "Summary generation failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "summary": SUMMARY_FAILED })),
            )
                .into_response()
        }
    }
}
