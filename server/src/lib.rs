use anyhow::Result;
use axum::{extract::{Path, Query, State}, http::StatusCode, routing::{get, post}, Json, Router};
use parking_lot::{RwLock, RwLockWriteGuard};
use pubsearch_core::persist::{clear_index, load_index_or_default, save_index, IndexPaths};
use pubsearch_core::stats::{CollectionStats, Evaluation};
use pubsearch_core::{DocId, InvertedIndex, Record};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer, AllowOrigin};
use tower_http::trace::TraceLayer;

pub const DEFAULT_PER_PAGE: usize = 5;
const MAX_PER_PAGE: usize = 100;

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_per_page")]
    pub per_page: usize,
}
fn default_page() -> usize { 1 }
fn default_per_page() -> usize { DEFAULT_PER_PAGE }

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub took_s: f64,
    pub total_hits: usize,
    pub page: usize,
    pub total_pages: usize,
    pub results: Vec<SearchHitOut>,
}

#[derive(Serialize)]
pub struct SearchHitOut {
    pub doc_id: DocId,
    pub record: Record,
    pub tfidf_score: f64,
    pub cosine: f64,
}

#[derive(Deserialize)]
pub struct StatsParams {
    pub q: Option<String>,
}

#[derive(Serialize)]
pub struct StatsResponse {
    pub collection: CollectionStats,
    pub needs_rebuild: bool,
    pub query: Option<QueryStats>,
}

#[derive(Serialize)]
pub struct QueryStats {
    pub query: String,
    pub query_terms: usize,
    pub retrieved: usize,
    pub top: Option<SearchHitOut>,
    pub evaluation: Evaluation,
}

/// The engine is built in batches and searched concurrently, so it sits behind a
/// reader-writer lock: searches share it, batch/commit/clear take it exclusively.
#[derive(Clone)]
pub struct AppState {
    pub index_paths_root: PathBuf,
    pub index: Arc<RwLock<InvertedIndex>>,
    pub admin_token: Option<String>,
}

pub fn build_app(index_dir: String) -> Result<Router> {
    let admin_token = std::env::var("ADMIN_TOKEN").ok();
    build_app_with_token(index_dir, admin_token)
}

pub fn build_app_with_token(index_dir: String, admin_token: Option<String>) -> Result<Router> {
    let index_paths = IndexPaths::new(&index_dir);
    let index = load_index_or_default(&index_paths);
    tracing::info!(num_docs = index.num_docs(), vocabulary = index.vocabulary_size(), "index loaded");
    let app_state = AppState {
        index_paths_root: PathBuf::from(&index_dir),
        index: Arc::new(RwLock::new(index)),
        admin_token,
    };

    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    let app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/search", get(search_handler))
        .route("/doc/:doc_id", get(doc_handler))
        .route("/stats", get(stats_handler))
        .route("/index/batch", post(index_batch))
        .route("/index/commit", post(index_commit))
        .route("/index/clear", post(index_clear))
        .with_state(app_state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());
    Ok(app)
}

pub async fn search_handler(State(state): State<AppState>, Query(params): Query<SearchParams>) -> Json<SearchResponse> {
    let start = std::time::Instant::now();
    let per_page = params.per_page.clamp(1, MAX_PER_PAGE);
    let page = params.page.max(1);

    let index = state.index.read();
    let hits = index.search(&params.q);
    let total_hits = hits.len();
    let total_pages = total_hits.div_ceil(per_page);
    let results: Vec<SearchHitOut> = hits
        .into_iter()
        .skip((page - 1).saturating_mul(per_page))
        .take(per_page)
        .map(|h| SearchHitOut { doc_id: h.doc_id, record: h.record.clone(), tfidf_score: h.tfidf_score, cosine: h.cosine })
        .collect();
    drop(index);

    let elapsed = start.elapsed();
    Json(SearchResponse { query: params.q, took_s: elapsed.as_secs_f64(), total_hits, page, total_pages, results })
}

pub async fn doc_handler(State(state): State<AppState>, Path(doc_id): Path<DocId>) -> Result<Json<Record>, (StatusCode, String)> {
    match state.index.read().doc(doc_id) {
        Some(record) => Ok(Json(record.clone())),
        None => Err((StatusCode::NOT_FOUND, format!("document {doc_id} not found"))),
    }
}

pub async fn stats_handler(State(state): State<AppState>, Query(params): Query<StatsParams>) -> Json<StatsResponse> {
    let index = state.index.read();
    let collection = CollectionStats::compute(&index);
    let query = params.q.filter(|q| !q.trim().is_empty()).map(|q| {
        let hits = index.search(&q);
        let evaluation = Evaluation::compute(&index, &q, &hits);
        let top = hits.first().map(|h| SearchHitOut {
            doc_id: h.doc_id,
            record: h.record.clone(),
            tfidf_score: h.tfidf_score,
            cosine: h.cosine,
        });
        QueryStats { query_terms: q.split_whitespace().count(), retrieved: hits.len(), top, evaluation, query: q }
    });
    Json(StatsResponse { collection, needs_rebuild: index.needs_rebuild(), query })
}

// --- Admin endpoints ---
async fn index_batch(State(state): State<AppState>, headers: axum::http::HeaderMap, Json(records): Json<Vec<Record>>) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    authorize(&state, &headers)?;
    let mut index = state.index.write();
    let mut next_id: DocId = index.docs().keys().next_back().map_or(0, |id| id + 1);
    let ingested = records.len();
    for record in records {
        index
            .ingest_unique(next_id, record)
            .map_err(|e| (StatusCode::CONFLICT, e.to_string()))?;
        next_id += 1;
    }
    tracing::info!(ingested, num_docs = index.num_docs(), "batch ingested");
    Ok(Json(serde_json::json!({
        "ingested": ingested,
        "num_docs": index.num_docs(),
        "needs_rebuild": index.needs_rebuild(),
    })))
}

async fn index_commit(State(state): State<AppState>, headers: axum::http::HeaderMap) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    authorize(&state, &headers)?;
    let mut index = state.index.write();
    index.rebuild();
    let index = RwLockWriteGuard::downgrade(index);
    save_index(&IndexPaths::new(&state.index_paths_root), &index)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(Json(serde_json::json!({
        "num_docs": index.num_docs(),
        "vocabulary_size": index.vocabulary_size(),
    })))
}

async fn index_clear(State(state): State<AppState>, headers: axum::http::HeaderMap) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    authorize(&state, &headers)?;
    *state.index.write() = InvertedIndex::new();
    clear_index(&IndexPaths::new(&state.index_paths_root))
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    tracing::info!("index cleared");
    Ok(Json(serde_json::json!({ "cleared": true })))
}

fn authorize(state: &AppState, headers: &axum::http::HeaderMap) -> Result<(), (StatusCode, String)> {
    let required = match &state.admin_token {
        Some(t) => t,
        None => return Err((StatusCode::UNAUTHORIZED, "ADMIN_TOKEN not set".into())),
    };
    let provided = headers.get("X-ADMIN-TOKEN").and_then(|v| v.to_str().ok()).unwrap_or("");
    if provided == required {
        Ok(())
    } else {
        Err((StatusCode::UNAUTHORIZED, "invalid admin token".into()))
    }
}
