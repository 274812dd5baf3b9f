use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use regex::{Regex, RegexBuilder};
use searchcore::kgram::is_wildcard;
use searchcore::postings::{PostingsEntry, PostingsList};
use searchcore::{DocId, EngineConfig, IndexError, QueryType, RankingType, SearchOutcome, Searcher};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

const SNIPPET_BEFORE: usize = 100;
const SNIPPET_AFTER: usize = 200;
const MAX_K: usize = 100;
/// Re-weighted terms echoed back by `/feedback`.
const FEEDBACK_TERMS_SHOWN: usize = 10;

type ApiError = (StatusCode, String);

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    #[serde(rename = "type", default)]
    pub query_type: QueryType,
    #[serde(default)]
    pub ranking: RankingType,
    #[serde(default = "default_k")]
    pub k: usize,
}

fn default_k() -> usize {
    10
}

#[derive(Deserialize)]
pub struct SpellParams {
    pub q: String,
    pub limit: Option<usize>,
}

#[derive(Deserialize)]
pub struct FeedbackRequest {
    pub q: String,
    #[serde(default)]
    pub ranking: RankingType,
    /// DocIDs in the order they were shown.
    pub results: Vec<DocId>,
    pub relevant: Vec<bool>,
    #[serde(default = "default_k")]
    pub k: usize,
}

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub took_s: f64,
    pub total_hits: usize,
    pub results: Vec<SearchHit>,
    pub suggestions: Vec<String>,
}

#[derive(Serialize)]
pub struct SearchHit {
    pub doc_id: DocId,
    pub score: f64,
    pub title: String,
    pub path: String,
    pub snippet: Option<String>,
}

#[derive(Serialize)]
pub struct WeightedTerm {
    pub term: String,
    pub weight: f64,
}

#[derive(Serialize)]
pub struct FeedbackResponse {
    #[serde(flatten)]
    pub search: SearchResponse,
    pub terms: Vec<WeightedTerm>,
}

#[derive(Serialize)]
pub struct SpellResponse {
    pub query: String,
    pub suggestions: Vec<String>,
}

#[derive(Clone)]
pub struct AppState {
    pub searcher: Arc<Searcher>,
}

/// Opens the index described by `cfg` and wires up the routes.
pub fn build_app(cfg: EngineConfig) -> Result<Router> {
    let searcher = Searcher::open(cfg)?;
    Ok(router(searcher))
}

pub fn router(searcher: Searcher) -> Router {
    let state = AppState { searcher: Arc::new(searcher) };

    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val.split(',').filter_map(|s| s.trim().parse().ok()).collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/search", get(search_handler))
        .route("/feedback", post(feedback_handler))
        .route("/spell", get(spell_handler))
        .route("/doc/:doc_id", get(doc_handler))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

fn internal(e: IndexError) -> ApiError {
    tracing::error!(error = %e, "request failed");
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

pub async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, ApiError> {
    let start = Instant::now();
    let searcher = &state.searcher;
    let query = searcher.parse_query(&params.q);
    let outcome = searcher.search(&query, params.query_type, params.ranking).map_err(internal)?;
    Ok(Json(respond(searcher, params.q, &outcome, params.k, start)))
}

pub async fn feedback_handler(
    State(state): State<AppState>,
    Json(req): Json<FeedbackRequest>,
) -> Result<Json<FeedbackResponse>, ApiError> {
    if req.results.len() != req.relevant.len() {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("{} results but {} relevance flags", req.results.len(), req.relevant.len()),
        ));
    }
    let start = Instant::now();
    let searcher = &state.searcher;
    let mut query = searcher.parse_query(&req.q);
    let shown = PostingsList::from_entries(req.results.iter().map(|&id| PostingsEntry::new(id)).collect());
    searcher.relevance_feedback(&mut query, &shown, &req.relevant).map_err(internal)?;

    let outcome = searcher.search(&query, QueryType::Ranked, req.ranking).map_err(internal)?;
    let terms = query
        .terms()
        .iter()
        .take(FEEDBACK_TERMS_SHOWN)
        .map(|t| WeightedTerm { term: t.term.clone(), weight: t.weight })
        .collect();
    tracing::debug!(q = %req.q, new_terms = query.len(), "relevance feedback applied");
    Ok(Json(FeedbackResponse { search: respond(searcher, req.q, &outcome, req.k, start), terms }))
}

pub async fn spell_handler(
    State(state): State<AppState>,
    Query(params): Query<SpellParams>,
) -> Result<Json<SpellResponse>, ApiError> {
    let searcher = &state.searcher;
    let limit = params.limit.unwrap_or(searcher.config().spelling_limit);
    let query = searcher.parse_query(&params.q);
    let suggestions = searcher.spell_check(&query, limit).map_err(internal)?.unwrap_or_default();
    Ok(Json(SpellResponse { query: params.q, suggestions }))
}

pub async fn doc_handler(
    State(state): State<AppState>,
    Path(doc_id): Path<DocId>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Some(info) = state.searcher.docs().get(doc_id) else {
        return Err((StatusCode::NOT_FOUND, format!("no document {doc_id}")));
    };
    let mut obj = serde_json::json!({
        "doc_id": doc_id,
        "title": info.name(),
        "path": info.path,
        "length": info.length,
    });
    if let Ok(text) = std::fs::read_to_string(&info.path) {
        obj["text"] = serde_json::Value::String(text);
    }
    Ok(Json(obj))
}

fn respond(searcher: &Searcher, query: String, outcome: &SearchOutcome, k: usize, start: Instant) -> SearchResponse {
    let k = k.clamp(1, MAX_K);
    let terms: Vec<&str> = query.split_whitespace().filter(|t| !is_wildcard(t)).collect();
    let highlighter = highlighter(&terms);

    let mut results = Vec::new();
    for entry in outcome.results.iter().take(k) {
        let Some(info) = searcher.docs().get(entry.doc_id) else { continue };
        let snippet = highlighter.as_ref().and_then(|re| snippet_from_file(&info.path, re));
        results.push(SearchHit {
            doc_id: entry.doc_id,
            score: entry.score,
            title: info.name().to_string(),
            path: info.path.clone(),
            snippet,
        });
    }

    SearchResponse {
        query,
        took_s: start.elapsed().as_secs_f64(),
        total_hits: outcome.results.len(),
        results,
        suggestions: outcome.suggestions.clone(),
    }
}

/// Case-insensitive matcher for any of the query words.
fn highlighter(terms: &[&str]) -> Option<Regex> {
    if terms.is_empty() {
        return None;
    }
    let alternation = terms.iter().map(|t| regex::escape(t)).collect::<Vec<_>>().join("|");
    RegexBuilder::new(&alternation).case_insensitive(true).build().ok()
}

fn snippet_from_file(path: &str, matcher: &Regex) -> Option<String> {
    let text = std::fs::read_to_string(path).ok()?;
    if text.is_empty() {
        return None;
    }
    let snippet = match matcher.find(&text) {
        Some(m) => {
            let start = char_boundary(&text, m.start().saturating_sub(SNIPPET_BEFORE));
            let end = char_boundary(&text, (m.start() + SNIPPET_AFTER).min(text.len()));
            &text[start..end]
        }
        None => {
            let end = char_boundary(&text, SNIPPET_AFTER.min(text.len()));
            &text[..end]
        }
    };
    Some(matcher.replace_all(snippet, "<em>$0</em>").into_owned())
}

/// Largest char boundary not after `at`.
fn char_boundary(text: &str, mut at: usize) -> usize {
    while at > 0 && !text.is_char_boundary(at) {
        at -= 1;
    }
    at
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn highlights_every_query_word() {
        let re = highlighter(&["rust", "fast"]).unwrap();
        let out = re.replace_all("Rust is fast, rust.", "<em>$0</em>");
        assert_eq!(out, "<em>Rust</em> is <em>fast</em>, <em>rust</em>.");
    }

    #[test]
    fn snippet_respects_char_boundaries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.txt");
        let text = format!("{}needle{}", "é".repeat(80), "ü".repeat(150));
        std::fs::write(&path, &text).unwrap();
        let re = highlighter(&["needle"]).unwrap();
        let snippet = snippet_from_file(&path.to_string_lossy(), &re).unwrap();
        assert!(snippet.contains("<em>needle</em>"));
    }

    #[test]
    fn boundary_moves_backwards() {
        let s = "aé";
        assert_eq!(char_boundary(s, 2), 1);
        assert_eq!(char_boundary(s, 3), 3);
    }
}
