use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use orbweaver_core::{Engine, SearchResult};
use parking_lot::Mutex;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use time::format_description::well_known::Rfc3339;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Keywords echoed per hit.
const MAX_KEYWORDS: usize = 5;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Mutex<Engine>>,
    pub max_results: usize,
}

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
}

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub total_hits: usize,
    pub results: Vec<SearchHit>,
}

#[derive(Serialize)]
pub struct SearchHit {
    pub score: f64,
    pub title: String,
    pub url: String,
    pub last_modified: String,
    pub size_bytes: u64,
    pub keywords: Vec<KeywordCount>,
    pub parent_links: Vec<String>,
    pub child_links: Vec<String>,
}

#[derive(Serialize)]
pub struct KeywordCount {
    pub term: String,
    pub count: u32,
}

pub fn build_app(engine: Arc<Mutex<Engine>>, max_results: usize) -> Router {
    let state = AppState { engine, max_results };
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/search", get(search_handler))
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

fn split_words(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_' || c == '-'))
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Splits a query into its keyword set and, when a double-quoted span is
/// present, the ordered phrase inside the quotes. Keywords cover the whole
/// query, quoted words included, so phrase terms also contribute to scoring.
fn parse_query(q: &str) -> (BTreeSet<String>, Vec<String>) {
    let words: BTreeSet<String> = split_words(q).into_iter().collect();

    let phrase_re = Regex::new("\"([^\"]*)\"").expect("valid regex");
    let phrase = phrase_re
        .captures(q)
        .map(|caps| split_words(&caps[1]))
        .unwrap_or_default();

    (words, phrase)
}

pub async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, (StatusCode, String)> {
    let (words, phrase) = parse_query(&params.q);

    // One worker at a time: the engine may create term IDs even while
    // answering a query, so reads and writes serialize on the same lock.
    let results = {
        let engine = state.engine.lock();
        engine.search(&words, &phrase)
    }
    .map_err(|err| (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?;

    let mut hits: Vec<SearchHit> = results.into_values().map(to_hit).collect();
    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    let total_hits = hits.len();
    hits.truncate(state.max_results);

    Ok(Json(SearchResponse {
        query: params.q,
        total_hits,
        results: hits,
    }))
}

fn to_hit(result: SearchResult) -> SearchHit {
    let mut keywords: Vec<KeywordCount> = result
        .keywords
        .into_iter()
        .map(|(term, count)| KeywordCount { term, count })
        .collect();
    keywords.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.term.cmp(&b.term)));
    keywords.truncate(MAX_KEYWORDS);

    SearchHit {
        score: result.score,
        title: result.title,
        url: result.url,
        last_modified: result
            .last_modified
            .format(&Rfc3339)
            .unwrap_or_else(|_| result.last_modified.to_string()),
        size_bytes: result.size_bytes,
        keywords,
        parent_links: result.parent_links.into_iter().collect(),
        child_links: result.child_links.into_iter().collect(),
    }
}
