use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use tower_http::cors::CorsLayer;

use crate::history::{History, HistoryEntry};

#[derive(Clone)]
pub struct AppState {
    pub history: Arc<History>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/debug/recent", get(debug_recent))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

async fn debug_recent(State(state): State<AppState>) -> Json<Vec<HistoryEntry>> {
    Json(state.history.snapshot_last_n(10))
}
