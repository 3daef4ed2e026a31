//! Route configuration.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, Method};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::{deliver, BoundaryPolicy, DeliveryMode, ResourceStore};

/// Shared state handed to every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    pub store: Arc<ResourceStore>,
    pub boundary: BoundaryPolicy,
}

impl AppState {
    pub fn new(store: ResourceStore, boundary: BoundaryPolicy) -> Self {
        AppState {
            store: Arc::new(store),
            boundary,
        }
    }
}

/// Create the application router. `GET` routes answer `HEAD` as well.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/file", get(file))
        .route("/file_gzip", get(file_gzip))
        .route("/file_none", get(file_none))
        .route("/flip_etag", get(flip_etag).post(flip_etag))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn file(State(state): State<AppState>, method: Method, headers: HeaderMap) -> Response {
    deliver(&state.store, DeliveryMode::Full, &method, &headers, state.boundary)
}

async fn file_gzip(State(state): State<AppState>, method: Method, headers: HeaderMap) -> Response {
    deliver(&state.store, DeliveryMode::Compressed, &method, &headers, state.boundary)
}

async fn file_none(State(state): State<AppState>, method: Method, headers: HeaderMap) -> Response {
    deliver(&state.store, DeliveryMode::NoRange, &method, &headers, state.boundary)
}

async fn flip_etag(State(state): State<AppState>) -> String {
    let flipped = state.store.flip_version();
    tracing::info!(flipped, "flipped resource version");
    format!("flipVersion={flipped}\n")
}
