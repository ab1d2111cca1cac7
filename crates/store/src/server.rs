//! HTTP admin surface for inspecting and manipulating logs.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{Method, StatusCode},
    response::IntoResponse,
    routing::{get, put},
};
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info};

use crate::{store::MemoryLogStore, types::AdminOptions};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<MemoryLogStore>,
}

/// Create the router with all admin endpoints.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/logs", get(handle_list))
        .route("/logs/{key}", get(handle_info).delete(handle_delete))
        .route("/logs/{key}/groups", get(handle_groups))
        .route("/logs/{key}/ttl", put(handle_ttl))
        .layer(cors)
        .with_state(state)
}

/// GET - List live logs
async fn handle_list(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.store.list())
}

/// GET - Log summary
async fn handle_info(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> impl IntoResponse {
    match state.store.info(&key) {
        Some(info) => Json(info).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// GET - Consumer groups of a log
async fn handle_groups(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> impl IntoResponse {
    match state.store.group_infos(&key) {
        Some(groups) => Json(groups).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// DELETE - Delete a log
async fn handle_delete(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> impl IntoResponse {
    debug!(key = %key, "Deleting log");
    if state.store.delete(&key) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

/// PUT - Set a log's time-to-live; the body is a number of seconds
async fn handle_ttl(
    State(state): State<AppState>,
    Path(key): Path<String>,
    body: String,
) -> impl IntoResponse {
    let seconds = match body.trim().parse::<u64>() {
        Ok(seconds) => seconds,
        Err(_) => {
            return (StatusCode::BAD_REQUEST, "TTL must be a number of seconds").into_response();
        }
    };

    match state.store.expire(&key, seconds) {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    }
}

/// Start the admin server over an existing store.
pub async fn start_server(store: Arc<MemoryLogStore>, options: AdminOptions) -> std::io::Result<()> {
    let router = create_router(AppState { store });

    let addr = format!("{}:{}", options.host, options.port);
    info!("Starting log store admin server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
