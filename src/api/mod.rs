//! Read-only JSON API
//!
//! Thin axum handlers over the query engine and the dev snapshot
//! store. The chat endpoint routes through the full read path; the
//! /floats endpoints are hand-written parameterized queries that
//! bypass classification entirely.

mod chat;
mod floats;

pub use chat::*;
pub use floats::*;

use crate::config::Config;
use crate::error::Error;
use crate::query::QueryEngine;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::error;

/// Shared state for all handlers
pub struct AppState {
    pub engine: QueryEngine,
    pub config: Config,
}

/// Build the API router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(health).post(chat))
        .route("/floats/radius", get(floats_radius))
        .route("/floats/indian-ocean", get(floats_indian_ocean))
        .route("/floats/all", get(floats_all))
        .route("/floats/trajectories/radius", get(trajectories_radius))
        .route("/floats/{float_id}", get(float_detail))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve the API until the process is stopped
pub async fn serve(state: Arc<AppState>) -> crate::error::Result<()> {
    let addr = state.config.server.bind_addr.clone();
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("listening on {}", addr);
    axum::serve(listener, app)
        .await
        .map_err(|e| Error::Other(format!("server error: {}", e)))?;
    Ok(())
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "floatchat",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// API error envelope: 422 for bad parameters, 404 for unknown floats,
/// 500 for everything else
#[derive(Debug)]
pub enum ApiError {
    Invalid(String),
    NotFound(String),
    Internal(String),
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::FloatNotFound(id) => ApiError::NotFound(format!("Float not found: {}", id)),
            e @ (Error::QueryValidation(_) | Error::QueryTimeout(_)) => {
                ApiError::Invalid(e.to_string())
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Invalid(m) => (StatusCode::UNPROCESSABLE_ENTITY, m),
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            ApiError::Internal(m) => {
                error!("internal error: {}", m);
                (StatusCode::INTERNAL_SERVER_ERROR, m)
            }
        };

        (
            status,
            Json(json!({ "status": "error", "error": message })),
        )
            .into_response()
    }
}
