//! Chat endpoint: the natural-language read path

use super::{ApiError, AppState};
use crate::query::ChatResponse;
use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub query: String,
}

/// POST / — answer one natural-language query
pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let query = payload.query.trim();
    if query.is_empty() {
        return Err(ApiError::Invalid("query must not be empty".to_string()));
    }

    info!(query, "chat request");
    let response = state.engine.answer(query).await?;
    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use crate::api::testsupport::test_router;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt;

    async fn post_query(query: &str) -> (StatusCode, serde_json::Value) {
        let app = test_router().await;
        let request = Request::builder()
            .method("POST")
            .uri("/")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                serde_json::json!({ "query": query }).to_string(),
            ))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_informational_query() {
        let (status, body) = post_query("What are Argo floats?").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["has_data"], false);
        assert!(body.get("table_data").is_none());

        let message = body["message"].as_str().unwrap();
        let sentences = message.matches(['.', '!', '?']).count();
        assert!((2..=4).contains(&sentences), "got: {}", message);
    }

    #[tokio::test]
    async fn test_aggregated_spatial_query() {
        let (status, body) = post_query("Show me temperature in the Arabian Sea").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["has_data"], true);

        let columns: Vec<&str> = body["table_data"]["columns"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c.as_str().unwrap())
            .collect();
        for expected in [
            "depth_range",
            "avg_temperature",
            "min_temperature",
            "max_temperature",
            "measurement_count",
        ] {
            assert!(columns.contains(&expected), "missing {}", expected);
        }

        // Depth bins, not raw rows: levels at 10/60/110 dbar make 3 bins
        assert_eq!(body["table_data"]["total_rows"], 3);
    }

    #[tokio::test]
    async fn test_float_lookup_rows_match_float() {
        let (status, body) = post_query("Get data from float 1902482").await;

        assert_eq!(status, StatusCode::OK);
        let rows = body["table_data"]["rows"].as_array().unwrap();
        assert!(!rows.is_empty());
        assert!(rows.len() <= 500);
        for row in rows {
            assert_eq!(row["float_id"], "1902482");
        }
    }

    #[tokio::test]
    async fn test_empty_query_rejected() {
        let (status, body) = post_query("   ").await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["status"], "error");
    }
}
