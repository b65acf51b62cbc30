use axum::{extract::State, Json};
use serde::Serialize;

use crate::error::{ApiResponse, Result};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub storage: &'static str,
}

/// GET /api/v1/health
pub async fn health(State(state): State<AppState>) -> Result<Json<ApiResponse<HealthResponse>>> {
    sqlx::query("SELECT 1").execute(state.db.pool()).await?;
    Ok(Json(ApiResponse::success(HealthResponse {
        status: "ok",
        storage: state.client.storage_type(),
    })))
}
