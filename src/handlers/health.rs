// src/handlers/health.rs

use std::time::Instant;

use axum::{Json, extract::State, http::StatusCode};
use serde_json::{Value, json};

use crate::config::AppState;

#[utoipa::path(
    get,
    path = "/health/db",
    tag = "Health",
    responses(
        (status = 200, description = "Banco acessível: {status, db, latency_ms}"),
        (status = 503, description = "Banco inacessível")
    )
)]
pub async fn db_health(State(app_state): State<AppState>) -> (StatusCode, Json<Value>) {
    let started = Instant::now();
    match sqlx::query_scalar::<_, i32>("SELECT 1").fetch_one(&app_state.db_pool).await {
        Ok(_) => {
            let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
            (StatusCode::OK, Json(json!({ "status": "ok", "db": "ok", "latency_ms": latency_ms })))
        }
        Err(e) => {
            tracing::error!(error = %e, "Health check do banco falhou");
            (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "status": "error", "db": "down" })))
        }
    }
}
