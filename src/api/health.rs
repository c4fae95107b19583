use axum::{extract::State, Json};
use serde::Serialize;
use super::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub database: String,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    // Cek koneksi Database (SQLx)
    // Menggunakan pool() untuk cek apakah database merespon
    let db_status = if state.db.pool().acquire().await.is_ok() {
        "connected".to_string()
    } else {
        "disconnected".to_string()
    };

    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: db_status,
    })
}
