use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::models::{ApiResponse, Race, RaceDetail, RaceStatus};
use crate::utils::clamp_page_limit;

use super::AppState;

#[derive(Debug, Deserialize)]
pub struct RaceListQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

/// GET /api/v1/races/{race_id}
pub async fn get_race(
    State(state): State<AppState>,
    Path(race_id): Path<i64>,
) -> Result<Json<ApiResponse<RaceDetail>>> {
    let race = state
        .db
        .get_race(race_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Race {} not found", race_id)))?;

    let participants = state.db.get_participants(race_id).await?;

    Ok(Json(ApiResponse::success(RaceDetail {
        race,
        participants,
    })))
}

/// GET /api/v1/races?status=pending&limit=20
pub async fn list_races(
    State(state): State<AppState>,
    Query(query): Query<RaceListQuery>,
) -> Result<Json<ApiResponse<Vec<Race>>>> {
    // Status yang tidak dikenal ditolak supaya typo tidak diam-diam
    // mengembalikan daftar kosong
    let status = match query.status.as_deref() {
        Some(raw) => RaceStatus::parse(raw)
            .ok_or_else(|| AppError::BadRequest(format!("Unknown race status '{}'", raw)))?,
        None => RaceStatus::Pending,
    };
    let limit = clamp_page_limit(query.limit);

    let races = state.db.list_races_by_status(status.as_str(), limit).await?;

    Ok(Json(ApiResponse::success(races)))
}
