use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::models::{ApiResponse, Rat, RatDetail, RatRaceHistoryEntry};
use crate::utils::{clamp_page_limit, normalize_address};

use super::AppState;

#[derive(Debug, Deserialize)]
pub struct RatListQuery {
    pub owner: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct RatHistoryQuery {
    pub limit: Option<i64>,
}

/// GET /api/v1/rats/{token_id}
pub async fn get_rat(
    State(state): State<AppState>,
    Path(token_id): Path<i64>,
) -> Result<Json<ApiResponse<RatDetail>>> {
    let rat = state
        .db
        .get_rat(token_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Rat {} not found", token_id)))?;

    let active_race_id = state.db.active_race_for_rat(token_id).await?;

    Ok(Json(ApiResponse::success(RatDetail {
        rat,
        active_race_id,
    })))
}

/// GET /api/v1/rats?owner=0x...&limit=20
pub async fn list_rats(
    State(state): State<AppState>,
    Query(query): Query<RatListQuery>,
) -> Result<Json<ApiResponse<Vec<Rat>>>> {
    let owner = query
        .owner
        .as_deref()
        .ok_or_else(|| AppError::BadRequest("Query parameter 'owner' is required".to_string()))?;
    let owner = normalize_address(owner)?;
    let limit = clamp_page_limit(query.limit);

    let rats = state.db.list_rats_by_owner(&owner, limit).await?;

    Ok(Json(ApiResponse::success(rats)))
}

/// GET /api/v1/rats/{token_id}/history
pub async fn get_rat_history(
    State(state): State<AppState>,
    Path(token_id): Path<i64>,
    Query(query): Query<RatHistoryQuery>,
) -> Result<Json<ApiResponse<Vec<RatRaceHistoryEntry>>>> {
    let limit = clamp_page_limit(query.limit);
    let history = state.db.rat_race_history(token_id, limit).await?;

    Ok(Json(ApiResponse::success(history)))
}
