use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

use crate::error::Result;
use crate::models::{ApiResponse, LeaderboardEntry, WalletProfile};
use crate::utils::{clamp_page_limit, normalize_address};

use super::AppState;

#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    pub limit: Option<i64>,
}

/// GET /api/v1/wallets/{address}
///
/// A wallet that has never minted or raced still gets a zeroed profile, so
/// the client does not have to special-case fresh addresses.
pub async fn get_wallet(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<ApiResponse<WalletProfile>>> {
    let address = normalize_address(&address)?;

    let wallet = state.db.get_or_create_wallet(&address).await?;

    let rats = state
        .db
        .list_rats_by_owner(&address, clamp_page_limit(None))
        .await?;
    let recent_races = state
        .db
        .wallet_race_history(&address, clamp_page_limit(None))
        .await?;

    Ok(Json(ApiResponse::success(WalletProfile {
        wallet,
        rats,
        recent_races,
    })))
}

/// GET /api/v1/leaderboard?limit=20
pub async fn get_leaderboard(
    State(state): State<AppState>,
    Query(query): Query<LeaderboardQuery>,
) -> Result<Json<ApiResponse<Vec<LeaderboardEntry>>>> {
    let limit = clamp_page_limit(query.limit);
    let entries = state.db.leaderboard(limit).await?;

    Ok(Json(ApiResponse::success(entries)))
}
