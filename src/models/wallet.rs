use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::rat::Rat;

// ==================== WALLET ====================
/// Wallet rows are created lazily by the first event that references the
/// address; counters are maintained with atomic increments.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Wallet {
    pub address: String,
    pub rats_owned: i32,
    pub races_entered: i32,
    pub races_won: i32,
    pub created_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WalletRaceHistoryEntry {
    pub race_id: i64,
    pub rat_token_id: i64,
    pub status: String,
    pub entered_at: DateTime<Utc>,
    pub winner_token_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct WalletProfile {
    #[serde(flatten)]
    pub wallet: Wallet,
    pub rats: Vec<Rat>,
    pub recent_races: Vec<WalletRaceHistoryEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LeaderboardEntry {
    pub rank: i64,
    pub address: String,
    pub races_won: i32,
    pub races_entered: i32,
    pub rats_owned: i32,
}
