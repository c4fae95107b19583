use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::constants::{LEVEL_XP_STEP, PLACED_RANKS, XP_LOSS, XP_PLACED, XP_WIN};

// ==================== RAT ====================
/// Mirrored NFT racer. One row per minted token, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Rat {
    pub token_id: i64,
    pub owner_address: String,
    pub name: String,
    pub variant: i32,
    pub gender: String,
    pub bloodline: String,
    pub stamina: i32,
    pub agility: i32,
    pub speed: i32,
    pub speeds: Vec<i32>,
    pub rarity_score: Decimal,
    pub date_of_birth: DateTime<Utc>,
    pub sire_token_id: Option<i64>,
    pub dam_token_id: Option<i64>,
    pub wins: i32,
    pub placed: i32,
    pub losses: i32,
    pub level: i32,
    pub xp: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Rat plus the non-terminal race it is currently locked into, if any.
#[derive(Debug, Serialize)]
pub struct RatDetail {
    #[serde(flatten)]
    pub rat: Rat,
    pub active_race_id: Option<i64>,
}

/// One row per race a rat has been entered into.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RatRaceHistoryEntry {
    pub race_id: i64,
    pub status: String,
    pub entered_at: DateTime<Utc>,
    pub released: bool,
    pub winner_token_id: Option<i64>,
    pub results: Option<serde_json::Value>,
}

// ==================== RANK OUTCOME ====================
/// Finish-position bucket used when applying race results to rat records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankOutcome {
    Win,
    Placed,
    Loss,
}

impl RankOutcome {
    /// Bucket for a 1-based finishing rank.
    pub fn from_rank(rank: usize) -> Self {
        if rank == 1 {
            RankOutcome::Win
        } else if rank <= 1 + PLACED_RANKS {
            RankOutcome::Placed
        } else {
            RankOutcome::Loss
        }
    }

    pub fn xp_delta(&self) -> i64 {
        match self {
            RankOutcome::Win => XP_WIN,
            RankOutcome::Placed => XP_PLACED,
            RankOutcome::Loss => XP_LOSS,
        }
    }
}

/// Level is derived from lifetime xp, floor 1.
pub fn level_for_xp(xp: i64) -> i32 {
    (1 + xp.max(0) / LEVEL_XP_STEP) as i32
}
