use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// ==================== RACE STATUS ====================
/// Race lifecycle. Stored as TEXT; the store enforces the same table with
/// guarded conditional updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RaceStatus {
    Pending,
    Full,
    Running,
    Completed,
    Cancelled,
}

impl RaceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RaceStatus::Pending => "pending",
            RaceStatus::Full => "full",
            RaceStatus::Running => "running",
            RaceStatus::Completed => "completed",
            RaceStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(RaceStatus::Pending),
            "full" => Some(RaceStatus::Full),
            "running" => Some(RaceStatus::Running),
            "completed" => Some(RaceStatus::Completed),
            "cancelled" => Some(RaceStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RaceStatus::Completed | RaceStatus::Cancelled)
    }

    /// Canonical transition table. Terminal states reject everything.
    pub fn can_transition_to(&self, next: RaceStatus) -> bool {
        use RaceStatus::*;
        matches!(
            (self, next),
            (Pending, Full)
                | (Pending, Cancelled)
                | (Full, Running)
                | (Full, Cancelled)
                | (Running, Completed)
        )
    }
}

// ==================== RACE ====================
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Race {
    pub race_id: i64,
    pub creator_address: String,
    pub track_id: i64,
    pub entry_token: String,
    pub entry_fee: Decimal,
    pub status: String,
    pub max_participants: i32,
    pub participant_count: i32,
    pub prize_pool: Decimal,
    pub results: Option<serde_json::Value>,
    pub winner_token_id: Option<i64>,
    pub cancelled_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RaceParticipant {
    pub race_id: i64,
    pub rat_token_id: i64,
    pub wallet_address: String,
    pub entered_at: DateTime<Utc>,
    pub released: bool,
}

/// Race plus its roster, the shape the game client reads.
#[derive(Debug, Serialize)]
pub struct RaceDetail {
    #[serde(flatten)]
    pub race: Race,
    pub participants: Vec<RaceParticipant>,
}

/// One entry of the `results` JSONB column, recorded at finish time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaceResultEntry {
    pub rank: i32,
    pub rat_token_id: i64,
    pub prize: String,
}
