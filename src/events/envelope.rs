use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::constants::VARIANT_COUNT;
use crate::error::{AppError, Result};
use crate::utils::normalize_address;

use super::EventKind;

// ==================== ENVELOPE ====================
/// Outer webhook body. Parsed only after the signature over the raw bytes
/// has been verified.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEnvelope {
    pub event_name: String,
    #[serde(default)]
    pub parameters: Value,
    #[serde(default)]
    pub network: Option<String>,
    #[serde(default)]
    pub block_number: Option<i64>,
    #[serde(default)]
    pub transaction_hash: Option<String>,
    #[serde(default)]
    pub log_index: Option<i32>,
    /// Block timestamp, unix seconds.
    #[serde(default)]
    pub timestamp: Option<i64>,
}

impl WebhookEnvelope {
    pub fn parse(raw: &[u8]) -> Result<Self> {
        serde_json::from_slice(raw)
            .map_err(|e| AppError::BadRequest(format!("Malformed webhook body: {}", e)))
    }

    pub fn kind(&self) -> Option<EventKind> {
        EventKind::from_name(&self.event_name)
    }

    /// Dedup key for event kinds without a natural storage key.
    pub fn provenance(&self) -> Result<EventKey> {
        let tx_hash = self.transaction_hash.as_deref().ok_or_else(|| {
            AppError::Validation("transaction_hash is required for this event".to_string())
        })?;
        let log_index = self.log_index.ok_or_else(|| {
            AppError::Validation("log_index is required for this event".to_string())
        })?;
        if log_index < 0 {
            return Err(AppError::Validation(
                "log_index must be non-negative".to_string(),
            ));
        }

        Ok(EventKey {
            tx_hash: normalize_tx_hash(tx_hash)?,
            log_index,
        })
    }

    /// Block time, falling back to receipt time for providers that omit it.
    pub fn event_time(&self) -> DateTime<Utc> {
        self.timestamp
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .unwrap_or_else(Utc::now)
    }
}

/// `(tx_hash, log_index)` — globally unique per emitted log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventKey {
    pub tx_hash: String,
    pub log_index: i32,
}

fn normalize_tx_hash(value: &str) -> Result<String> {
    let trimmed = value.trim();
    let hex_part = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    if hex_part.is_empty() || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(AppError::Validation(format!(
            "transaction_hash '{}' is not valid hex",
            trimmed
        )));
    }
    Ok(format!("0x{}", hex_part.to_lowercase()))
}

fn from_params<T: DeserializeOwned>(params: &Value) -> Result<T> {
    serde_json::from_value(params.clone())
        .map_err(|e| AppError::Validation(format!("Invalid event parameters: {}", e)))
}

fn ensure_non_negative(value: i64, field: &str) -> Result<()> {
    if value < 0 {
        return Err(AppError::Validation(format!(
            "{} must be non-negative, got {}",
            field, value
        )));
    }
    Ok(())
}

// ==================== EVENT PARAMETERS ====================
// Raw wire shapes; amounts arrive as strings and are parsed explicitly.

#[derive(Debug, Deserialize)]
struct MintParams {
    recipient: String,
    token_id: i64,
    variant: i32,
}

#[derive(Debug, Deserialize)]
struct TransferParams {
    from: String,
    to: String,
    token_id: i64,
}

#[derive(Debug, Deserialize)]
struct RaceCreatedParams {
    race_id: i64,
    creator: String,
    track_id: i64,
    entry_token: String,
    entry_fee: String,
}

#[derive(Debug, Deserialize)]
struct RacerEnteredParams {
    race_id: i64,
    racer: String,
    rat_token_id: i64,
}

#[derive(Debug, Deserialize)]
struct RaceCancelledParams {
    race_id: i64,
    cancelled_by: String,
}

#[derive(Debug, Deserialize)]
struct RaceFinishedParams {
    race_id: i64,
    winners: Vec<i64>,
    prizes: Vec<String>,
}

// ==================== VALIDATED EVENTS ====================

#[derive(Debug, Clone)]
pub struct MintEvent {
    pub recipient: String,
    pub token_id: i64,
    pub variant: i32,
}

#[derive(Debug, Clone)]
pub struct TransferEvent {
    pub from: String,
    pub to: String,
    pub token_id: i64,
}

#[derive(Debug, Clone)]
pub struct RaceCreatedEvent {
    pub race_id: i64,
    pub creator: String,
    pub track_id: i64,
    pub entry_token: String,
    pub entry_fee: Decimal,
}

#[derive(Debug, Clone)]
pub struct RacerEnteredEvent {
    pub race_id: i64,
    pub racer: String,
    pub rat_token_id: i64,
}

#[derive(Debug, Clone)]
pub struct RaceCancelledEvent {
    pub race_id: i64,
    pub cancelled_by: String,
}

#[derive(Debug, Clone)]
pub struct RaceFinishedEvent {
    pub race_id: i64,
    pub winners: Vec<i64>,
    pub prizes: Vec<Decimal>,
}

/// A classified envelope with validated, normalized parameters.
#[derive(Debug, Clone)]
pub enum HookEvent {
    Mint(MintEvent),
    Transfer(TransferEvent),
    RaceCreated(RaceCreatedEvent),
    RacerEntered(RacerEnteredEvent),
    RaceCancelled(RaceCancelledEvent),
    RaceFinished(RaceFinishedEvent),
}

impl HookEvent {
    /// Parse and validate the parameters of a recognized kind.
    pub fn from_envelope(kind: EventKind, envelope: &WebhookEnvelope) -> Result<Self> {
        match kind {
            EventKind::Mint => {
                let raw: MintParams = from_params(&envelope.parameters)?;
                ensure_non_negative(raw.token_id, "token_id")?;
                if raw.variant < 0 || raw.variant >= VARIANT_COUNT {
                    return Err(AppError::Validation(format!(
                        "variant {} out of range 0..{}",
                        raw.variant, VARIANT_COUNT
                    )));
                }
                Ok(HookEvent::Mint(MintEvent {
                    recipient: normalize_address(&raw.recipient)?,
                    token_id: raw.token_id,
                    variant: raw.variant,
                }))
            }
            EventKind::Transfer => {
                let raw: TransferParams = from_params(&envelope.parameters)?;
                ensure_non_negative(raw.token_id, "token_id")?;
                Ok(HookEvent::Transfer(TransferEvent {
                    from: normalize_address(&raw.from)?,
                    to: normalize_address(&raw.to)?,
                    token_id: raw.token_id,
                }))
            }
            EventKind::RaceCreated => {
                let raw: RaceCreatedParams = from_params(&envelope.parameters)?;
                ensure_non_negative(raw.race_id, "race_id")?;
                ensure_non_negative(raw.track_id, "track_id")?;
                let entry_fee = raw.entry_fee.parse::<Decimal>().map_err(|_| {
                    AppError::Validation(format!(
                        "entry_fee '{}' is not a valid amount",
                        raw.entry_fee
                    ))
                })?;
                if entry_fee.is_sign_negative() {
                    return Err(AppError::Validation(
                        "entry_fee must not be negative".to_string(),
                    ));
                }
                Ok(HookEvent::RaceCreated(RaceCreatedEvent {
                    race_id: raw.race_id,
                    creator: normalize_address(&raw.creator)?,
                    track_id: raw.track_id,
                    entry_token: normalize_address(&raw.entry_token)?,
                    entry_fee,
                }))
            }
            EventKind::RacerEntered => {
                let raw: RacerEnteredParams = from_params(&envelope.parameters)?;
                ensure_non_negative(raw.race_id, "race_id")?;
                ensure_non_negative(raw.rat_token_id, "rat_token_id")?;
                Ok(HookEvent::RacerEntered(RacerEnteredEvent {
                    race_id: raw.race_id,
                    racer: normalize_address(&raw.racer)?,
                    rat_token_id: raw.rat_token_id,
                }))
            }
            EventKind::RaceCancelled => {
                let raw: RaceCancelledParams = from_params(&envelope.parameters)?;
                ensure_non_negative(raw.race_id, "race_id")?;
                Ok(HookEvent::RaceCancelled(RaceCancelledEvent {
                    race_id: raw.race_id,
                    cancelled_by: normalize_address(&raw.cancelled_by)?,
                }))
            }
            EventKind::RaceFinished => {
                let raw: RaceFinishedParams = from_params(&envelope.parameters)?;
                ensure_non_negative(raw.race_id, "race_id")?;
                if raw.winners.is_empty() {
                    return Err(AppError::Validation(
                        "winners must not be empty".to_string(),
                    ));
                }
                if raw.winners.len() != raw.prizes.len() {
                    return Err(AppError::Validation(format!(
                        "winners ({}) and prizes ({}) must have equal length",
                        raw.winners.len(),
                        raw.prizes.len()
                    )));
                }
                let mut seen = std::collections::HashSet::new();
                for token_id in &raw.winners {
                    if !seen.insert(*token_id) {
                        return Err(AppError::Validation(format!(
                            "winners repeats token id {}",
                            token_id
                        )));
                    }
                }
                let mut prizes = Vec::with_capacity(raw.prizes.len());
                for prize in &raw.prizes {
                    let amount = prize.parse::<Decimal>().map_err(|_| {
                        AppError::Validation(format!("prize '{}' is not a valid amount", prize))
                    })?;
                    if amount.is_sign_negative() {
                        return Err(AppError::Validation(
                            "prizes must not be negative".to_string(),
                        ));
                    }
                    prizes.push(amount);
                }
                Ok(HookEvent::RaceFinished(RaceFinishedEvent {
                    race_id: raw.race_id,
                    winners: raw.winners,
                    prizes,
                }))
            }
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            HookEvent::Mint(_) => EventKind::Mint,
            HookEvent::Transfer(_) => EventKind::Transfer,
            HookEvent::RaceCreated(_) => EventKind::RaceCreated,
            HookEvent::RacerEntered(_) => EventKind::RacerEntered,
            HookEvent::RaceCancelled(_) => EventKind::RaceCancelled,
            HookEvent::RaceFinished(_) => EventKind::RaceFinished,
        }
    }
}
