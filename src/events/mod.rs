// src/events/mod.rs
pub mod envelope;

pub use envelope::{EventKey, HookEvent, WebhookEnvelope};

/// Recognized contract event families. Anything else is acknowledged and
/// skipped so the provider never retries it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Mint,
    Transfer,
    RaceCreated,
    RacerEntered,
    RaceCancelled,
    RaceFinished,
}

impl EventKind {
    /// Classify a provider event name. Tolerates snake/kebab case variants.
    pub fn from_name(name: &str) -> Option<Self> {
        let normalized: String = name
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();

        match normalized.as_str() {
            "mint" => Some(EventKind::Mint),
            "transfer" => Some(EventKind::Transfer),
            "racecreated" => Some(EventKind::RaceCreated),
            "racerentered" => Some(EventKind::RacerEntered),
            "racecancelled" => Some(EventKind::RaceCancelled),
            "racefinished" => Some(EventKind::RaceFinished),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Mint => "Mint",
            EventKind::Transfer => "Transfer",
            EventKind::RaceCreated => "RaceCreated",
            EventKind::RacerEntered => "RacerEntered",
            EventKind::RaceCancelled => "RaceCancelled",
            EventKind::RaceFinished => "RaceFinished",
        }
    }

    /// Kinds without a natural storage key need `(tx_hash, log_index)` for
    /// deduplication. Mint dedups on token_id, RaceCreated on race_id.
    pub fn requires_provenance(&self) -> bool {
        matches!(
            self,
            EventKind::Transfer
                | EventKind::RacerEntered
                | EventKind::RaceCancelled
                | EventKind::RaceFinished
        )
    }
}
