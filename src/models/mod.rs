// src/models/mod.rs
pub mod race;
pub mod rat;
pub mod response;
pub mod wallet;

// Re-export commonly used types so other modules can use `crate::models::X`
pub use race::{Race, RaceDetail, RaceParticipant, RaceResultEntry, RaceStatus};
pub use rat::{level_for_xp, RankOutcome, Rat, RatDetail, RatRaceHistoryEntry};
pub use response::{ApiResponse, HookAck};
pub use wallet::{LeaderboardEntry, Wallet, WalletProfile, WalletRaceHistoryEntry};
