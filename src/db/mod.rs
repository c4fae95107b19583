use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::{
    config::Config,
    constants::LEVEL_XP_STEP,
    error::{AppError, Result},
    models::*,
};

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{MAX_PARTICIPANTS, XP_LOSS, XP_PLACED, XP_WIN};
    use crate::services::MetadataGenerator;

    fn test_config(database_url: &str) -> Config {
        Config {
            host: "0.0.0.0".to_string(),
            port: 3000,
            environment: "development".to_string(),
            database_url: database_url.to_string(),
            database_max_connections: 1,
            webhook_secret: Some("test_secret".to_string()),
            chain_network: Some("testnet".to_string()),
            metadata_store_url: None,
            metadata_store_token: None,
            cors_allowed_origins: "*".to_string(),
        }
    }

    fn stamp(n: u32) -> EventStamp {
        EventStamp {
            tx_hash: format!("0x{:064x}", n),
            log_index: 0,
            event_name: "Test".to_string(),
            block_number: Some(n as i64),
            network: Some("testnet".to_string()),
        }
    }

    fn minted_rat(token_id: i64, owner: &str) -> Rat {
        MetadataGenerator::generate(token_id, owner, 0, Utc::now()).into_rat(owner)
    }

    async fn seed_race(db: &Database, race_id: i64) {
        db.create_race(
            race_id,
            "0xc0ffee",
            1,
            "0xbeef",
            Decimal::new(10, 0),
            MAX_PARTICIPANTS,
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn database_new_returns_error_on_invalid_url() {
        let config = test_config("not-a-url");
        let result = Database::new(&config).await;
        assert!(result.is_err());
    }

    #[sqlx::test]
    async fn mint_replay_leaves_stored_state_unchanged(pool: PgPool) {
        let db = Database::from_pool(pool);
        let rat = minted_rat(1, "0xaa");

        assert_eq!(db.create_rat(&rat).await.unwrap(), MintOutcome::Created);
        assert_eq!(db.create_rat(&rat).await.unwrap(), MintOutcome::AlreadyExists);

        let stored = db.get_rat(1).await.unwrap().unwrap();
        assert_eq!(stored.owner_address, "0xaa");
        assert_eq!(stored.name, rat.name);
        // Counter wallet tidak naik dua kali pada replay
        assert_eq!(db.get_wallet("0xaa").await.unwrap().unwrap().rats_owned, 1);
    }

    #[sqlx::test]
    async fn sixth_entry_flips_pending_to_full(pool: PgPool) {
        let db = Database::from_pool(pool);
        seed_race(&db, 10).await;

        for (i, rat) in [7i64, 3, 9, 1, 5].iter().enumerate() {
            let outcome = db
                .enter_racer(&stamp(i as u32), 10, "0xaa", *rat, Utc::now())
                .await
                .unwrap();
            assert!(matches!(outcome, EnterOutcome::Entered { now_full: false, .. }));
        }

        let outcome = db
            .enter_racer(&stamp(5), 10, "0xaa", 2, Utc::now())
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            EnterOutcome::Entered {
                now_full: true,
                participant_count: 6
            }
        ));

        let race = db.get_race(10).await.unwrap().unwrap();
        assert_eq!(race.status, "full");
        assert_eq!(race.participant_count, 6);
        assert_eq!(race.prize_pool, Decimal::new(60, 0));

        // Slot ketujuh ditolak sebagai konflik kapasitas
        let err = db
            .enter_racer(&stamp(6), 10, "0xaa", 8, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::RaceFull(10)));
    }

    #[sqlx::test]
    async fn concurrent_entries_never_exceed_capacity(pool: PgPool) {
        let db = Database::from_pool(pool);
        seed_race(&db, 11).await;
        for i in 0..5 {
            db.enter_racer(&stamp(i), 11, "0xaa", 100 + i as i64, Utc::now())
                .await
                .unwrap();
        }

        // Dua entri berlomba memperebutkan slot terakhir
        let a = db.clone();
        let b = db.clone();
        let stamp_a = stamp(50);
        let stamp_b = stamp(51);
        let (ra, rb) = tokio::join!(
            a.enter_racer(&stamp_a, 11, "0xaa", 200, Utc::now()),
            b.enter_racer(&stamp_b, 11, "0xbb", 201, Utc::now()),
        );

        let outcomes = [ra, rb];
        let entered = outcomes
            .iter()
            .filter(|r| matches!(r, Ok(EnterOutcome::Entered { .. })))
            .count();
        assert_eq!(entered, 1);
        assert!(outcomes
            .iter()
            .any(|r| matches!(r, Err(AppError::RaceFull(_)))));

        let race = db.get_race(11).await.unwrap().unwrap();
        assert_eq!(race.participant_count, 6);
        assert_eq!(race.status, "full");
    }

    #[sqlx::test]
    async fn rat_lock_blocks_second_race_until_terminal(pool: PgPool) {
        let db = Database::from_pool(pool);
        seed_race(&db, 20).await;
        seed_race(&db, 21).await;

        db.enter_racer(&stamp(0), 20, "0xaa", 7, Utc::now())
            .await
            .unwrap();
        assert_eq!(db.active_race_for_rat(7).await.unwrap(), Some(20));

        let err = db
            .enter_racer(&stamp(1), 21, "0xaa", 7, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::RatAlreadyRacing(7)));

        db.cancel_race(&stamp(2), 20, "0xaa").await.unwrap();
        assert!(db.active_race_for_rat(7).await.unwrap().is_none());

        // Setelah race asal berakhir, rat boleh masuk lagi
        let outcome = db
            .enter_racer(&stamp(3), 21, "0xaa", 7, Utc::now())
            .await
            .unwrap();
        assert!(matches!(outcome, EnterOutcome::Entered { .. }));
    }

    #[sqlx::test]
    async fn duplicate_delivery_is_not_reapplied(pool: PgPool) {
        let db = Database::from_pool(pool);
        seed_race(&db, 30).await;

        let s = stamp(0);
        let first = db
            .enter_racer(&s, 30, "0xaa", 7, Utc::now())
            .await
            .unwrap();
        assert!(matches!(first, EnterOutcome::Entered { .. }));
        assert!(db.has_processed(&s.tx_hash, s.log_index).await.unwrap());

        let replay = db
            .enter_racer(&s, 30, "0xaa", 7, Utc::now())
            .await
            .unwrap();
        assert_eq!(replay, EnterOutcome::AlreadyProcessed);

        let race = db.get_race(30).await.unwrap().unwrap();
        assert_eq!(race.participant_count, 1);
        assert_eq!(race.prize_pool, Decimal::new(10, 0));
    }

    #[sqlx::test]
    async fn transfer_before_mint_heals_on_redelivery(pool: PgPool) {
        let db = Database::from_pool(pool);
        let s = stamp(0);

        let err = db.transfer_rat_owner(&s, 1, "0xbb").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        // Baris ledger ikut di-rollback supaya redelivery bisa diterapkan
        assert!(!db.has_processed(&s.tx_hash, s.log_index).await.unwrap());

        db.create_rat(&minted_rat(1, "0xaa")).await.unwrap();
        assert_eq!(
            db.transfer_rat_owner(&s, 1, "0xbb").await.unwrap(),
            TransferOutcome::Applied
        );

        let rat = db.get_rat(1).await.unwrap().unwrap();
        assert_eq!(rat.owner_address, "0xbb");
        assert_eq!(db.get_wallet("0xbb").await.unwrap().unwrap().rats_owned, 1);
        assert_eq!(db.get_wallet("0xaa").await.unwrap().unwrap().rats_owned, 0);
    }

    #[sqlx::test]
    async fn finish_applies_rank_deltas_and_releases_all(pool: PgPool) {
        let db = Database::from_pool(pool);
        seed_race(&db, 40).await;

        let rats = [7i64, 3, 9, 1, 5, 2];
        for (i, token) in rats.iter().enumerate() {
            db.create_rat(&minted_rat(*token, "0xaa")).await.unwrap();
            db.enter_racer(&stamp(i as u32), 40, "0xaa", *token, Utc::now())
                .await
                .unwrap();
        }

        let prizes = [
            Decimal::new(30, 0),
            Decimal::new(15, 0),
            Decimal::new(5, 0),
            Decimal::ZERO,
            Decimal::ZERO,
            Decimal::ZERO,
        ];
        let outcome = db
            .finish_race(&stamp(90), 40, &rats, &prizes)
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            FinishOutcome::Finished { winner_token_id: 7 }
        ));

        let race = db.get_race(40).await.unwrap().unwrap();
        assert_eq!(race.status, "completed");
        assert_eq!(race.winner_token_id, Some(7));
        assert!(race.results.is_some());

        let winner = db.get_rat(7).await.unwrap().unwrap();
        assert_eq!((winner.wins, winner.placed, winner.losses), (1, 0, 0));
        assert_eq!(winner.xp, XP_WIN);
        for token in [3, 9] {
            let placed = db.get_rat(token).await.unwrap().unwrap();
            assert_eq!((placed.wins, placed.placed, placed.losses), (0, 1, 0));
            assert_eq!(placed.xp, XP_PLACED);
        }
        for token in [1, 5, 2] {
            let loser = db.get_rat(token).await.unwrap().unwrap();
            assert_eq!((loser.wins, loser.placed, loser.losses), (0, 0, 1));
            assert_eq!(loser.xp, XP_LOSS);
        }

        // Semua lock terlepas; keenam rat boleh ikut race baru
        for token in rats {
            assert!(db.active_race_for_rat(token).await.unwrap().is_none());
        }
        assert_eq!(db.get_wallet("0xaa").await.unwrap().unwrap().races_won, 1);
    }

    #[sqlx::test]
    async fn finish_rejects_duplicate_winner_ids(pool: PgPool) {
        let db = Database::from_pool(pool);
        seed_race(&db, 50).await;
        db.enter_racer(&stamp(0), 50, "0xaa", 7, Utc::now())
            .await
            .unwrap();
        db.enter_racer(&stamp(1), 50, "0xaa", 3, Utc::now())
            .await
            .unwrap();

        let prizes = [Decimal::new(10, 0), Decimal::new(5, 0)];
        let err = db
            .finish_race(&stamp(2), 50, &[7, 7], &prizes)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let race = db.get_race(50).await.unwrap().unwrap();
        assert_eq!(race.status, "pending");
    }

    #[sqlx::test]
    async fn finish_after_cancel_is_a_noop(pool: PgPool) {
        let db = Database::from_pool(pool);
        seed_race(&db, 60).await;
        db.enter_racer(&stamp(0), 60, "0xaa", 7, Utc::now())
            .await
            .unwrap();
        assert_eq!(
            db.cancel_race(&stamp(1), 60, "0xcc").await.unwrap(),
            CancelOutcome::Cancelled
        );

        let outcome = db
            .finish_race(&stamp(2), 60, &[7], &[Decimal::new(10, 0)])
            .await
            .unwrap();
        assert_eq!(outcome, FinishOutcome::AlreadyTerminal(RaceStatus::Cancelled));

        let race = db.get_race(60).await.unwrap().unwrap();
        assert_eq!(race.status, "cancelled");
        assert!(race.winner_token_id.is_none());
    }

    #[sqlx::test]
    async fn finish_completes_even_when_a_rat_is_not_mirrored(pool: PgPool) {
        let db = Database::from_pool(pool);
        seed_race(&db, 70).await;
        // Rat 7 belum pernah di-mirror lewat Mint
        db.enter_racer(&stamp(0), 70, "0xaa", 7, Utc::now())
            .await
            .unwrap();

        let outcome = db
            .finish_race(&stamp(1), 70, &[7], &[Decimal::new(10, 0)])
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            FinishOutcome::Finished { winner_token_id: 7 }
        ));
        assert_eq!(db.get_race(70).await.unwrap().unwrap().status, "completed");
        assert!(db.active_race_for_rat(7).await.unwrap().is_none());
    }
}

// ==================== STORE OUTCOMES ====================
// Benign duplicates surface as typed outcomes, never as errors, so handlers
// can ack them with 200 and the provider stops retrying.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MintOutcome {
    Created,
    AlreadyExists,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    Applied,
    AlreadyOwner,
    AlreadyProcessed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateRaceOutcome {
    Created,
    AlreadyExists,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnterOutcome {
    Entered { now_full: bool, participant_count: i32 },
    AlreadyEntered,
    AlreadyProcessed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled,
    AlreadyTerminal(RaceStatus),
    AlreadyProcessed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishOutcome {
    Finished { winner_token_id: i64 },
    AlreadyTerminal(RaceStatus),
    AlreadyProcessed,
}

/// Ledger row written alongside every keyed mutation.
#[derive(Debug, Clone)]
pub struct EventStamp {
    pub tx_hash: String,
    pub log_index: i32,
    pub event_name: String,
    pub block_number: Option<i64>,
    pub network: Option<String>,
}

/// Inserts the ledger row inside the mutation's transaction. Returns false
/// when the key was already recorded, i.e. the event was applied before.
async fn mark_processed(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    stamp: &EventStamp,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO processed_events (tx_hash, log_index, event_name, block_number, network)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (tx_hash, log_index) DO NOTHING
        "#,
    )
    .bind(&stamp.tx_hash)
    .bind(stamp.log_index)
    .bind(&stamp.event_name)
    .bind(stamp.block_number)
    .bind(&stamp.network)
    .execute(&mut **tx)
    .await?;

    Ok(result.rows_affected() == 1)
}

impl Database {
    pub async fn new(config: &Config) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .connect(&config.database_url)
            .await?;

        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> anyhow::Result<()> {
        // migrations harus berada di crate root: ./migrations
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Handle over a pool provisioned by the test harness.
    #[cfg(test)]
    pub(crate) fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

// ==================== PROCESSED EVENT QUERIES ====================
impl Database {
    /// Fast pre-check; the authoritative guard is the ledger insert inside
    /// each mutation's transaction.
    pub async fn has_processed(&self, tx_hash: &str, log_index: i32) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM processed_events WHERE tx_hash = $1 AND log_index = $2)",
        )
        .bind(tx_hash)
        .bind(log_index)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }
}

// ==================== RAT QUERIES ====================
impl Database {
    /// Mirror a mint. Token ids are unique on chain, so the primary key is
    /// the dedup guard; a replay simply does not insert.
    pub async fn create_rat(&self, rat: &Rat) -> Result<MintOutcome> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO rats
                (token_id, owner_address, name, variant, gender, bloodline,
                 stamina, agility, speed, speeds, rarity_score, date_of_birth,
                 sire_token_id, dam_token_id, wins, placed, losses, level, xp)
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19)
            ON CONFLICT (token_id) DO NOTHING
            "#,
        )
        .bind(rat.token_id)
        .bind(&rat.owner_address)
        .bind(&rat.name)
        .bind(rat.variant)
        .bind(&rat.gender)
        .bind(&rat.bloodline)
        .bind(rat.stamina)
        .bind(rat.agility)
        .bind(rat.speed)
        .bind(&rat.speeds)
        .bind(rat.rarity_score)
        .bind(rat.date_of_birth)
        .bind(rat.sire_token_id)
        .bind(rat.dam_token_id)
        .bind(rat.wins)
        .bind(rat.placed)
        .bind(rat.losses)
        .bind(rat.level)
        .bind(rat.xp)
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(MintOutcome::AlreadyExists);
        }

        sqlx::query(
            r#"
            INSERT INTO wallets (address, rats_owned) VALUES ($1, 1)
            ON CONFLICT (address) DO UPDATE
            SET rats_owned = wallets.rats_owned + 1,
                last_seen = NOW()
            "#,
        )
        .bind(&rat.owner_address)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(MintOutcome::Created)
    }

    /// Mirror an ownership transfer. Unknown tokens roll the ledger row back
    /// so a redelivery after the mint arrives can still apply.
    pub async fn transfer_rat_owner(
        &self,
        stamp: &EventStamp,
        token_id: i64,
        new_owner: &str,
    ) -> Result<TransferOutcome> {
        let mut tx = self.pool.begin().await?;

        if !mark_processed(&mut tx, stamp).await? {
            tx.rollback().await?;
            return Ok(TransferOutcome::AlreadyProcessed);
        }

        let current_owner: Option<String> =
            sqlx::query_scalar("SELECT owner_address FROM rats WHERE token_id = $1 FOR UPDATE")
                .bind(token_id)
                .fetch_optional(&mut *tx)
                .await?;

        let Some(current_owner) = current_owner else {
            return Err(AppError::NotFound(format!("Rat {} not found", token_id)));
        };

        if current_owner == new_owner {
            // Ledger row persists; the same delivery will not reapply.
            tx.commit().await?;
            return Ok(TransferOutcome::AlreadyOwner);
        }

        sqlx::query(
            "UPDATE rats SET owner_address = $2, updated_at = NOW() WHERE token_id = $1",
        )
        .bind(token_id)
        .bind(new_owner)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE wallets
            SET rats_owned = GREATEST(rats_owned - 1, 0),
                last_seen = NOW()
            WHERE address = $1
            "#,
        )
        .bind(&current_owner)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO wallets (address, rats_owned) VALUES ($1, 1)
            ON CONFLICT (address) DO UPDATE
            SET rats_owned = wallets.rats_owned + 1,
                last_seen = NOW()
            "#,
        )
        .bind(new_owner)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(TransferOutcome::Applied)
    }

    pub async fn get_rat(&self, token_id: i64) -> Result<Option<Rat>> {
        let rat = sqlx::query_as::<_, Rat>("SELECT * FROM rats WHERE token_id = $1")
            .bind(token_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(rat)
    }

    pub async fn list_rats_by_owner(&self, owner: &str, limit: i64) -> Result<Vec<Rat>> {
        let rats = sqlx::query_as::<_, Rat>(
            "SELECT * FROM rats WHERE owner_address = $1 ORDER BY token_id ASC LIMIT $2",
        )
        .bind(owner)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rats)
    }

    /// The non-terminal race a rat is locked into, if any. The partial unique
    /// index guarantees at most one row.
    pub async fn active_race_for_rat(&self, token_id: i64) -> Result<Option<i64>> {
        let race_id: Option<i64> = sqlx::query_scalar(
            "SELECT race_id FROM race_participants WHERE rat_token_id = $1 AND NOT released",
        )
        .bind(token_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(race_id)
    }

    pub async fn rat_race_history(
        &self,
        token_id: i64,
        limit: i64,
    ) -> Result<Vec<RatRaceHistoryEntry>> {
        let rows = sqlx::query_as::<_, RatRaceHistoryEntry>(
            r#"
            SELECT p.race_id, r.status, p.entered_at, p.released,
                   r.winner_token_id, r.results
            FROM race_participants p
            JOIN races r ON r.race_id = p.race_id
            WHERE p.rat_token_id = $1
            ORDER BY p.entered_at DESC
            LIMIT $2
            "#,
        )
        .bind(token_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

// ==================== RACE QUERIES ====================
impl Database {
    /// Mirror a race creation. Race ids are unique on chain; the primary key
    /// dedups replays the same way mints do.
    pub async fn create_race(
        &self,
        race_id: i64,
        creator: &str,
        track_id: i64,
        entry_token: &str,
        entry_fee: Decimal,
        max_participants: i32,
    ) -> Result<CreateRaceOutcome> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO races
                (race_id, creator_address, track_id, entry_token, entry_fee,
                 status, max_participants, participant_count, prize_pool)
            VALUES ($1, $2, $3, $4, $5, 'pending', $6, 0, 0)
            ON CONFLICT (race_id) DO NOTHING
            "#,
        )
        .bind(race_id)
        .bind(creator)
        .bind(track_id)
        .bind(entry_token)
        .bind(entry_fee)
        .bind(max_participants)
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(CreateRaceOutcome::AlreadyExists);
        }

        sqlx::query(
            r#"
            INSERT INTO wallets (address) VALUES ($1)
            ON CONFLICT (address) DO UPDATE SET last_seen = NOW()
            "#,
        )
        .bind(creator)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(CreateRaceOutcome::Created)
    }

    /// Mirror a racer entry. One conditional update carries the capacity
    /// check, the counter, the prize pool and the pending->full flip, so no
    /// interleaving ever shows a race past capacity.
    pub async fn enter_racer(
        &self,
        stamp: &EventStamp,
        race_id: i64,
        wallet: &str,
        rat_token_id: i64,
        entered_at: DateTime<Utc>,
    ) -> Result<EnterOutcome> {
        let mut tx = self.pool.begin().await?;

        if !mark_processed(&mut tx, stamp).await? {
            tx.rollback().await?;
            return Ok(EnterOutcome::AlreadyProcessed);
        }

        let insert = sqlx::query(
            r#"
            INSERT INTO race_participants (race_id, rat_token_id, wallet_address, entered_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(race_id)
        .bind(rat_token_id)
        .bind(wallet)
        .bind(entered_at)
        .execute(&mut *tx)
        .await;

        if let Err(e) = insert {
            if let sqlx::Error::Database(ref db_err) = e {
                match db_err.constraint() {
                    Some("race_participants_pkey") => {
                        // Same (race, rat) pair under a different delivery key.
                        tx.rollback().await?;
                        return Ok(EnterOutcome::AlreadyEntered);
                    }
                    Some("race_participants_active_rat") => {
                        return Err(AppError::RatAlreadyRacing(rat_token_id));
                    }
                    _ if db_err.is_unique_violation() => {
                        return Err(AppError::Conflict(format!(
                            "Entry for race {} collides with existing state",
                            race_id
                        )));
                    }
                    _ => {}
                }
            }
            return Err(e.into());
        }

        let cas: Option<(String, i32)> = sqlx::query_as(
            r#"
            UPDATE races
            SET participant_count = participant_count + 1,
                prize_pool = prize_pool + entry_fee,
                status = CASE WHEN participant_count + 1 >= max_participants
                              THEN 'full' ELSE status END,
                updated_at = NOW()
            WHERE race_id = $1
              AND status = 'pending'
              AND participant_count < max_participants
            RETURNING status, participant_count
            "#,
        )
        .bind(race_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((status, participant_count)) = cas else {
            let existing: Option<(String, i32, i32)> = sqlx::query_as(
                "SELECT status, participant_count, max_participants FROM races WHERE race_id = $1",
            )
            .bind(race_id)
            .fetch_optional(&mut *tx)
            .await?;

            return match existing {
                None => Err(AppError::NotFound(format!("Race {} not found", race_id))),
                Some((status, count, max)) => match RaceStatus::parse(&status) {
                    Some(RaceStatus::Full) => Err(AppError::RaceFull(race_id)),
                    Some(RaceStatus::Pending) if count >= max => Err(AppError::RaceFull(race_id)),
                    _ => Err(AppError::InvalidState(format!(
                        "Race {} is {}",
                        race_id, status
                    ))),
                },
            };
        };

        sqlx::query(
            r#"
            INSERT INTO wallets (address, races_entered) VALUES ($1, 1)
            ON CONFLICT (address) DO UPDATE
            SET races_entered = wallets.races_entered + 1,
                last_seen = NOW()
            "#,
        )
        .bind(wallet)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(EnterOutcome::Entered {
            now_full: status == "full",
            participant_count,
        })
    }

    /// Mirror a cancellation. Allowed from pending or full; replays against a
    /// settled race commit the ledger row and report the terminal status.
    pub async fn cancel_race(
        &self,
        stamp: &EventStamp,
        race_id: i64,
        cancelled_by: &str,
    ) -> Result<CancelOutcome> {
        let mut tx = self.pool.begin().await?;

        if !mark_processed(&mut tx, stamp).await? {
            tx.rollback().await?;
            return Ok(CancelOutcome::AlreadyProcessed);
        }

        let cancelled: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE races
            SET status = 'cancelled',
                cancelled_by = $2,
                updated_at = NOW()
            WHERE race_id = $1
              AND status IN ('pending', 'full')
            RETURNING race_id
            "#,
        )
        .bind(race_id)
        .bind(cancelled_by)
        .fetch_optional(&mut *tx)
        .await?;

        if cancelled.is_none() {
            let status: Option<String> =
                sqlx::query_scalar("SELECT status FROM races WHERE race_id = $1")
                    .bind(race_id)
                    .fetch_optional(&mut *tx)
                    .await?;

            return match status.as_deref().and_then(RaceStatus::parse) {
                None => Err(AppError::NotFound(format!("Race {} not found", race_id))),
                Some(status) if status.is_terminal() => {
                    tx.commit().await?;
                    Ok(CancelOutcome::AlreadyTerminal(status))
                }
                Some(status) => Err(AppError::InvalidState(format!(
                    "Cannot cancel race {} while {}",
                    race_id,
                    status.as_str()
                ))),
            };
        }

        sqlx::query(
            "UPDATE race_participants SET released = true WHERE race_id = $1 AND NOT released",
        )
        .bind(race_id)
        .execute(&mut *tx)
        .await?;

        // Wallet pembatal dibuat lazily seperti event lain yang menyebut
        // sebuah address
        sqlx::query(
            r#"
            INSERT INTO wallets (address) VALUES ($1)
            ON CONFLICT (address) DO UPDATE SET last_seen = NOW()
            "#,
        )
        .bind(cancelled_by)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(CancelOutcome::Cancelled)
    }

    /// Mirror a settlement. `winners` is the full finishing order; rank 1
    /// wins, ranks 2-3 place, the rest lose. Frees every rat lock.
    pub async fn finish_race(
        &self,
        stamp: &EventStamp,
        race_id: i64,
        winners: &[i64],
        prizes: &[Decimal],
    ) -> Result<FinishOutcome> {
        if winners.is_empty() {
            return Err(AppError::Validation("winners must not be empty".to_string()));
        }
        if winners.len() != prizes.len() {
            return Err(AppError::Validation(
                "winners and prizes must have equal length".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for token_id in winners {
            if !seen.insert(*token_id) {
                return Err(AppError::Validation(format!(
                    "Duplicate winner token id {}",
                    token_id
                )));
            }
        }

        let mut tx = self.pool.begin().await?;

        if !mark_processed(&mut tx, stamp).await? {
            tx.rollback().await?;
            return Ok(FinishOutcome::AlreadyProcessed);
        }

        let row: Option<(String, i32)> = sqlx::query_as(
            "SELECT status, participant_count FROM races WHERE race_id = $1 FOR UPDATE",
        )
        .bind(race_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((status_text, participant_count)) = row else {
            return Err(AppError::NotFound(format!("Race {} not found", race_id)));
        };

        if let Some(status) = RaceStatus::parse(&status_text) {
            if status.is_terminal() {
                tx.commit().await?;
                return Ok(FinishOutcome::AlreadyTerminal(status));
            }
            if !status.can_transition_to(RaceStatus::Completed) {
                // Kontrak adalah sumber kebenaran; race-started tidak ikut
                // di-mirror, jadi lompatan status dicatat saja
                tracing::debug!(
                    "Race {} completing from '{}' without a mirrored start signal",
                    race_id,
                    status.as_str()
                );
            }
        }

        if winners.len() > participant_count as usize {
            return Err(AppError::Validation(format!(
                "{} ranked finishers exceed {} participants",
                winners.len(),
                participant_count
            )));
        }

        let entries: Vec<RaceResultEntry> = winners
            .iter()
            .zip(prizes.iter())
            .enumerate()
            .map(|(i, (&rat_token_id, prize))| RaceResultEntry {
                rank: (i + 1) as i32,
                rat_token_id,
                prize: prize.to_string(),
            })
            .collect();
        let results = serde_json::to_value(&entries)
            .map_err(|e| AppError::Internal(format!("Failed to encode results: {}", e)))?;

        let winner_token_id = winners[0];

        sqlx::query(
            r#"
            UPDATE races
            SET status = 'completed',
                results = $2,
                winner_token_id = $3,
                updated_at = NOW()
            WHERE race_id = $1
            "#,
        )
        .bind(race_id)
        .bind(&results)
        .bind(winner_token_id)
        .execute(&mut *tx)
        .await?;

        let participants: Vec<(i64, String)> = sqlx::query_as(
            "SELECT rat_token_id, wallet_address FROM race_participants WHERE race_id = $1",
        )
        .bind(race_id)
        .fetch_all(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE race_participants SET released = true WHERE race_id = $1 AND NOT released",
        )
        .bind(race_id)
        .execute(&mut *tx)
        .await?;

        for (i, &token_id) in winners.iter().enumerate() {
            let outcome = RankOutcome::from_rank(i + 1);
            let (wins, placed, losses) = match outcome {
                RankOutcome::Win => (1i32, 0i32, 0i32),
                RankOutcome::Placed => (0, 1, 0),
                RankOutcome::Loss => (0, 0, 1),
            };

            let updated = sqlx::query(
                r#"
                UPDATE rats
                SET wins = wins + $2,
                    placed = placed + $3,
                    losses = losses + $4,
                    xp = xp + $5,
                    level = (1 + (xp + $5) / $6)::INT,
                    updated_at = NOW()
                WHERE token_id = $1
                "#,
            )
            .bind(token_id)
            .bind(wins)
            .bind(placed)
            .bind(losses)
            .bind(outcome.xp_delta())
            .bind(LEVEL_XP_STEP)
            .execute(&mut *tx)
            .await?;

            if updated.rows_affected() == 0 {
                // Race tetap selesai; delta stat untuk rat yang belum
                // di-mirror hilang sampai Mint-nya tiba
                tracing::warn!(
                    "Rat {} in race {} is not mirrored; stat delta dropped",
                    token_id,
                    race_id
                );
            }
        }

        match participants.iter().find(|(rat, _)| *rat == winner_token_id) {
            Some((_, wallet_address)) => {
                sqlx::query(
                    "UPDATE wallets SET races_won = races_won + 1, last_seen = NOW() WHERE address = $1",
                )
                .bind(wallet_address)
                .execute(&mut *tx)
                .await?;
            }
            None => {
                tracing::warn!(
                    "Winner rat {} has no participant row in race {}",
                    winner_token_id,
                    race_id
                );
            }
        }

        tx.commit().await?;
        Ok(FinishOutcome::Finished { winner_token_id })
    }

    pub async fn get_race(&self, race_id: i64) -> Result<Option<Race>> {
        let race = sqlx::query_as::<_, Race>("SELECT * FROM races WHERE race_id = $1")
            .bind(race_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(race)
    }

    pub async fn get_participants(&self, race_id: i64) -> Result<Vec<RaceParticipant>> {
        let participants = sqlx::query_as::<_, RaceParticipant>(
            "SELECT * FROM race_participants WHERE race_id = $1 ORDER BY entered_at ASC",
        )
        .bind(race_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(participants)
    }

    pub async fn list_races_by_status(&self, status: &str, limit: i64) -> Result<Vec<Race>> {
        let races = sqlx::query_as::<_, Race>(
            "SELECT * FROM races WHERE status = $1 ORDER BY created_at DESC LIMIT $2",
        )
        .bind(status)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(races)
    }
}

// ==================== WALLET QUERIES ====================
impl Database {
    pub async fn get_or_create_wallet(&self, address: &str) -> Result<Wallet> {
        let wallet = sqlx::query_as::<_, Wallet>(
            r#"
            INSERT INTO wallets (address) VALUES ($1)
            ON CONFLICT (address) DO UPDATE SET last_seen = NOW()
            RETURNING *
            "#,
        )
        .bind(address)
        .fetch_one(&self.pool)
        .await?;
        Ok(wallet)
    }

    pub async fn get_wallet(&self, address: &str) -> Result<Option<Wallet>> {
        let wallet = sqlx::query_as::<_, Wallet>("SELECT * FROM wallets WHERE address = $1")
            .bind(address)
            .fetch_optional(&self.pool)
            .await?;
        Ok(wallet)
    }

    pub async fn wallet_race_history(
        &self,
        address: &str,
        limit: i64,
    ) -> Result<Vec<WalletRaceHistoryEntry>> {
        let rows = sqlx::query_as::<_, WalletRaceHistoryEntry>(
            r#"
            SELECT p.race_id, p.rat_token_id, r.status, p.entered_at, r.winner_token_id
            FROM race_participants p
            JOIN races r ON r.race_id = p.race_id
            WHERE p.wallet_address = $1
            ORDER BY p.entered_at DESC
            LIMIT $2
            "#,
        )
        .bind(address)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn leaderboard(&self, limit: i64) -> Result<Vec<LeaderboardEntry>> {
        let rows = sqlx::query_as::<_, LeaderboardEntry>(
            r#"
            SELECT ROW_NUMBER() OVER (ORDER BY races_won DESC, races_entered ASC, address ASC) AS rank,
                   address, races_won, races_entered, rats_owned
            FROM wallets
            ORDER BY races_won DESC, races_entered ASC, address ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
