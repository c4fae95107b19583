use crate::{
    config::Config,
    constants::MAX_PARTICIPANTS,
    db::{
        CancelOutcome, CreateRaceOutcome, Database, EnterOutcome, EventStamp, FinishOutcome,
        MintOutcome, TransferOutcome,
    },
    error::Result,
    events::envelope::{
        MintEvent, RaceCancelledEvent, RaceCreatedEvent, RaceFinishedEvent, RacerEnteredEvent,
        TransferEvent,
    },
    events::{EventKind, HookEvent, WebhookEnvelope},
    models::HookAck,
    services::metadata::{MetadataGenerator, MetadataStore},
};

/// Hook Processor - applies verified webhook envelopes to the mirror.
/// Built once at startup and shared through AppState so every delivery
/// reuses the same outbound HTTP client.
#[derive(Clone)]
pub struct HookProcessor {
    db: Database,
    config: Config,
    metadata_store: MetadataStore,
}

/// Route/network gate. Returns the skip ack when the delivery must not touch
/// storage: unrecognized names, a recognized kind on the wrong route, or an
/// envelope from a network this mirror does not follow.
fn gate(
    expected: EventKind,
    configured_network: Option<&str>,
    envelope: &WebhookEnvelope,
) -> Option<HookAck> {
    let Some(kind) = envelope.kind() else {
        return Some(HookAck::skipped(format!(
            "Unrecognized event '{}'",
            envelope.event_name
        )));
    };

    if kind != expected {
        return Some(HookAck::skipped(format!(
            "{} is not handled by this hook",
            kind.as_str()
        )));
    }

    if let (Some(configured), Some(network)) = (configured_network, envelope.network.as_deref()) {
        if !configured.eq_ignore_ascii_case(network) {
            return Some(HookAck::skipped(format!(
                "Network '{}' is not mirrored",
                network
            )));
        }
    }

    None
}

/// Ledger stamp for kinds deduplicated by `(tx_hash, log_index)`.
fn build_stamp(kind: EventKind, envelope: &WebhookEnvelope) -> Result<EventStamp> {
    let key = envelope.provenance()?;
    Ok(EventStamp {
        tx_hash: key.tx_hash,
        log_index: key.log_index,
        event_name: kind.as_str().to_string(),
        block_number: envelope.block_number,
        network: envelope.network.clone(),
    })
}

impl HookProcessor {
    pub fn new(db: Database, config: Config) -> Self {
        let metadata_store = MetadataStore::from_config(&config);
        Self {
            db,
            config,
            metadata_store,
        }
    }

    /// Apply one verified envelope. `expected` pins the kind the calling
    /// route is responsible for.
    pub async fn process(&self, expected: EventKind, envelope: &WebhookEnvelope) -> Result<HookAck> {
        if let Some(ack) = gate(expected, self.config.chain_network.as_deref(), envelope) {
            tracing::info!(
                "Skipping '{}' delivery: {}",
                envelope.event_name,
                ack.reason.as_deref().unwrap_or("gated")
            );
            return Ok(ack);
        }

        if self.config.is_testnet() {
            tracing::debug!("Testnet delivery payload: {}", envelope.parameters);
        }

        let event = HookEvent::from_envelope(expected, envelope)?;

        // Fast path for exact redeliveries; the authoritative check rides
        // inside each mutation's transaction.
        if expected.requires_provenance() {
            let key = envelope.provenance()?;
            if self.db.has_processed(&key.tx_hash, key.log_index).await? {
                tracing::info!(
                    "Duplicate delivery {}:{} already processed",
                    key.tx_hash,
                    key.log_index
                );
                return Ok(HookAck::skipped("Event already processed"));
            }
        }

        tracing::debug!("Applying verified {} delivery", event.kind().as_str());

        match event {
            HookEvent::Mint(ev) => self.apply_mint(envelope, ev).await,
            HookEvent::Transfer(ev) => self.apply_transfer(envelope, ev).await,
            HookEvent::RaceCreated(ev) => self.apply_race_created(ev).await,
            HookEvent::RacerEntered(ev) => self.apply_racer_entered(envelope, ev).await,
            HookEvent::RaceCancelled(ev) => self.apply_race_cancelled(envelope, ev).await,
            HookEvent::RaceFinished(ev) => self.apply_race_finished(envelope, ev).await,
        }
    }

    async fn apply_mint(&self, envelope: &WebhookEnvelope, event: MintEvent) -> Result<HookAck> {
        let metadata = MetadataGenerator::generate(
            event.token_id,
            &event.recipient,
            event.variant,
            envelope.event_time(),
        );
        let rat = metadata.clone().into_rat(&event.recipient);

        match self.db.create_rat(&rat).await? {
            MintOutcome::AlreadyExists => {
                // Upload diulang juga saat replay; konten deterministik, jadi
                // blob yang hilang karena crash ikut sembuh
                self.metadata_store.upload(&metadata).await;
                tracing::info!("Mint replay for rat {}; skipping", event.token_id);
                Ok(HookAck::skipped("Rat already minted").with("token_id", event.token_id))
            }
            MintOutcome::Created => {
                self.metadata_store.upload(&metadata).await;
                tracing::info!(
                    "Minted rat {} for {} (bloodline {}, rarity {})",
                    event.token_id,
                    event.recipient,
                    metadata.bloodline,
                    metadata.rarity_score
                );
                Ok(HookAck::applied()
                    .with("token_id", event.token_id)
                    .with("name", metadata.name.clone())
                    .with("bloodline", metadata.bloodline.clone())
                    .with("rarity_score", metadata.rarity_score.to_string()))
            }
        }
    }

    async fn apply_transfer(
        &self,
        envelope: &WebhookEnvelope,
        event: TransferEvent,
    ) -> Result<HookAck> {
        let stamp = build_stamp(EventKind::Transfer, envelope)?;

        match self
            .db
            .transfer_rat_owner(&stamp, event.token_id, &event.to)
            .await?
        {
            TransferOutcome::AlreadyProcessed => Ok(HookAck::skipped("Event already processed")),
            TransferOutcome::AlreadyOwner => Ok(HookAck::skipped("Recipient already owns this rat")
                .with("token_id", event.token_id)),
            TransferOutcome::Applied => {
                tracing::info!(
                    "Rat {} transferred {} -> {}",
                    event.token_id,
                    event.from,
                    event.to
                );
                Ok(HookAck::applied()
                    .with("token_id", event.token_id)
                    .with("owner", event.to.clone()))
            }
        }
    }

    async fn apply_race_created(&self, event: RaceCreatedEvent) -> Result<HookAck> {
        match self
            .db
            .create_race(
                event.race_id,
                &event.creator,
                event.track_id,
                &event.entry_token,
                event.entry_fee,
                MAX_PARTICIPANTS,
            )
            .await?
        {
            CreateRaceOutcome::AlreadyExists => {
                tracing::info!("RaceCreated replay for race {}; skipping", event.race_id);
                Ok(HookAck::skipped("Race already exists").with("race_id", event.race_id))
            }
            CreateRaceOutcome::Created => {
                tracing::info!(
                    "Race {} created by {} (track {}, fee {})",
                    event.race_id,
                    event.creator,
                    event.track_id,
                    event.entry_fee
                );
                Ok(HookAck::applied()
                    .with("race_id", event.race_id)
                    .with("status", "pending"))
            }
        }
    }

    async fn apply_racer_entered(
        &self,
        envelope: &WebhookEnvelope,
        event: RacerEnteredEvent,
    ) -> Result<HookAck> {
        let stamp = build_stamp(EventKind::RacerEntered, envelope)?;

        match self
            .db
            .enter_racer(
                &stamp,
                event.race_id,
                &event.racer,
                event.rat_token_id,
                envelope.event_time(),
            )
            .await?
        {
            EnterOutcome::AlreadyProcessed => Ok(HookAck::skipped("Event already processed")),
            EnterOutcome::AlreadyEntered => {
                Ok(HookAck::skipped("Rat already entered in this race")
                    .with("race_id", event.race_id)
                    .with("rat_token_id", event.rat_token_id))
            }
            EnterOutcome::Entered {
                now_full,
                participant_count,
            } => {
                tracing::info!(
                    "Rat {} entered race {} ({}/{} slots)",
                    event.rat_token_id,
                    event.race_id,
                    participant_count,
                    MAX_PARTICIPANTS
                );
                Ok(HookAck::applied()
                    .with("race_id", event.race_id)
                    .with("rat_token_id", event.rat_token_id)
                    .with("participants", participant_count)
                    .with("status", if now_full { "full" } else { "pending" }))
            }
        }
    }

    async fn apply_race_cancelled(
        &self,
        envelope: &WebhookEnvelope,
        event: RaceCancelledEvent,
    ) -> Result<HookAck> {
        let stamp = build_stamp(EventKind::RaceCancelled, envelope)?;

        match self
            .db
            .cancel_race(&stamp, event.race_id, &event.cancelled_by)
            .await?
        {
            CancelOutcome::AlreadyProcessed => Ok(HookAck::skipped("Event already processed")),
            CancelOutcome::AlreadyTerminal(status) => {
                Ok(HookAck::skipped(format!("Race already {}", status.as_str()))
                    .with("race_id", event.race_id)
                    .with("status", status.as_str()))
            }
            CancelOutcome::Cancelled => {
                tracing::info!(
                    "Race {} cancelled by {}",
                    event.race_id,
                    event.cancelled_by
                );
                Ok(HookAck::applied()
                    .with("race_id", event.race_id)
                    .with("status", "cancelled"))
            }
        }
    }

    async fn apply_race_finished(
        &self,
        envelope: &WebhookEnvelope,
        event: RaceFinishedEvent,
    ) -> Result<HookAck> {
        let stamp = build_stamp(EventKind::RaceFinished, envelope)?;

        match self
            .db
            .finish_race(&stamp, event.race_id, &event.winners, &event.prizes)
            .await?
        {
            FinishOutcome::AlreadyProcessed => Ok(HookAck::skipped("Event already processed")),
            FinishOutcome::AlreadyTerminal(status) => {
                Ok(HookAck::skipped(format!("Race already {}", status.as_str()))
                    .with("race_id", event.race_id)
                    .with("status", status.as_str()))
            }
            FinishOutcome::Finished { winner_token_id } => {
                tracing::info!(
                    "Race {} completed; winner rat {}",
                    event.race_id,
                    winner_token_id
                );
                Ok(HookAck::applied()
                    .with("race_id", event.race_id)
                    .with("status", "completed")
                    .with("winner_token_id", winner_token_id))
            }
        }
    }
}
