use chrono::{DateTime, Utc};
use rand::distr::weighted::WeightedIndex;
use rand::distr::Distribution;
use rand::{rngs::StdRng, Rng, SeedableRng};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{
    config::Config,
    constants::{BLOODLINES, METADATA_UPLOAD_TIMEOUT_MS, SPEED_SEGMENTS, STAT_MAX, STAT_MIN},
    crypto::hash,
    models::{level_for_xp, Rat},
};

const NAME_PREFIXES: [&str; 12] = [
    "Whisker", "Shadow", "Turbo", "Scurry", "Nibble", "Dusty", "Midnight", "Clover", "Biscuit",
    "Gadget", "Pepper", "Maple",
];

const NAME_SUFFIXES: [&str; 10] = [
    "paw", "tail", "fang", "dash", "squeak", "runner", "bolt", "heart", "foot", "snout",
];

/// Generated record for a minted rat. Every field is derived from the mint
/// parameters, so redeliveries regenerate byte-identical metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatMetadata {
    pub token_id: i64,
    /// Keccak dari parameter mint; identitas genetik yang ikut tersimpan
    /// di blob metadata.
    pub dna: String,
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
}

impl RatMetadata {
    /// Storage row for a freshly minted rat.
    pub fn into_rat(self, owner: &str) -> Rat {
        let now = Utc::now();
        Rat {
            token_id: self.token_id,
            owner_address: owner.to_string(),
            name: self.name,
            variant: self.variant,
            gender: self.gender,
            bloodline: self.bloodline,
            stamina: self.stamina,
            agility: self.agility,
            speed: self.speed,
            speeds: self.speeds,
            rarity_score: self.rarity_score,
            date_of_birth: self.date_of_birth,
            sire_token_id: None,
            dam_token_id: None,
            wins: 0,
            placed: 0,
            losses: 0,
            level: level_for_xp(0),
            xp: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Metadata Generator - derives rat attributes from a keccak-seeded rng
pub struct MetadataGenerator;

impl MetadataGenerator {
    /// Generate the full record for a mint. The seed binds token id, owner
    /// and variant; draw order is fixed, so the output is stable.
    pub fn generate(
        token_id: i64,
        owner: &str,
        variant: i32,
        minted_at: DateTime<Utc>,
    ) -> RatMetadata {
        let seed_input = Self::seed_input(token_id, owner, variant);
        let dna = hash::keccak256_hex(&seed_input);
        let mut rng = StdRng::from_seed(hash::keccak256(&seed_input));

        let prefix = NAME_PREFIXES[rng.random_range(0..NAME_PREFIXES.len())];
        let suffix = NAME_SUFFIXES[rng.random_range(0..NAME_SUFFIXES.len())];
        let name = format!("{}{}", prefix, suffix);

        let gender = if rng.random_range(0..2) == 0 {
            "male"
        } else {
            "female"
        };

        let weights = BLOODLINES.map(|(_, weight, _)| weight);
        let dist = WeightedIndex::new(weights).expect("bloodline weights are valid");
        let (bloodline, _, bloodline_base) = BLOODLINES[dist.sample(&mut rng)];

        let stamina = rng.random_range(STAT_MIN..=STAT_MAX);
        let agility = rng.random_range(STAT_MIN..=STAT_MAX);
        let speed = rng.random_range(STAT_MIN..=STAT_MAX);

        let speeds: Vec<i32> = (0..SPEED_SEGMENTS)
            .map(|_| rng.random_range(STAT_MIN..=STAT_MAX))
            .collect();

        let core_mean = (stamina + agility + speed) as f64 / 3.0;
        let speed_mean = speeds.iter().sum::<i32>() as f64 / speeds.len() as f64;
        let rarity = (bloodline_base + core_mean + speed_mean) / 3.0;
        let rarity_score = Decimal::from_f64_retain(rarity)
            .unwrap_or_default()
            .round_dp(2);

        RatMetadata {
            token_id,
            dna,
            name,
            variant,
            gender: gender.to_string(),
            bloodline: bloodline.to_string(),
            stamina,
            agility,
            speed,
            speeds,
            rarity_score,
            date_of_birth: minted_at,
        }
    }

    /// Bahan seed: token id, owner (canonical lowercase), dan variant.
    fn seed_input(token_id: i64, owner: &str, variant: i32) -> Vec<u8> {
        let owner = owner.to_lowercase();
        let mut input = Vec::with_capacity(12 + owner.len());
        input.extend_from_slice(&token_id.to_be_bytes());
        input.extend_from_slice(owner.as_bytes());
        input.extend_from_slice(&variant.to_be_bytes());
        input
    }
}

/// Metadata Store - persists generated records to an external blob store
#[derive(Clone)]
pub struct MetadataStore {
    client: reqwest::Client,
    base_url: Option<String>,
    token: Option<String>,
}

impl MetadataStore {
    pub fn from_config(config: &Config) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config
                .metadata_store_url
                .as_ref()
                .map(|url| url.trim_end_matches('/').to_string())
                .filter(|url| !url.is_empty()),
            token: config.metadata_store_token.clone(),
        }
    }

    /// PUT the record at its stable location. The store answering 409 means
    /// the blob already exists, which a replayed mint counts as success.
    /// Failures degrade with a warning; a mint is never failed over metadata.
    pub async fn upload(&self, metadata: &RatMetadata) -> bool {
        let Some(base) = &self.base_url else {
            tracing::debug!(
                "Metadata store not configured; skipping upload for rat {}",
                metadata.token_id
            );
            return false;
        };

        let url = format!("{}/rats/{}.json", base, metadata.token_id);
        let mut request = self
            .client
            .put(&url)
            .json(metadata)
            .timeout(Duration::from_millis(METADATA_UPLOAD_TIMEOUT_MS));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        match request.send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) if response.status().as_u16() == 409 => {
                tracing::debug!("Metadata for rat {} already stored", metadata.token_id);
                true
            }
            Ok(response) => {
                tracing::warn!(
                    "Metadata upload for rat {} returned {}",
                    metadata.token_id,
                    response.status()
                );
                false
            }
            Err(e) => {
                tracing::warn!("Metadata upload for rat {} failed: {}", metadata.token_id, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minted_at() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn generation_is_deterministic() {
        // Memastikan redelivery menghasilkan metadata yang sama persis
        let a = MetadataGenerator::generate(7, "0xAbCd", 3, minted_at());
        let b = MetadataGenerator::generate(7, "0xabcd", 3, minted_at());

        assert_eq!(a.dna, b.dna);
        assert_eq!(a.name, b.name);
        assert_eq!(a.gender, b.gender);
        assert_eq!(a.bloodline, b.bloodline);
        assert_eq!(
            (a.stamina, a.agility, a.speed),
            (b.stamina, b.agility, b.speed)
        );
        assert_eq!(a.speeds, b.speeds);
        assert_eq!(a.rarity_score, b.rarity_score);
    }

    #[test]
    fn different_token_ids_draw_different_profiles() {
        let a = MetadataGenerator::generate(1, "0xaa", 0, minted_at());
        let b = MetadataGenerator::generate(2, "0xaa", 0, minted_at());
        assert_ne!(a.dna, b.dna);
        assert_ne!(
            (a.name, a.stamina, a.agility, a.speed, a.speeds),
            (b.name, b.stamina, b.agility, b.speed, b.speeds)
        );
    }

    #[test]
    fn dna_is_keccak_hex_of_mint_parameters() {
        let meta = MetadataGenerator::generate(9, "0xCaFe", 1, minted_at());
        assert!(meta.dna.starts_with("0x"));
        assert_eq!(meta.dna.len(), 66);
    }

    #[test]
    fn stats_stay_in_range() {
        for token_id in 0..25 {
            let meta = MetadataGenerator::generate(token_id, "0xdeadbeef", 1, minted_at());
            for stat in [meta.stamina, meta.agility, meta.speed] {
                assert!((STAT_MIN..=STAT_MAX).contains(&stat));
            }
            assert_eq!(meta.speeds.len(), SPEED_SEGMENTS);
            for segment in &meta.speeds {
                assert!((STAT_MIN..=STAT_MAX).contains(segment));
            }
            assert!(BLOODLINES.iter().any(|(n, _, _)| *n == meta.bloodline));
            assert!(meta.gender == "male" || meta.gender == "female");
        }
    }

    #[test]
    fn rarity_score_is_bounded() {
        // Skor gabungan selalu berada di antara batas stat dan skor mythic
        let min = Decimal::from(STAT_MIN);
        let max = Decimal::from(STAT_MAX);
        for token_id in 0..25 {
            let meta = MetadataGenerator::generate(token_id, "0xfeed", 2, minted_at());
            assert!(meta.rarity_score >= min - Decimal::ONE);
            assert!(meta.rarity_score <= max);
        }
    }

    #[test]
    fn into_rat_starts_with_clean_record() {
        let meta = MetadataGenerator::generate(42, "0xAB", 5, minted_at());
        let rarity = meta.rarity_score;
        let rat = meta.into_rat("0xab");

        assert_eq!(rat.token_id, 42);
        assert_eq!(rat.owner_address, "0xab");
        assert_eq!(rat.variant, 5);
        assert_eq!(rat.rarity_score, rarity);
        assert_eq!(rat.date_of_birth, minted_at());
        assert_eq!((rat.wins, rat.placed, rat.losses), (0, 0, 0));
        assert_eq!(rat.level, 1);
        assert_eq!(rat.xp, 0);
        assert!(rat.sire_token_id.is_none());
        assert!(rat.dam_token_id.is_none());
    }
}
