/// Application constants

// Webhook signature
pub const WEBHOOK_SIGNATURE_HEADER: &str = "x-hook0-signature";
pub const SIGNATURE_SCHEME_PREFIX: &str = "v0=";

// Race configuration
pub const MAX_PARTICIPANTS: i32 = 6;
pub const PLACED_RANKS: usize = 2; // ranks 2 and 3 count as "placed"

// Rat stat generation
pub const STAT_MIN: i32 = 50;
pub const STAT_MAX: i32 = 100;
pub const SPEED_SEGMENTS: usize = 8;
pub const VARIANT_COUNT: i32 = 8;

// Bloodlines: name, mint weight, rarity base score
pub const BLOODLINES: [(&str, u32, f64); 5] = [
    ("Common", 50, 50.0),
    ("Swift", 25, 62.0),
    ("Shadow", 15, 74.0),
    ("Ancient", 8, 86.0),
    ("Mythic", 2, 98.0),
];

// Experience and leveling
pub const XP_WIN: i64 = 100;
pub const XP_PLACED: i64 = 50;
pub const XP_LOSS: i64 = 10;
pub const LEVEL_XP_STEP: i64 = 250;

// API
pub const API_VERSION: &str = "v1";
pub const DEFAULT_LIST_LIMIT: i64 = 20;
pub const MAX_LIST_LIMIT: i64 = 100;

// Metadata store
pub const METADATA_UPLOAD_TIMEOUT_MS: u64 = 5_000;
