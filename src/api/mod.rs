// src/api/mod.rs

pub mod health;
pub mod hooks;
pub mod races;
pub mod rats;
pub mod wallets;

// AppState definition
use crate::config::Config;
use crate::db::Database;
use crate::services::HookProcessor;

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Config,
    pub processor: HookProcessor,
}
